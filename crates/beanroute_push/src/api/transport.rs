use tokio::sync::oneshot;
use tracing::debug;
use url::Url;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Method {
    #[strum(serialize = "GET")]
    Get,
    #[strum(serialize = "POST")]
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute path on the backend, e.g. `/api/push/config`.
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub cookie: Option<String>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            cookie: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            cookie: None,
        }
    }

    pub fn with_cookie(mut self, cookie: Option<&str>) -> Self {
        self.cookie = cookie.map(str::to_owned);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Body as text, for error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends requests to the BeanRoute backend.
///
/// A non-2xx status is a successful round trip; only failures to get any
/// response at all are errors.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by `ehttp`.
pub struct EhttpTransport {
    base_url: Url,
}

impl EhttpTransport {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Url(format!("{path}: {e}")))
    }
}

#[async_trait::async_trait]
impl HttpTransport for EhttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url_for(&request.path)?;

        let mut req = match &request.body {
            Some(body) => {
                let mut req = ehttp::Request::post(url.as_str(), body.to_string().into_bytes());
                req.headers.insert("Content-Type", "application/json");
                req
            }
            None => ehttp::Request::get(url.as_str()),
        };
        req.headers.insert("Accept", "application/json");
        if let Some(cookie) = &request.cookie {
            req.headers.insert("Cookie", cookie);
        }

        debug!("{} {}", request.method, url);

        let (sender, receiver) = oneshot::channel();
        ehttp::fetch(req, move |response: Result<ehttp::Response, String>| {
            let _ = sender.send(response);
        });

        let response = receiver
            .await
            .map_err(|_| TransportError::Canceled)?
            .map_err(TransportError::Request)?;

        Ok(HttpResponse {
            status: response.status,
            body: response.bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_onto_base() {
        let base = Url::parse("https://beans.example.com/app/").expect("url");
        let transport = EhttpTransport::new(base);
        assert_eq!(
            transport.url_for("/api/push/config").expect("url").as_str(),
            "https://beans.example.com/api/push/config"
        );
    }

    #[test]
    fn response_classification() {
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(401, "").is_success());
        assert!(HttpResponse::new(401, "").is_unauthorized());
        assert_eq!(HttpResponse::new(500, "boom").text(), "boom");
    }
}

//! Typed client for the backend's `/api/push/*` endpoints.

mod scripted;
mod transport;

pub use scripted::ScriptedTransport;
pub use transport::{EhttpTransport, HttpRequest, HttpResponse, HttpTransport, Method};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::device::DeviceProfile;
use crate::record::{SubscriptionRecord, WireSubscription};
use crate::PushError;

pub const CONFIG_PATH: &str = "/api/push/config";
pub const USER_STATUS_PATH: &str = "/api/push/user-status";
pub const SUBSCRIBE_PATH: &str = "/api/push/subscribe";
pub const UNSUBSCRIBE_PATH: &str = "/api/push/unsubscribe";
pub const SEND_PATH: &str = "/api/push/send";

/// Whether push is enabled server-side, and the key needed to subscribe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub configured: bool,
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserStatus {
    subscribed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest<'a> {
    pub subscription: WireSubscription<'a>,
    pub user_agent: &'a str,
    pub mobile: bool,
    pub limited: bool,
    pub pwa: bool,
}

impl<'a> RegisterRequest<'a> {
    pub fn new(
        record: &'a SubscriptionRecord,
        profile: &DeviceProfile,
        user_agent: &'a str,
    ) -> Self {
        Self {
            subscription: record.to_wire(),
            user_agent,
            mobile: profile.is_mobile,
            limited: record.is_limited(),
            pwa: profile.is_standalone_app,
        }
    }
}

#[derive(Debug, Serialize)]
struct EndpointOnly<'a> {
    endpoint: &'a str,
}

#[derive(Debug, Serialize)]
struct UnregisterRequest<'a> {
    subscription: EndpointOnly<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendRequest {
    pub title: String,
    pub body: String,
    pub target: String,
    pub data: serde_json::Value,
}

impl SendRequest {
    /// The self-test notification sent from the settings page.
    pub fn self_test(app_name: &str) -> Self {
        Self {
            title: format!("{app_name} test notification"),
            body: "Push notifications are working on this device.".to_owned(),
            target: "self".to_owned(),
            data: serde_json::json!({ "url": "/", "test": true }),
        }
    }
}

/// Run `fut` with an upper bound. Expiry is a network error.
pub(crate) async fn bounded<F: Future>(
    limit: Duration,
    what: &str,
    fut: F,
) -> Result<F::Output, PushError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| PushError::Network(format!("{what} timed out after {}ms", limit.as_millis())))
}

/// Client for the push endpoints. Never caches anything: every call is a
/// fresh round trip.
pub struct PushClient<T: HttpTransport> {
    transport: Arc<T>,
    timeout: Duration,
}

impl<T: HttpTransport> PushClient<T> {
    pub fn new(transport: Arc<T>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, PushError> {
        let what = format!("{} {}", request.method, request.path);
        Ok(bounded(self.timeout, &what, self.transport.send(request)).await??)
    }

    /// `GET /api/push/config`. `Ok(None)` means the session is not
    /// authenticated yet.
    pub async fn fetch_config(
        &self,
        cookie: Option<&str>,
    ) -> Result<Option<ServerConfig>, PushError> {
        let response = self
            .execute(HttpRequest::get(CONFIG_PATH).with_cookie(cookie))
            .await?;

        if response.is_unauthorized() {
            debug!("push config: not authenticated yet");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(PushError::Config(format!(
                "HTTP {}: {}",
                response.status,
                response.text()
            )));
        }

        Ok(Some(serde_json::from_slice(&response.body)?))
    }

    /// `GET /api/push/user-status`. `Ok(None)` on 401.
    pub async fn user_status(&self, cookie: Option<&str>) -> Result<Option<bool>, PushError> {
        let response = self
            .execute(HttpRequest::get(USER_STATUS_PATH).with_cookie(cookie))
            .await?;

        if response.is_unauthorized() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(PushError::Server(format!(
                "user status HTTP {}: {}",
                response.status,
                response.text()
            )));
        }

        let status: UserStatus = serde_json::from_slice(&response.body)?;
        Ok(Some(status.subscribed))
    }

    pub async fn register(
        &self,
        cookie: Option<&str>,
        request: &RegisterRequest<'_>,
    ) -> Result<(), PushError> {
        let body = serde_json::to_value(request)?;
        let response = self
            .execute(HttpRequest::post(SUBSCRIBE_PATH, body).with_cookie(cookie))
            .await?;

        if !response.is_success() {
            error!("subscription registration rejected: HTTP {}", response.status);
            return Err(PushError::ServerRegistration(format!(
                "HTTP {}: {}",
                response.status,
                response.text()
            )));
        }
        Ok(())
    }

    pub async fn unregister(&self, cookie: Option<&str>, endpoint: &str) -> Result<(), PushError> {
        let body = serde_json::to_value(UnregisterRequest {
            subscription: EndpointOnly { endpoint },
        })?;
        let response = self
            .execute(HttpRequest::post(UNSUBSCRIBE_PATH, body).with_cookie(cookie))
            .await
            .map_err(|e| PushError::ServerUnregistration(e.to_string()))?;

        if !response.is_success() {
            error!("subscription removal rejected: HTTP {}", response.status);
            return Err(PushError::ServerUnregistration(format!(
                "HTTP {}: {}",
                response.status,
                response.text()
            )));
        }
        Ok(())
    }

    pub async fn send(&self, cookie: Option<&str>, request: &SendRequest) -> Result<(), PushError> {
        let body = serde_json::to_value(request)?;
        let response = self
            .execute(HttpRequest::post(SEND_PATH, body).with_cookie(cookie))
            .await?;

        if !response.is_success() {
            return Err(PushError::Server(format!(
                "send HTTP {}: {}",
                response.status,
                response.text()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::OsFamily;
    use crate::record::{PushSubscription, SubscriptionKeys};
    use serde_json::json;

    fn client() -> (Arc<ScriptedTransport>, PushClient<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let client = PushClient::new(transport.clone(), Duration::from_secs(10));
        (transport, client)
    }

    #[tokio::test]
    async fn config_probe_status_handling() {
        let (transport, client) = client();

        transport.respond_once(
            CONFIG_PATH,
            200,
            json!({ "configured": true, "publicKey": "BKey" }),
        );
        transport.respond_once(CONFIG_PATH, 401, json!({ "error": "unauthorized" }));
        transport.respond_once(CONFIG_PATH, 503, json!({ "error": "down" }));
        transport.respond_once(CONFIG_PATH, 200, json!({ "configured": false }));

        assert_eq!(
            client.fetch_config(None).await,
            Ok(Some(ServerConfig {
                configured: true,
                public_key: Some("BKey".to_owned())
            }))
        );
        assert_eq!(client.fetch_config(None).await, Ok(None));
        assert!(matches!(
            client.fetch_config(None).await,
            Err(PushError::Config(_))
        ));
        assert_eq!(
            client.fetch_config(None).await,
            Ok(Some(ServerConfig {
                configured: false,
                public_key: None
            }))
        );

        // no caching: four calls, four round trips
        assert_eq!(transport.count(CONFIG_PATH), 4);
    }

    #[tokio::test]
    async fn cookie_is_forwarded() {
        let (transport, client) = client();
        transport.respond(USER_STATUS_PATH, 200, json!({ "subscribed": true }));

        assert_eq!(client.user_status(Some("session=abc")).await, Ok(Some(true)));
        assert_eq!(
            transport.requests_to(USER_STATUS_PATH)[0].cookie.as_deref(),
            Some("session=abc")
        );
    }

    #[tokio::test]
    async fn register_body_shape() {
        let (transport, client) = client();
        transport.respond(SUBSCRIBE_PATH, 201, json!({ "ok": true }));

        let profile = DeviceProfile {
            is_mobile: false,
            os_family: OsFamily::Other,
            is_standalone_app: false,
        };
        let record = SubscriptionRecord::real(
            PushSubscription {
                endpoint: "https://push.example.com/1".to_owned(),
                keys: SubscriptionKeys {
                    p256dh: "p".to_owned(),
                    auth: "a".to_owned(),
                },
            },
            &profile,
        );

        client
            .register(None, &RegisterRequest::new(&record, &profile, "UA"))
            .await
            .expect("register");

        let body = transport.requests_to(SUBSCRIBE_PATH)[0]
            .body
            .clone()
            .expect("body");
        assert_eq!(
            body,
            json!({
                "subscription": {
                    "endpoint": "https://push.example.com/1",
                    "keys": { "p256dh": "p", "auth": "a" }
                },
                "userAgent": "UA",
                "mobile": false,
                "limited": false,
                "pwa": false
            })
        );
    }

    #[tokio::test]
    async fn unregister_failures_are_unregistration_errors() {
        let (transport, client) = client();
        transport.respond(UNSUBSCRIBE_PATH, 500, json!({ "error": "db" }));
        assert!(matches!(
            client.unregister(None, "https://push.example.com/1").await,
            Err(PushError::ServerUnregistration(_))
        ));

        transport.fail(UNSUBSCRIBE_PATH, "offline");
        assert!(matches!(
            client.unregister(None, "https://push.example.com/1").await,
            Err(PushError::ServerUnregistration(_))
        ));

        assert_eq!(
            transport.requests_to(UNSUBSCRIBE_PATH)[0].body,
            Some(json!({ "subscription": { "endpoint": "https://push.example.com/1" } }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_requests_time_out() {
        let (transport, client) = client();
        transport.stall(USER_STATUS_PATH);

        let err = client.user_status(None).await.expect_err("timeout");
        assert!(matches!(err, PushError::Network(ref m) if m.contains("timed out")));
    }
}

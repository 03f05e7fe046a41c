use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::TransportError;

#[derive(Debug, Clone)]
enum Reply {
    Respond(HttpResponse),
    Fail(TransportError),
    /// Never answers.
    Stall,
}

#[derive(Default)]
struct Script {
    once: HashMap<String, VecDeque<Reply>>,
    sticky: HashMap<String, Reply>,
    requests: Vec<HttpRequest>,
}

/// A transport that replays canned replies per path and records every
/// request it sees.
///
/// One-shot replies are used first, in order; after that the sticky reply
/// for the path answers. Paths with no reply get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer every request to `path` with `status` and a JSON body.
    pub fn respond(&self, path: &str, status: u16, body: serde_json::Value) -> &Self {
        self.lock().sticky.insert(
            path.to_owned(),
            Reply::Respond(HttpResponse::json(status, &body)),
        );
        self
    }

    /// Answer only the next request to `path`.
    pub fn respond_once(&self, path: &str, status: u16, body: serde_json::Value) -> &Self {
        self.lock()
            .once
            .entry(path.to_owned())
            .or_default()
            .push_back(Reply::Respond(HttpResponse::json(status, &body)));
        self
    }

    pub fn fail(&self, path: &str, message: &str) -> &Self {
        self.lock().sticky.insert(
            path.to_owned(),
            Reply::Fail(TransportError::Request(message.to_owned())),
        );
        self
    }

    pub fn stall(&self, path: &str) -> &Self {
        self.lock().sticky.insert(path.to_owned(), Reply::Stall);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.lock().requests.iter().filter(|r| r.path == path).count()
    }

    pub fn total(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let reply = {
            let mut script = self.lock();
            let path = request.path.clone();
            debug!("scripted {} {}", request.method, path);
            script.requests.push(request);

            let once = script.once.get_mut(&path).and_then(VecDeque::pop_front);
            once.or_else(|| script.sticky.get(&path).cloned())
        };

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Stall) => std::future::pending().await,
            None => Ok(HttpResponse::new(404, "not found")),
        }
    }
}

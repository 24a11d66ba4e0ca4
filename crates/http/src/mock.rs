//! Scripted transport for tests and offline demos.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::{Request, Transport, TransportError, TransportResult};

/// A canned reply for requests to `path`, optionally only when a parameter
/// has a given value.
#[derive(Debug, Clone)]
pub struct MockRoute {
    path: String,
    when: Option<(String, String)>,
    result: TransportResult<serde_json::Value>,
    delay: Duration,
}

impl MockRoute {
    pub fn ok(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self { path: path.into(), when: None, result: Ok(body), delay: Duration::ZERO }
    }

    pub fn fail(path: impl Into<String>, err: TransportError) -> Self {
        Self { path: path.into(), when: None, result: Err(err), delay: Duration::ZERO }
    }

    pub fn when(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.when = Some((key.into(), value.into()));
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    fn matches(&self, req: &Request) -> bool {
        req.path == self.path
            && self.when.as_ref().map(|(k, v)| req.param_value(k) == Some(v.as_str())).unwrap_or(true)
    }
}

/// First matching route answers; unmatched requests get a 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Vec<MockRoute>,
    sent: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Self { Self::default() }

    pub fn route(mut self, route: MockRoute) -> Self {
        self.routes.push(route);
        self
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> { self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone() }

    pub fn requests_to(&self, path: &str) -> Vec<Request> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, req: Request) -> TransportResult<serde_json::Value> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(req.clone());
        let Some(route) = self.routes.iter().find(|r| r.matches(&req)) else {
            return Err(TransportError::Status { status: 404, path: req.path });
        };
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        route.result.clone()
    }
}

//! formsync http – the request capability handlers talk through.
//!
//! Handlers never reach for a global client: they get an `Arc<dyn Transport>`
//! and send a `Request` through `dispatch`, which adds the timeout, logs and
//! metrics every call shares.

#![forbid(unsafe_code)]

pub mod config;
pub mod mock;

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, warn};

pub use config::{ClientConfig, Endpoints, LOG_ENV, METRICS_ADDR_ENV};
pub use mock::{MockRoute, MockTransport};

/// How parameters travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStyle {
    /// GET with a query string.
    Query,
    /// POST with a urlencoded form body.
    Form,
}

pub type Params = SmallVec<[(String, String); 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub style: RequestStyle,
    /// Path relative to the configured base URL, e.g. `/orders/get-branches/`.
    pub path: String,
    pub params: Params,
    pub headers: Params,
}

impl Request {
    pub fn new(style: RequestStyle, path: impl Into<String>) -> Self {
        Self { style, path: path.into(), params: SmallVec::new(), headers: SmallVec::new() }
    }

    pub fn query(path: impl Into<String>) -> Self { Self::new(RequestStyle::Query, path) }
    pub fn form(path: impl Into<String>) -> Self { Self::new(RequestStyle::Form, path) }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Carry the CSRF token from cookie `cookie` in `header`. Without the
    /// cookie the request goes out unchanged and the miss is logged.
    pub fn with_csrf(self, cookies: &str, cookie: &str, header: &str) -> Self {
        match formsync_core::csrf::cookie_value(cookies, cookie) {
            Some(token) => self.header(header, token),
            None => {
                warn!(path = %self.path, cookie = %cookie, "http: csrf cookie missing, sending without token");
                self
            }
        }
    }

    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// Request failures. Handlers turn these into field state and a log line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network: {0}")]
    Network(String),
    #[error("status {status} from {path}")]
    Status { status: u16, path: String },
    #[error("decode: {0}")]
    Decode(String),
    #[error("request timed out")]
    Timeout,
    #[error("config: {0}")]
    Config(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// One request in, one JSON document out. Non-2xx statuses are errors.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: Request) -> TransportResult<serde_json::Value>;
}

/// Send `req`, bounded by `timeout` when set, recording request metrics.
pub async fn dispatch(
    transport: &dyn Transport,
    req: Request,
    timeout: Option<Duration>,
) -> TransportResult<serde_json::Value> {
    let started = Instant::now();
    let path = req.path.clone();
    debug!(path = %path, style = ?req.style, params = req.params.len(), "http: request start");
    let res = match timeout {
        Some(t) => tokio::time::timeout(t, transport.send(req)).await.unwrap_or(Err(TransportError::Timeout)),
        None => transport.send(req).await,
    };
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let took_ms = elapsed_ms as u64;
    histogram!("formsync_http_request_ms", elapsed_ms);
    counter!("formsync_http_requests_total", 1u64);
    match &res {
        Ok(_) => debug!(path = %path, took_ms, "http: request ok"),
        Err(e) => {
            counter!("formsync_http_errors_total", 1u64);
            debug!(path = %path, error = %e, took_ms, "http: request failed");
        }
    }
    res
}

/// `reqwest`-backed transport against a live server.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base: reqwest::Url,
}

impl ReqwestTransport {
    pub fn new(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = cfg.timeout() {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;
        let base = reqwest::Url::parse(&cfg.base_url)
            .map_err(|e| anyhow::anyhow!("invalid base url {}: {}", cfg.base_url, e))?;
        Ok(Self { client, base })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: Request) -> TransportResult<serde_json::Value> {
        let url = self
            .base
            .join(&req.path)
            .map_err(|e| TransportError::Config(format!("joining {}: {}", req.path, e)))?;
        let mut rb = match req.style {
            RequestStyle::Query => self.client.get(url).query(&req.params[..]),
            RequestStyle::Form => self.client.post(url).form(&req.params[..]),
        };
        rb = rb
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Requested-With", "XMLHttpRequest");
        for (name, value) in req.headers.iter() {
            rb = rb.header(name.as_str(), value.as_str());
        }
        let resp = rb.send().await.map_err(|e| {
            if e.is_timeout() { TransportError::Timeout } else { TransportError::Network(e.to_string()) }
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status { status: status.as_u16(), path: req.path });
        }
        resp.json::<serde_json::Value>().await.map_err(|e| TransportError::Decode(e.to_string()))
    }
}

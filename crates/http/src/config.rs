//! Endpoint paths and client settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log filter for the `formsyncctl` subscriber.
pub const LOG_ENV: &str = "FORMSYNC_LOG";
/// `host:port` for the Prometheus exporter; unset keeps it off.
pub const METRICS_ADDR_ENV: &str = "FORMSYNC_METRICS_ADDR";
const BASE_URL_ENV: &str = "FORMSYNC_BASE_URL";
const TIMEOUT_ENV: &str = "FORMSYNC_TIMEOUT_MS";
const CSRF_COOKIE_ENV: &str = "FORMSYNC_CSRF_COOKIE";

/// Paths of the admin endpoints the helpers consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub branches: String,
    pub orders: String,
    pub defaults: String,
    pub pricing: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            branches: "/orders/get-branches/".into(),
            orders: "/orders/get-orders/".into(),
            defaults: "/orders/get-defaults/".into(),
            pricing: "/orders/get-customer-pricing/".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-request timeout; `None` waits for the server indefinitely.
    pub timeout_ms: Option<u64>,
    pub csrf_cookie: String,
    pub csrf_header: String,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            timeout_ms: Some(10_000),
            csrf_cookie: formsync_core::csrf::DEFAULT_COOKIE.into(),
            csrf_header: formsync_core::csrf::DEFAULT_HEADER.into(),
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `FORMSYNC_BASE_URL`, `FORMSYNC_TIMEOUT_MS`
    /// (0 disables the timeout) and `FORMSYNC_CSRF_COOKIE`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            cfg.base_url = url;
        }
        if let Some(ms) = std::env::var(TIMEOUT_ENV).ok().and_then(|s| s.parse::<u64>().ok()) {
            cfg.timeout_ms = if ms == 0 { None } else { Some(ms) };
        }
        if let Ok(name) = std::env::var(CSRF_COOKIE_ENV) {
            cfg.csrf_cookie = name;
        }
        cfg
    }

    pub fn timeout(&self) -> Option<Duration> { self.timeout_ms.map(Duration::from_millis) }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime configuration shared by collaborators and the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Base URL of the cluster API server; relative probe URLs are joined onto it.
    pub api_url: String,
    /// Base URL of the Prometheus HTTP API.
    pub prometheus_url: String,
    /// Interval between polls of URL, metric and alert sources.
    pub poll_secs: u64,
    pub http_timeout_secs: u64,
    /// Product name shown in platform health when the platform is the vendor distribution.
    pub product_name: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: "https://kubernetes.default.svc".to_string(),
            prometheus_url: "http://localhost:9090".to_string(),
            poll_secs: 15,
            http_timeout_secs: 10,
            product_name: "OpenShift".to_string(),
        }
    }
}

impl ConsoleConfig {
    /// Read `LOOKOUT_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_url: std::env::var("LOOKOUT_API_URL").unwrap_or(d.api_url),
            prometheus_url: std::env::var("LOOKOUT_PROMETHEUS_URL").unwrap_or(d.prometheus_url),
            poll_secs: std::env::var("LOOKOUT_POLL_SECS").ok().and_then(|s| s.parse().ok()).filter(|v| *v > 0).unwrap_or(d.poll_secs),
            http_timeout_secs: std::env::var("LOOKOUT_HTTP_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(d.http_timeout_secs),
            product_name: std::env::var("LOOKOUT_PRODUCT_NAME").unwrap_or(d.product_name),
        }
    }

    pub fn poll_interval(&self) -> Duration { Duration::from_secs(self.poll_secs.max(1)) }
    pub fn http_timeout(&self) -> Duration { Duration::from_secs(self.http_timeout_secs.max(1)) }
}

//! Lookout kubehub: the collaborators health polling talks to (HTTP, Prometheus, kube).
//!
//! Everything the aggregator needs from the outside world sits behind the
//! traits in this crate so tests can substitute in-memory fakes.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use lookout_core::{Alert, ConsoleConfig, MetricResult, ResourceSelector};
use tokio::sync::mpsc;

mod http;
mod kube_watch;
mod prom;

pub use http::HttpClient;
pub use kube_watch::{get_kube_client, parse_gvk_key, probe_capabilities, resolve_flags, KubeResourceWatch, ServedApis};
pub use prom::{parse_alerts, parse_query_result, PrometheusClient};

/// Plain GET of a URL returning the body text.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Instant metric queries and firing alerts.
#[async_trait]
pub trait MetricsQuery: Send + Sync {
    async fn query(&self, query: &str) -> Result<MetricResult>;
    async fn alerts(&self) -> Result<Vec<Alert>>;
}

/// Live list of a resource collection. Implementations push the full current
/// list on every change and return once the receiver is gone or the stream ends.
#[async_trait]
pub trait ResourceWatch: Send + Sync {
    async fn watch(&self, selector: &ResourceSelector, tx: mpsc::Sender<Vec<serde_json::Value>>) -> Result<()>;
}

/// Bundle of collaborators handed to the watch manager.
#[derive(Clone)]
pub struct Collaborators {
    pub http: Arc<dyn HttpFetch>,
    pub metrics: Arc<dyn MetricsQuery>,
    pub resources: Arc<dyn ResourceWatch>,
}

impl Collaborators {
    /// Real clients built from configuration. The kube client is created lazily
    /// on the first resource watch.
    pub fn from_config(config: &ConsoleConfig) -> Result<Self> {
        Ok(Self {
            http: Arc::new(HttpClient::new(&config.api_url, config.http_timeout())?),
            metrics: Arc::new(PrometheusClient::new(&config.prometheus_url, config.http_timeout())?),
            resources: Arc::new(KubeResourceWatch),
        })
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

//! Shapes returned by the metric-query and resource-watch collaborators.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One instant-vector sample from a metric query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub labels: SmallVec<[(String, String); 4]>,
    pub timestamp: f64,
    pub value: f64,
}

impl MetricSample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Result of a metric query: zero or more samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricResult {
    pub samples: Vec<MetricSample>,
}

impl MetricResult {
    /// Value of the first sample, the common case for scalar-ish queries.
    pub fn first_value(&self) -> Option<f64> { self.samples.first().map(|s| s.value) }
}

/// A firing alert as reported by the metrics stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alert {
    pub name: String,
    pub severity: Option<String>,
    pub message: Option<String>,
    pub state: String,
    pub active_at: Option<String>,
}

impl Alert {
    /// Stable identity used to deduplicate and order alerts.
    pub fn fingerprint(&self) -> String {
        format!("{}|{}|{}", self.name, self.severity.as_deref().unwrap_or(""), self.message.as_deref().unwrap_or(""))
    }
}

/// Identifies a watchable resource collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceSelector {
    /// GVK key, e.g. "v1/Node" or "ceph.rook.io/v1/CephCluster".
    pub gvk: String,
    pub namespace: Option<String>,
}

impl ResourceSelector {
    pub fn new(gvk: impl Into<String>, namespace: Option<&str>) -> Self {
        Self { gvk: gvk.into(), namespace: namespace.map(|s| s.to_string()) }
    }

    pub fn label(&self) -> String {
        format!("{}|{}", self.gvk, self.namespace.as_deref().unwrap_or(""))
    }
}

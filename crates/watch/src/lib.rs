//! Lookout watch lifecycle manager.
//!
//! Owns one poll task per active subscription. Tasks report through a single
//! unbounded channel; every event carries the generation of the subscription
//! that produced it so late results from stopped or replaced subscriptions
//! can be dropped by the owner.

#![forbid(unsafe_code)]

use std::fmt;
use std::time::{Duration, Instant};

use lookout_core::{Alert, MetricResult, ResourceSelector};
use lookout_kubehub::Collaborators;
use metrics::counter;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

mod poll;

/// Identity of a subscription. Keys are derived from what is watched so two
/// consumers of the same source share one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WatchKey(String);

impl WatchKey {
    pub fn url(url: &str) -> Self { Self(format!("url|{}", url)) }
    pub fn prometheus(query: &str) -> Self { Self(format!("prom|{}", query)) }
    pub fn alerts() -> Self { Self("alerts".to_string()) }

    /// Resource keys include the subsystem index so two subsystems watching
    /// the same collection keep independent subscriptions.
    pub fn resource(selector: &ResourceSelector, index: usize) -> Self {
        Self(format!("resource|{}|{}", selector.label(), index))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// What a subscription polls or watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSource {
    Url(String),
    PrometheusQuery(String),
    K8sResource(ResourceSelector),
    Alerts,
}

impl WatchSource {
    pub fn kind(&self) -> &'static str {
        match self {
            WatchSource::Url(_) => "url",
            WatchSource::PrometheusQuery(_) => "prometheus",
            WatchSource::K8sResource(_) => "resource",
            WatchSource::Alerts => "alerts",
        }
    }
}

/// Raw result delivered by a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchPayload {
    Text(String),
    Metric(MetricResult),
    Resource(Vec<serde_json::Value>),
    Alerts(Vec<Alert>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub key: WatchKey,
    pub generation: u64,
    /// Poll failures arrive as the rendered error chain.
    pub outcome: Result<WatchPayload, String>,
}

/// Subscription control as seen by the health aggregator.
pub trait WatchControl: Send {
    /// Start polling `key`. Returns false when it is already active.
    fn start(&mut self, key: WatchKey, source: WatchSource) -> bool;
    /// Stop polling `key`. Returns false when it was not active.
    fn stop(&mut self, key: &WatchKey) -> bool;
    /// Whether `event` came from the currently active subscription of its key.
    fn is_current(&self, event: &WatchEvent) -> bool;
    fn active_count(&self) -> usize;
}

struct Subscription {
    generation: u64,
    source: WatchSource,
    started: Instant,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Spawns and tracks poll tasks. Must be used inside a tokio runtime.
pub struct WatchManager {
    collab: Collaborators,
    interval: Duration,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    subs: FxHashMap<WatchKey, Subscription>,
    next_generation: u64,
}

impl WatchManager {
    pub fn new(collab: Collaborators, interval: Duration) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mgr = Self { collab, interval, events_tx, subs: FxHashMap::default(), next_generation: 0 };
        (mgr, events_rx)
    }

    pub fn is_active(&self, key: &WatchKey) -> bool { self.subs.contains_key(key) }

    /// Stop every subscription. Returns how many were active.
    pub fn stop_all(&mut self) -> usize {
        let keys: Vec<WatchKey> = self.subs.keys().cloned().collect();
        let n = keys.len();
        for k in keys {
            self.stop(&k);
        }
        n
    }
}

impl WatchControl for WatchManager {
    fn start(&mut self, key: WatchKey, source: WatchSource) -> bool {
        if self.subs.contains_key(&key) {
            debug!(key = %key, "watch: already active");
            return false;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let emitter = poll::Emitter::new(key.clone(), generation, self.events_tx.clone());
        let task = tokio::spawn(poll::run(emitter, source.clone(), self.collab.clone(), self.interval, stop_rx));
        info!(key = %key, source = source.kind(), generation, "watch: started");
        counter!("watch_started_total", 1u64);
        self.subs.insert(key, Subscription { generation, source, started: Instant::now(), stop: Some(stop_tx), task });
        true
    }

    fn stop(&mut self, key: &WatchKey) -> bool {
        let Some(mut sub) = self.subs.remove(key) else {
            trace!(key = %key, "watch: stop of inactive key");
            return false;
        };
        if let Some(stop) = sub.stop.take() {
            let _ = stop.send(());
        }
        sub.task.abort();
        info!(key = %key, source = sub.source.kind(), generation = sub.generation, active_ms = %sub.started.elapsed().as_millis(), "watch: stopped");
        counter!("watch_stopped_total", 1u64);
        true
    }

    fn is_current(&self, event: &WatchEvent) -> bool {
        self.subs.get(&event.key).map(|s| s.generation == event.generation).unwrap_or(false)
    }

    fn active_count(&self) -> usize { self.subs.len() }
}

impl Drop for WatchManager {
    fn drop(&mut self) {
        let n = self.stop_all();
        if n > 0 {
            debug!(stopped = n, "watch: manager dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_sources() {
        let sel = ResourceSelector::new("ceph.rook.io/v1/CephCluster", Some("openshift-storage"));
        assert_eq!(WatchKey::resource(&sel, 3).as_str(), "resource|ceph.rook.io/v1/CephCluster|openshift-storage|3");
        assert_ne!(WatchKey::resource(&sel, 0), WatchKey::resource(&sel, 1));
        assert_ne!(WatchKey::url("up"), WatchKey::prometheus("up"));
        assert_eq!(WatchKey::alerts().to_string(), "alerts");
    }
}

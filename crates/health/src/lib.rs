//! Lookout health: subsystem health aggregation.
//!
//! The aggregator turns the flag-filtered health subsystems of the registry
//! into watch subscriptions, feeds poll results through each subsystem's
//! handler and merges the verdicts into one cluster health.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use lookout_core::{Alert, ConsoleConfig, HealthSubsystem, SubsystemHealth, FLAG_OPENSHIFT};
use lookout_flags::{FlagGate, FlagsSnapshot};
use lookout_registry::ExtensionRegistry;
use lookout_watch::{WatchControl, WatchEvent, WatchKey, WatchManager, WatchPayload, WatchSource};
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace};

pub mod merge;

pub use merge::{cluster_health, platform_health, platform_name};

/// Path of the API server health endpoint, relative to the API base URL.
pub const PLATFORM_HEALTH_URL: &str = "/healthz";

/// Title and verdict of one row of the health list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubsystemReport {
    pub title: String,
    #[serde(flatten)]
    pub health: SubsystemHealth,
}

/// Everything the health card shows: the merged verdict, the full list behind
/// it and firing alerts.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    /// True while platform detection is still pending.
    pub loading: bool,
    pub cluster: SubsystemHealth,
    pub platform: SubsystemReport,
    pub subsystems: Vec<SubsystemReport>,
    pub alerts: Vec<Alert>,
    pub flags_epoch: u64,
    pub updated_at: DateTime<Utc>,
}

impl HealthReport {
    /// Report published before anything has been polled.
    pub fn initial() -> Self {
        Self {
            loading: true,
            cluster: SubsystemHealth::loading(),
            platform: SubsystemReport { title: "Kubernetes".into(), health: SubsystemHealth::loading() },
            subsystems: Vec::new(),
            alerts: Vec::new(),
            flags_epoch: 0,
            updated_at: Utc::now(),
        }
    }
}

struct ActiveSubsystem {
    subsystem: HealthSubsystem,
    data_key: WatchKey,
    resource_key: Option<WatchKey>,
}

struct Activation {
    snapshot: Arc<FlagsSnapshot>,
    started: Instant,
    /// Keys in start order; stopped in the same order on deactivation.
    keys: Vec<WatchKey>,
    subsystems: Vec<ActiveSubsystem>,
}

/// Owns the subscriptions of one health view. Driven from a single task.
pub struct HealthAggregator<W: WatchControl = WatchManager> {
    registry: Arc<ExtensionRegistry>,
    flags: Arc<FlagGate>,
    product_name: String,
    watches: W,
    activation: Option<Activation>,
    results: FxHashMap<WatchKey, Result<WatchPayload, String>>,
}

fn unreachable_health(title: &str, err: &str) -> SubsystemHealth {
    SubsystemHealth::error(format!("{} is unreachable", title)).with_details(err.to_string())
}

/// One entry per alert fingerprint, ordered by fingerprint.
fn dedup_alerts(alerts: &[Alert]) -> Vec<Alert> {
    let by_print: BTreeMap<String, &Alert> = alerts.iter().map(|a| (a.fingerprint(), a)).collect();
    by_print.into_values().cloned().collect()
}

impl<W: WatchControl> HealthAggregator<W> {
    pub fn new(registry: Arc<ExtensionRegistry>, flags: Arc<FlagGate>, config: &ConsoleConfig, watches: W) -> Self {
        Self {
            registry,
            flags,
            product_name: config.product_name.clone(),
            watches,
            activation: None,
            results: FxHashMap::default(),
        }
    }

    pub fn watches(&self) -> &W { &self.watches }

    pub fn is_active(&self) -> bool { self.activation.is_some() }

    fn start(&mut self, keys: &mut Vec<WatchKey>, key: WatchKey, source: WatchSource) {
        if keys.contains(&key) {
            return;
        }
        self.watches.start(key.clone(), source);
        keys.push(key);
    }

    /// Start polling the platform endpoint, alerts and every visible subsystem.
    /// No-op when already active.
    pub fn activate(&mut self) {
        if self.activation.is_some() {
            debug!("health: already active");
            return;
        }
        let snapshot = self.flags.snapshot();
        let registry = self.registry.clone();
        let subsystems: Vec<HealthSubsystem> =
            registry.visible(&snapshot).health_subsystems().into_iter().cloned().collect();

        let mut keys = Vec::new();
        self.start(&mut keys, WatchKey::url(PLATFORM_HEALTH_URL), WatchSource::Url(PLATFORM_HEALTH_URL.into()));
        self.start(&mut keys, WatchKey::alerts(), WatchSource::Alerts);
        let mut active = Vec::with_capacity(subsystems.len());
        for (index, subsystem) in subsystems.into_iter().enumerate() {
            let (data_key, resource_key) = match &subsystem {
                HealthSubsystem::Url(u) => {
                    let key = WatchKey::url(&u.url);
                    self.start(&mut keys, key.clone(), WatchSource::Url(u.url.clone()));
                    (key, None)
                }
                HealthSubsystem::Metric(m) => {
                    let key = WatchKey::prometheus(&m.query);
                    self.start(&mut keys, key.clone(), WatchSource::PrometheusQuery(m.query.clone()));
                    let resource_key = m.resource.as_ref().map(|sel| {
                        let rk = WatchKey::resource(sel, index);
                        self.start(&mut keys, rk.clone(), WatchSource::K8sResource(sel.clone()));
                        rk
                    });
                    (key, resource_key)
                }
            };
            active.push(ActiveSubsystem { subsystem, data_key, resource_key });
        }
        info!(epoch = snapshot.epoch, subsystems = active.len(), watches = keys.len(), "health: activated");
        counter!("health_activations_total", 1u64);
        self.activation = Some(Activation { snapshot, started: Instant::now(), keys, subsystems: active });
    }

    /// Stop every subscription of the current activation. Idempotent.
    pub fn deactivate(&mut self) {
        let Some(act) = self.activation.take() else { return; };
        for key in &act.keys {
            self.watches.stop(key);
        }
        self.results.clear();
        info!(epoch = act.snapshot.epoch, stopped = act.keys.len(), active_ms = %act.started.elapsed().as_millis(), "health: deactivated");
    }

    /// Stop then start against the current flags.
    pub fn restart(&mut self) {
        self.deactivate();
        self.activate();
    }

    /// Record a poll result. Returns false when the event is stale and was dropped.
    pub fn accept(&mut self, event: WatchEvent) -> bool {
        if self.activation.is_none() || !self.watches.is_current(&event) {
            trace!(key = %event.key, generation = event.generation, "health: stale event dropped");
            counter!("health_stale_events_total", 1u64);
            return false;
        }
        self.results.insert(event.key, event.outcome);
        true
    }

    fn subsystem_health(&self, active: &ActiveSubsystem) -> SubsystemHealth {
        let title = active.subsystem.title();
        let data = self.results.get(&active.data_key);
        match &active.subsystem {
            HealthSubsystem::Url(u) => match data {
                None => (u.handler)(None),
                Some(Ok(WatchPayload::Text(body))) => (u.handler)(Some(body.as_str())),
                Some(Ok(_)) => unreachable_health(title, "unexpected payload"),
                Some(Err(e)) => unreachable_health(title, e),
            },
            HealthSubsystem::Metric(m) => {
                let resource = active.resource_key.as_ref().map(|k| self.results.get(k));
                let metric = match data {
                    None => None,
                    Some(Ok(WatchPayload::Metric(r))) => Some(r),
                    Some(Ok(_)) => return unreachable_health(title, "unexpected payload"),
                    Some(Err(e)) => return unreachable_health(title, e),
                };
                let objects = match resource {
                    None | Some(None) => None,
                    Some(Some(Ok(WatchPayload::Resource(list)))) => Some(list.as_slice()),
                    Some(Some(Ok(_))) => return unreachable_health(title, "unexpected payload"),
                    Some(Some(Err(e))) => return unreachable_health(title, e),
                };
                (m.handler)(metric, objects)
            }
        }
    }

    /// Current health: merged verdict plus the full list it was computed from.
    pub fn report(&self) -> HealthReport {
        let t0 = Instant::now();
        let flags = self.flags.snapshot();
        let openshift = flags.get(FLAG_OPENSHIFT);
        let base = self.results.get(&WatchKey::url(PLATFORM_HEALTH_URL)).map(|r| match r {
            Ok(WatchPayload::Text(body)) => Ok(body.as_str()),
            Ok(_) => Err("unexpected payload"),
            Err(e) => Err(e.as_str()),
        });
        let platform = SubsystemReport {
            title: platform_name(openshift, &self.product_name).to_string(),
            health: platform_health(openshift, &self.product_name, base),
        };
        let subsystems: Vec<SubsystemReport> = self
            .activation
            .iter()
            .flat_map(|a| a.subsystems.iter())
            .map(|s| SubsystemReport { title: s.subsystem.title().to_string(), health: self.subsystem_health(s) })
            .collect();
        let mut all = Vec::with_capacity(subsystems.len() + 1);
        all.push(platform.health.clone());
        all.extend(subsystems.iter().map(|s| s.health.clone()));
        let cluster = cluster_health(&all);
        let alerts = match self.results.get(&WatchKey::alerts()) {
            Some(Ok(WatchPayload::Alerts(a))) => dedup_alerts(a),
            _ => Vec::new(),
        };
        histogram!("health_merge_ms", t0.elapsed().as_secs_f64() * 1000.0);
        HealthReport {
            loading: openshift.is_pending(),
            cluster,
            platform,
            subsystems,
            alerts,
            flags_epoch: self.activation.as_ref().map(|a| a.snapshot.epoch).unwrap_or(flags.epoch),
            updated_at: Utc::now(),
        }
    }

    /// Event loop: activate, then restart on flag transitions and apply poll
    /// results until `shutdown` fires. Every change publishes a new report.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
        mut flags_rx: watch::Receiver<u64>,
        out: watch::Sender<HealthReport>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        self.activate();
        out.send_replace(self.report());
        let mut flags_open = true;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                changed = flags_rx.changed(), if flags_open => {
                    if changed.is_err() {
                        flags_open = false;
                        continue;
                    }
                    let epoch = *flags_rx.borrow_and_update();
                    info!(epoch, "health: flags changed, restarting");
                    self.restart();
                    out.send_replace(self.report());
                }
                ev = events.recv() => {
                    let Some(ev) = ev else { break; };
                    if self.accept(ev) {
                        out.send_replace(self.report());
                    }
                }
            }
        }
        self.deactivate();
        info!("health: loop ended");
    }
}

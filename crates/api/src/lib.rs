//! Lookout public API façade (in-process).
//!
//! Frontends (CLI today) depend on [`ConsoleApi`] only; [`InProcApi`] wires
//! the registry, flag gate, capability probes and health aggregation together.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use lookout_core::{ConsoleConfig, Extension, ExtensionKind, ExtensionPayload, FlagState, HealthSubsystem, RoutePage, ValidationError};
use lookout_flags::FlagGate;
use lookout_health::{HealthAggregator, HealthReport};
use lookout_kubehub::Collaborators;
use lookout_registry::ExtensionRegistry;
use lookout_watch::WatchManager;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};
use uuid::Uuid;

pub use lookout_compose::{DashboardTab, NavEntry, NavLink, NavTree, PlacedCard};

/// API errors suitable for transport over RPC later.
#[derive(Debug, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("capability: {0}")]
    Capability(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;

impl From<ValidationError> for ConsoleError {
    fn from(e: ValidationError) -> Self { ConsoleError::Validation(e.to_string()) }
}

/// Perspective as shown in the perspective switcher, landing URL resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerspectiveInfo {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub landing_url: String,
    pub default: bool,
}

/// One visible extension, flattened for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtensionSummary {
    pub uid: Uuid,
    pub plugin: String,
    pub kind: String,
    pub summary: String,
    pub required: Option<String>,
}

fn describe(ext: &Extension) -> String {
    match &ext.payload {
        ExtensionPayload::ModelDefinition { models } => {
            models.iter().map(|m| m.gvk_key()).collect::<Vec<_>>().join(", ")
        }
        ExtensionPayload::FeatureFlag(b) => format!("{} <- {}", b.flag, b.model.gvk_key()),
        ExtensionPayload::NavItem(n) => match &n.section {
            Some(s) => format!("{} / {}", s, n.name),
            None => n.name.clone(),
        },
        ExtensionPayload::ResourcePage(p) => format!("{} ({})", p.component, p.model.kind),
        ExtensionPayload::Perspective(p) => format!("{} ({})", p.name, p.id),
        ExtensionPayload::RoutePage(r) => format!("{} {}", r.component, r.paths.join(" ")),
        ExtensionPayload::DashboardsCard(c) => format!("{} @ {}/{:?}", c.component, c.tab, c.position),
        ExtensionPayload::DashboardsTab(t) => format!("{} ({})", t.title, t.id),
        ExtensionPayload::HealthSubsystem(HealthSubsystem::Url(u)) => format!("{} <- {}", u.title, u.url),
        ExtensionPayload::HealthSubsystem(HealthSubsystem::Metric(m)) => format!("{} <- {}", m.title, m.query),
    }
}

/// Stops a background task: signals it first, aborts it if it is still
/// running when the handle is dropped.
pub struct CancelHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl CancelHandle {
    /// Signal the task and wait for it to wind down.
    pub async fn cancel(mut self) {
        if let Some(tx) = self.stop.take() { let _ = tx.send(()); }
        if let Some(task) = self.task.take() { let _ = task.await; }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() { let _ = tx.send(()); }
        if let Some(task) = self.task.take() { task.abort(); }
    }
}

/// Live health reports; the aggregator runs until `cancel` is called or the handle dropped.
pub struct HealthHandle {
    pub rx: watch::Receiver<HealthReport>,
    pub cancel: CancelHandle,
}

/// Declarative console API surface.
#[async_trait::async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn perspectives(&self) -> ConsoleResult<Vec<PerspectiveInfo>>;

    /// Navigation for a perspective; `namespace` scopes namespaced resource links.
    async fn nav(&self, perspective: &str, namespace: Option<&str>) -> ConsoleResult<NavTree>;

    async fn routes(&self, perspective: &str) -> ConsoleResult<Vec<RoutePage>>;

    /// Page that renders `path` in a perspective, if any.
    async fn resolve_route(&self, perspective: &str, path: &str) -> ConsoleResult<RoutePage>;

    async fn dashboards(&self) -> ConsoleResult<Vec<DashboardTab>>;

    /// Extensions visible under the current flags, optionally of one kind.
    async fn extensions(&self, kind: Option<ExtensionKind>) -> ConsoleResult<Vec<ExtensionSummary>>;

    async fn flags(&self) -> ConsoleResult<Vec<(String, FlagState)>>;

    /// Override a flag; returns whether it transitioned.
    async fn set_flag(&self, name: &str, state: FlagState) -> ConsoleResult<bool>;

    /// Resolve capability flags from the cluster; returns how many transitioned.
    async fn probe(&self) -> ConsoleResult<usize>;

    /// Start health aggregation and stream its reports.
    async fn health(&self) -> ConsoleResult<HealthHandle>;
}

// ----------------- In-process implementation -----------------

/// In-process implementation that calls internal crates directly.
pub struct InProcApi {
    registry: Arc<ExtensionRegistry>,
    flags: Arc<FlagGate>,
    config: ConsoleConfig,
    collab: Collaborators,
}

impl InProcApi {
    /// Registry of built-in plugins plus real collaborators.
    pub fn new(config: ConsoleConfig) -> ConsoleResult<Self> {
        let t0 = Instant::now();
        let registry = ExtensionRegistry::with_builtin_plugins(&config)?;
        let collab = Collaborators::from_config(&config).map_err(Self::map_err)?;
        info!(extensions = registry.len(), took_ms = %t0.elapsed().as_millis(), "api: ready");
        Ok(Self::with_parts(Arc::new(registry), FlagGate::shared(), config, collab))
    }

    pub fn with_parts(registry: Arc<ExtensionRegistry>, flags: Arc<FlagGate>, config: ConsoleConfig, collab: Collaborators) -> Self {
        Self { registry, flags, config, collab }
    }

    fn map_err(e: anyhow::Error) -> ConsoleError { ConsoleError::Internal(format!("{:#}", e)) }

    fn require_perspective(&self, id: &str) -> ConsoleResult<()> {
        let snap = self.flags.snapshot();
        lookout_compose::find_perspective(&self.registry, &snap, id)
            .map(|_| ())
            .ok_or_else(|| ConsoleError::NotFound(format!("perspective {}", id)))
    }
}

#[async_trait::async_trait]
impl ConsoleApi for InProcApi {
    async fn perspectives(&self) -> ConsoleResult<Vec<PerspectiveInfo>> {
        let snap = self.flags.snapshot();
        let out = lookout_compose::perspectives(&self.registry, &snap)
            .into_iter()
            .map(|p| PerspectiveInfo {
                id: p.id.clone(),
                name: p.name.clone(),
                icon: p.icon.clone(),
                landing_url: lookout_compose::landing_url(p, &snap).to_string(),
                default: p.default,
            })
            .collect();
        Ok(out)
    }

    async fn nav(&self, perspective: &str, namespace: Option<&str>) -> ConsoleResult<NavTree> {
        self.require_perspective(perspective)?;
        let snap = self.flags.snapshot();
        let tree = lookout_compose::nav_tree(&self.registry, &snap, perspective, namespace);
        info!(perspective = %perspective, ns = %namespace.unwrap_or("(all)"), entries = tree.entries.len(), epoch = snap.epoch, "api: nav");
        Ok(tree)
    }

    async fn routes(&self, perspective: &str) -> ConsoleResult<Vec<RoutePage>> {
        self.require_perspective(perspective)?;
        let snap = self.flags.snapshot();
        Ok(lookout_compose::routes(&self.registry, &snap, perspective).into_iter().cloned().collect())
    }

    async fn resolve_route(&self, perspective: &str, path: &str) -> ConsoleResult<RoutePage> {
        self.require_perspective(perspective)?;
        let snap = self.flags.snapshot();
        let routes = lookout_compose::routes(&self.registry, &snap, perspective);
        lookout_compose::match_route(&routes, path)
            .cloned()
            .ok_or_else(|| ConsoleError::NotFound(format!("no route for {} in {}", path, perspective)))
    }

    async fn dashboards(&self) -> ConsoleResult<Vec<DashboardTab>> {
        let snap = self.flags.snapshot();
        Ok(lookout_compose::dashboard_tabs(&self.registry, &snap))
    }

    async fn extensions(&self, kind: Option<ExtensionKind>) -> ConsoleResult<Vec<ExtensionSummary>> {
        let snap = self.flags.snapshot();
        let view = self.registry.visible(&snap);
        let found = match kind {
            Some(k) => view.query_by_kind(k),
            None => view.all(),
        };
        let out = found
            .into_iter()
            .map(|e| ExtensionSummary {
                uid: e.uid,
                plugin: e.plugin.clone(),
                kind: e.kind.wire_name().to_string(),
                summary: describe(e),
                required: e.required().map(|s| s.to_string()),
            })
            .collect();
        Ok(out)
    }

    async fn flags(&self) -> ConsoleResult<Vec<(String, FlagState)>> {
        let snap = self.flags.snapshot();
        let mut known = snap.entries();
        // Flags referenced by extensions but never resolved show up as pending.
        for name in self.registry.required_flags(&ExtensionKind::ALL) {
            if !known.iter().any(|(k, _)| k == &name) {
                known.push((name, FlagState::Pending));
            }
        }
        known.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(known)
    }

    async fn set_flag(&self, name: &str, state: FlagState) -> ConsoleResult<bool> {
        if !lookout_core::validate::is_valid_flag_name(name) {
            return Err(ConsoleError::Validation(format!("invalid flag name: {}", name)));
        }
        Ok(self.flags.set(name, state))
    }

    async fn probe(&self) -> ConsoleResult<usize> {
        let t0 = Instant::now();
        let bindings = self.registry.flag_bindings();
        match lookout_kubehub::probe_capabilities(&self.flags, &bindings).await {
            Ok(n) => {
                info!(changed = n, took_ms = %t0.elapsed().as_millis(), "api: probe ok");
                Ok(n)
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), took_ms = %t0.elapsed().as_millis(), "api: probe failed");
                Err(ConsoleError::Capability(format!("{:#}", e)))
            }
        }
    }

    async fn health(&self) -> ConsoleResult<HealthHandle> {
        let (mgr, events) = WatchManager::new(self.collab.clone(), self.config.poll_interval());
        let agg = HealthAggregator::new(self.registry.clone(), self.flags.clone(), &self.config, mgr);
        let (out_tx, rx) = watch::channel(HealthReport::initial());
        let (stop_tx, stop_rx) = oneshot::channel();
        let flags_rx = self.flags.subscribe();
        info!(poll_secs = self.config.poll_secs, "api: health start");
        let task = tokio::spawn(agg.run(events, flags_rx, out_tx, stop_rx));
        Ok(HealthHandle { rx, cancel: CancelHandle { stop: Some(stop_tx), task: Some(task) } })
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use lookout_api::{ConsoleApi, ConsoleError, InProcApi, NavEntry};
use lookout_core::{Alert, ConsoleConfig, ExtensionKind, FlagState, HealthState, MetricResult, ResourceSelector};
use lookout_flags::FlagGate;
use lookout_kubehub::{Collaborators, HttpFetch, MetricsQuery, ResourceWatch};
use lookout_registry::plugins::{ADMIN_PERSPECTIVE, DEV_PERSPECTIVE, FLAG_SHOW_PIPELINE};
use lookout_registry::ExtensionRegistry;
use tokio::sync::mpsc;

struct Fake;

#[async_trait]
impl HttpFetch for Fake {
    async fn fetch_text(&self, _url: &str) -> Result<String> { Ok("ok".into()) }
}

#[async_trait]
impl MetricsQuery for Fake {
    async fn query(&self, _query: &str) -> Result<MetricResult> { Ok(MetricResult::default()) }
    async fn alerts(&self) -> Result<Vec<Alert>> { Ok(Vec::new()) }
}

#[async_trait]
impl ResourceWatch for Fake {
    async fn watch(&self, _selector: &ResourceSelector, _tx: mpsc::Sender<Vec<serde_json::Value>>) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn api() -> InProcApi {
    let config = ConsoleConfig { poll_secs: 1, ..ConsoleConfig::default() };
    let registry = Arc::new(ExtensionRegistry::with_builtin_plugins(&config).unwrap());
    let fake = Arc::new(Fake);
    let collab = Collaborators { http: fake.clone(), metrics: fake.clone(), resources: fake };
    InProcApi::with_parts(registry, FlagGate::shared(), config, collab)
}

#[tokio::test]
async fn nav_follows_flag_overrides() {
    let api = api();
    let dev = api.nav(DEV_PERSPECTIVE, Some("demo")).await.unwrap();
    assert!(dev.links().iter().all(|l| l.name != "Pipelines"));

    assert!(api.set_flag(FLAG_SHOW_PIPELINE, FlagState::True).await.unwrap());
    assert!(!api.set_flag(FLAG_SHOW_PIPELINE, FlagState::True).await.unwrap());
    let dev = api.nav(DEV_PERSPECTIVE, Some("demo")).await.unwrap();
    assert!(dev.links().iter().any(|l| l.href == "/k8s/ns/demo/pipelines"));

    let admin = api.nav(ADMIN_PERSPECTIVE, None).await.unwrap();
    assert!(admin.entries.iter().any(|e| matches!(e, NavEntry::Section { name, .. } if name == "Home")));
}

#[tokio::test]
async fn unknown_perspective_and_bad_flag_names_are_rejected() {
    let api = api();
    assert!(matches!(api.nav("ghost", None).await, Err(ConsoleError::NotFound(_))));
    assert!(matches!(api.routes("ghost").await, Err(ConsoleError::NotFound(_))));
    assert!(matches!(api.set_flag("not a flag", FlagState::True).await, Err(ConsoleError::Validation(_))));

    let err = api.resolve_route(ADMIN_PERSPECTIVE, "/nowhere").await.unwrap_err();
    let json = serde_json::to_string(&err).unwrap();
    assert_eq!(serde_json::from_str::<ConsoleError>(&json).unwrap(), err);
}

#[tokio::test]
async fn perspectives_and_routes() {
    let api = api();
    let ps = api.perspectives().await.unwrap();
    let admin = ps.iter().find(|p| p.id == ADMIN_PERSPECTIVE).unwrap();
    assert!(admin.default);
    let dev = ps.iter().find(|p| p.id == DEV_PERSPECTIVE).unwrap();
    assert_eq!(dev.landing_url, "/add");

    api.set_flag("OPENSHIFT", FlagState::True).await.unwrap();
    let dev = api.perspectives().await.unwrap().into_iter().find(|p| p.id == DEV_PERSPECTIVE).unwrap();
    assert_eq!(dev.landing_url, "/topology");
    assert_eq!(api.resolve_route(DEV_PERSPECTIVE, "/topology/ns/demo").await.unwrap().component, "TopologyPage");
}

#[tokio::test]
async fn extensions_hide_gated_entries_and_flags_list_pending() {
    let api = api();
    let navs = api.extensions(Some(ExtensionKind::NavItemResourceNs)).await.unwrap();
    assert!(!navs.is_empty());
    assert!(navs.iter().all(|e| e.kind == "NavItem/ResourceNS"));
    assert!(navs.iter().all(|e| e.required.is_none()));
    let all = api.extensions(None).await.unwrap();
    assert!(all.iter().all(|e| e.required.is_none()));

    let flags = api.flags().await.unwrap();
    assert!(flags.windows(2).all(|w| w[0].0 < w[1].0));
    assert!(flags.contains(&(FLAG_SHOW_PIPELINE.to_string(), FlagState::Pending)));

    api.set_flag(FLAG_SHOW_PIPELINE, FlagState::True).await.unwrap();
    let navs = api.extensions(Some(ExtensionKind::NavItemResourceNs)).await.unwrap();
    assert!(navs.iter().any(|e| e.required.as_deref() == Some(FLAG_SHOW_PIPELINE)));
    let now = api.extensions(None).await.unwrap();
    let unlocked = now.iter().filter(|e| e.required.as_deref() == Some(FLAG_SHOW_PIPELINE)).count();
    assert!(unlocked > 0);
    assert_eq!(now.len(), all.len() + unlocked);
}

#[tokio::test]
async fn health_stream_reports_and_cancels() {
    let api = api();
    let mut handle = api.health().await.unwrap();
    let report = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            {
                let r = handle.rx.borrow_and_update();
                if r.platform.health.state == HealthState::Ok {
                    return r.clone();
                }
            }
            handle.rx.changed().await.unwrap();
        }
    })
    .await
    .expect("report in time");
    assert_eq!(report.platform.health.message.as_deref(), Some("Kubernetes is healthy"));
    assert!(report.loading);

    tokio::time::timeout(Duration::from_secs(2), handle.cancel.cancel()).await.expect("cancelled in time");
}

//! kube discovery, capability probes and resource watches.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use kube::{
    api::Api,
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    runtime::watcher::{self, Event},
    Client,
};
use lookout_core::{FeatureFlagBinding, FlagState, ResourceSelector, FLAG_OPENSHIFT};
use lookout_flags::FlagGate;
use metrics::counter;
use once_cell::sync::Lazy;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

use crate::ResourceWatch;

/// API group whose presence identifies the vendor distribution.
const OPENSHIFT_GROUP: &str = "project.openshift.io";

static KUBE_CLIENT: Lazy<OnceCell<Client>> = Lazy::new(OnceCell::new);

/// Shared kube client, created from the default config on first use.
pub async fn get_kube_client() -> Result<Client> {
    let client = KUBE_CLIENT
        .get_or_try_init(|| async { Client::try_default().await.context("creating kube client") })
        .await?;
    Ok(client.clone())
}

pub fn parse_gvk_key(key: &str) -> Result<GroupVersionKind> {
    let parts: Vec<_> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] => Ok(GroupVersionKind { group: String::new(), version: version.to_string(), kind: kind.to_string() }),
        [group, version, kind] => Ok(GroupVersionKind { group: (*group).to_string(), version: (*version).to_string(), kind: (*kind).to_string() }),
        _ => Err(anyhow!("invalid gvk key: {} (expect v1/Kind or group/v1/Kind)", key)),
    }
}

/// Served groups and (group, kind) pairs, as reported by discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServedApis {
    pub groups: BTreeSet<String>,
    pub kinds: BTreeSet<(String, String)>,
}

impl ServedApis {
    pub async fn discover(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client).run().await.context("running api discovery")?;
        let mut served = ServedApis::default();
        for group in discovery.groups() {
            served.groups.insert(group.name().to_string());
            for (ar, _caps) in group.recommended_resources() {
                served.kinds.insert((ar.group.clone(), ar.kind.clone()));
            }
        }
        Ok(served)
    }

    pub fn serves_kind(&self, group: &str, kind: &str) -> bool {
        self.kinds.contains(&(group.to_string(), kind.to_string()))
    }
}

/// Flag states implied by the served APIs: `OPENSHIFT` plus one entry per
/// model binding. A flag bound to several models is true if any is served.
pub fn resolve_flags(served: &ServedApis, bindings: &[&FeatureFlagBinding]) -> Vec<(String, FlagState)> {
    let mut out: BTreeMap<String, bool> = BTreeMap::new();
    out.insert(FLAG_OPENSHIFT.to_string(), served.groups.contains(OPENSHIFT_GROUP));
    for b in bindings {
        let hit = served.serves_kind(&b.model.group, &b.model.kind);
        *out.entry(b.flag.clone()).or_insert(false) |= hit;
    }
    out.into_iter().map(|(k, v)| (k, FlagState::from(v))).collect()
}

/// Run discovery once and record the resulting flags. Returns the number of
/// flags that transitioned.
pub async fn probe_capabilities(gate: &FlagGate, bindings: &[&FeatureFlagBinding]) -> Result<usize> {
    let t0 = Instant::now();
    let client = get_kube_client().await?;
    let served = ServedApis::discover(client).await?;
    let mut changed = 0;
    for (flag, state) in resolve_flags(&served, bindings) {
        if gate.set(&flag, state) {
            changed += 1;
        }
    }
    info!(groups = served.groups.len(), changed, took_ms = %t0.elapsed().as_millis(), "probe: capabilities resolved");
    Ok(changed)
}

/// Group, version and kind must all match; the group's preferred version is
/// not substituted for the requested one.
fn is_resource_for(ar: &ApiResource, gvk: &GroupVersionKind) -> bool {
    ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind
}

async fn find_api_resource(client: Client, gvk: &GroupVersionKind) -> Result<(ApiResource, bool)> {
    let discovery = Discovery::new(client).run().await?;
    for group in discovery.groups().filter(|g| g.name() == gvk.group) {
        for (ar, caps) in group.versioned_resources(&gvk.version) {
            if is_resource_for(&ar, gvk) {
                let namespaced = matches!(caps.scope, Scope::Namespaced);
                return Ok((ar, namespaced));
            }
        }
    }
    Err(anyhow!("GVK not found: {}/{}/{}", gvk.group, gvk.version, gvk.kind))
}

fn object_value(obj: &DynamicObject) -> Result<(String, serde_json::Value)> {
    let key = obj
        .metadata
        .uid
        .clone()
        .or_else(|| obj.metadata.name.clone())
        .ok_or_else(|| anyhow!("object missing metadata.uid and metadata.name"))?;
    let mut raw = serde_json::to_value(obj).context("serializing DynamicObject")?;
    if let Some(meta) = raw.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
    }
    Ok((key, raw))
}

/// Resource watch on `kube::runtime::watcher`, keeping the current list keyed by uid.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeResourceWatch;

#[async_trait]
impl ResourceWatch for KubeResourceWatch {
    async fn watch(&self, selector: &ResourceSelector, tx: mpsc::Sender<Vec<serde_json::Value>>) -> Result<()> {
        let client = get_kube_client().await?;
        let gvk = parse_gvk_key(&selector.gvk)?;
        let (ar, namespaced) = find_api_resource(client.clone(), &gvk).await?;
        let api: Api<DynamicObject> = match (namespaced, selector.namespace.as_deref()) {
            (true, Some(ns)) => Api::namespaced_with(client, ns, &ar),
            _ => Api::all_with(client, &ar),
        };

        let stream = watcher::watcher(api, watcher::Config::default());
        futures::pin_mut!(stream);
        info!(gvk = %selector.gvk, ns = ?selector.namespace, "kube: watcher started");
        let mut items: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        while let Some(ev) = stream.try_next().await? {
            match ev {
                Event::Applied(o) => {
                    let (k, v) = object_value(&o)?;
                    items.insert(k, v);
                }
                Event::Deleted(o) => {
                    let (k, _) = object_value(&o)?;
                    items.remove(&k);
                }
                Event::Restarted(list) => {
                    debug!(count = list.len(), "kube: watch restart");
                    items.clear();
                    for o in list.iter() {
                        let (k, v) = object_value(o)?;
                        items.insert(k, v);
                    }
                }
            }
            counter!("kube_watch_updates_total", 1u64);
            if tx.send(items.values().cloned().collect()).await.is_err() {
                debug!(gvk = %selector.gvk, "kube: receiver dropped");
                return Ok(());
            }
        }
        warn!(gvk = %selector.gvk, "kube: watcher stream ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::K8sModel;

    fn binding(group: &str, kind: &str, flag: &str) -> FeatureFlagBinding {
        FeatureFlagBinding {
            model: K8sModel {
                group: group.into(),
                version: "v1".into(),
                kind: kind.into(),
                plural: format!("{}s", kind.to_lowercase()),
                label: kind.into(),
                namespaced: true,
                crd: true,
            },
            flag: flag.into(),
        }
    }

    #[test]
    fn gvk_keys_parse() {
        assert_eq!(parse_gvk_key("v1/Node").unwrap().group, "");
        assert_eq!(parse_gvk_key("ceph.rook.io/v1/CephCluster").unwrap().kind, "CephCluster");
        assert!(parse_gvk_key("Node").is_err());
    }

    #[test]
    fn resource_lookup_honours_version() {
        let wanted = parse_gvk_key("ceph.rook.io/v1/CephCluster").unwrap();
        assert!(is_resource_for(&ApiResource::from_gvk(&wanted), &wanted));
        let beta = parse_gvk_key("ceph.rook.io/v1beta1/CephCluster").unwrap();
        assert!(!is_resource_for(&ApiResource::from_gvk(&beta), &wanted));
        let other = parse_gvk_key("ceph.rook.io/v1/CephBlockPool").unwrap();
        assert!(!is_resource_for(&ApiResource::from_gvk(&other), &wanted));
    }

    #[test]
    fn flags_follow_served_apis() {
        let mut served = ServedApis::default();
        served.groups.insert("tekton.dev".into());
        served.kinds.insert(("tekton.dev".into(), "Pipeline".into()));
        let pipeline = binding("tekton.dev", "Pipeline", "SHOW_PIPELINE");
        let ceph = binding("ceph.rook.io", "CephCluster", "CEPH");
        let flags = resolve_flags(&served, &[&pipeline, &ceph]);
        assert_eq!(
            flags,
            vec![
                ("CEPH".to_string(), FlagState::False),
                ("OPENSHIFT".to_string(), FlagState::False),
                ("SHOW_PIPELINE".to_string(), FlagState::True),
            ]
        );
        served.groups.insert(OPENSHIFT_GROUP.into());
        assert!(resolve_flags(&served, &[]).contains(&("OPENSHIFT".to_string(), FlagState::True)));
    }
}

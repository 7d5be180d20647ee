//! Lookout flag gate: process-wide three-valued feature flags.
//!
//! Readers take an immutable [`FlagsSnapshot`] for the duration of one
//! computation; writers (capability probes) swap in a new snapshot and bump
//! the epoch so dependent views recompute.

#![forbid(unsafe_code)]

use std::sync::Arc;

use arc_swap::ArcSwap;
use lookout_core::{Extension, FlagState};
use metrics::counter;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

/// Immutable view of all flag states at one epoch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlagsSnapshot {
    pub epoch: u64,
    states: FxHashMap<String, FlagState>,
}

impl FlagsSnapshot {
    pub fn get(&self, name: &str) -> FlagState { self.states.get(name).copied().unwrap_or_default() }

    pub fn is_pending(&self, name: &str) -> bool { self.get(name).is_pending() }

    /// Visible when ungated, or when the gating flag is exactly true.
    pub fn allows(&self, required: Option<&str>) -> bool {
        match required {
            None => true,
            Some(flag) => self.get(flag).is_true(),
        }
    }

    pub fn filter_by_flags<'a, I>(&self, extensions: I) -> Vec<&'a Extension>
    where
        I: IntoIterator<Item = &'a Extension>,
    {
        extensions.into_iter().filter(|e| self.allows(e.required())).collect()
    }

    /// Known flags sorted by name.
    pub fn entries(&self) -> Vec<(String, FlagState)> {
        let mut out: Vec<(String, FlagState)> = self.states.iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// Shared flag store. Construct once and pass around by `Arc`.
pub struct FlagGate {
    flags: ArcSwap<FlagsSnapshot>,
    epoch_tx: watch::Sender<u64>,
}

impl Default for FlagGate {
    fn default() -> Self { Self::new() }
}

impl FlagGate {
    pub fn new() -> Self {
        let (epoch_tx, _rx) = watch::channel(0u64);
        Self { flags: ArcSwap::from_pointee(FlagsSnapshot::default()), epoch_tx }
    }

    pub fn shared() -> Arc<Self> { Arc::new(Self::new()) }

    pub fn get(&self, name: &str) -> FlagState { self.flags.load().get(name) }

    pub fn is_pending(&self, name: &str) -> bool { self.get(name).is_pending() }

    pub fn snapshot(&self) -> Arc<FlagsSnapshot> { self.flags.load_full() }

    pub fn epoch(&self) -> u64 { self.flags.load().epoch }

    /// Record a probe result. Returns true when the state actually transitioned;
    /// only transitions bump the epoch and notify subscribers.
    pub fn set(&self, name: &str, value: FlagState) -> bool {
        let mut changed = false;
        self.flags.rcu(|cur| {
            let mut next = FlagsSnapshot::clone(cur);
            changed = next.get(name) != value;
            if changed {
                next.states.insert(name.to_string(), value);
                next.epoch += 1;
            }
            next
        });
        if changed {
            let epoch = self.epoch();
            info!(flag = %name, state = ?value, epoch, "flags: transition");
            counter!("flag_transitions_total", 1u64);
            self.epoch_tx.send_replace(epoch);
        } else {
            debug!(flag = %name, state = ?value, "flags: unchanged");
        }
        changed
    }

    pub fn filter_by_flags<'a, I>(&self, extensions: I) -> Vec<&'a Extension>
    where
        I: IntoIterator<Item = &'a Extension>,
    {
        self.snapshot().filter_by_flags(extensions)
    }

    /// Receiver notified with the new epoch after every transition.
    pub fn subscribe(&self) -> watch::Receiver<u64> { self.epoch_tx.subscribe() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::{ExtensionPayload, NavItem};

    fn gated(flag: Option<&str>) -> Extension {
        let mut item = NavItem::href("Topology", "/topology").perspective("dev");
        if let Some(f) = flag { item = item.required(f); }
        Extension::new("test", ExtensionPayload::NavItem(item))
    }

    #[test]
    fn unknown_flags_are_pending_and_fail_closed() {
        let gate = FlagGate::new();
        assert_eq!(gate.get("NEVER_SET"), FlagState::Pending);
        assert!(gate.is_pending("NEVER_SET"));
        let exts = vec![gated(None), gated(Some("NEVER_SET"))];
        let visible = gate.filter_by_flags(&exts);
        assert_eq!(visible.len(), 1);
        assert!(visible[0].required().is_none());
    }

    #[test]
    fn only_true_admits_gated_extensions() {
        let gate = FlagGate::new();
        let exts = vec![gated(Some("F"))];
        assert!(gate.filter_by_flags(&exts).is_empty());
        gate.set("F", FlagState::True);
        assert_eq!(gate.filter_by_flags(&exts).len(), 1);
        gate.set("F", FlagState::False);
        assert!(gate.filter_by_flags(&exts).is_empty());
    }

    #[test]
    fn epoch_moves_on_transitions_only() {
        let gate = FlagGate::new();
        assert!(gate.set("A", FlagState::True));
        assert!(!gate.set("A", FlagState::True));
        assert!(gate.set("A", FlagState::False));
        assert_eq!(gate.epoch(), 2);
        let old = gate.snapshot();
        gate.set("B", FlagState::True);
        assert_eq!(old.get("B"), FlagState::Pending);
        assert_eq!(gate.snapshot().entries(), vec![("A".into(), FlagState::False), ("B".into(), FlagState::True)]);
    }

    #[tokio::test]
    async fn subscribers_are_pushed_new_epochs() {
        let gate = FlagGate::shared();
        let mut rx = gate.subscribe();
        let g = gate.clone();
        tokio::spawn(async move { g.set("OPENSHIFT", FlagState::True); });
        tokio::time::timeout(std::time::Duration::from_secs(1), rx.changed()).await.unwrap().unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}

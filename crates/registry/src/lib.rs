//! Lookout extension registry.
//!
//! Plugins are registered once through [`RegistryBuilder`]; the built
//! [`ExtensionRegistry`] is immutable and queried through a flag-filtered
//! [`Visible`] view so gated extensions stay hidden until their flag is true.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::time::Instant;

use lookout_core::validate::validate_payload;
use lookout_core::{
    ConsoleConfig, DashboardsCard, DashboardsTab, Extension, ExtensionKind, ExtensionPayload, FeatureFlagBinding, HealthSubsystem,
    MetricSubsystem, NavItem, Perspective, Plugin, ResourcePage, RoutePage, UrlSubsystem, ValidationError,
};
use lookout_flags::FlagsSnapshot;
use metrics::histogram;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

pub mod plugins;

/// Id of the built-in overview dashboard tab. Cards may target it without a tab extension.
pub const OVERVIEW_TAB: &str = "overview";

/// Collects plugin contributions at startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    plugins: Vec<String>,
    extensions: Vec<Extension>,
}

impl RegistryBuilder {
    pub fn new() -> Self { Self::default() }

    /// Register one plugin module. Either every extension of the plugin is
    /// accepted or none is.
    pub fn register(&mut self, plugin: Plugin) -> Result<&mut Self, ValidationError> {
        if plugin.name.trim().is_empty() {
            return Err(ValidationError::EmptyPluginName);
        }
        if self.plugins.iter().any(|p| p == &plugin.name) {
            return Err(ValidationError::DuplicatePlugin(plugin.name));
        }
        for (index, payload) in plugin.extensions.iter().enumerate() {
            validate_payload(payload).map_err(|e| ValidationError::InvalidExtension {
                plugin: plugin.name.clone(),
                index,
                kind: payload.kind().wire_name(),
                field: e.field,
                reason: e.reason,
            })?;
        }
        let count = plugin.extensions.len();
        for payload in plugin.extensions {
            self.extensions.push(Extension::new(&plugin.name, payload));
        }
        info!(plugin = %plugin.name, extensions = count, "registry: plugin registered");
        self.plugins.push(plugin.name);
        Ok(self)
    }

    /// Run cross-extension checks and freeze the registry.
    pub fn build(self) -> Result<ExtensionRegistry, ValidationError> {
        let t0 = Instant::now();
        let mut perspectives: FxHashMap<&str, &str> = FxHashMap::default();
        let mut tabs: FxHashMap<&str, &str> = FxHashMap::default();
        for ext in &self.extensions {
            let (seen, what, id) = match &ext.payload {
                ExtensionPayload::Perspective(p) => (&mut perspectives, "perspective", p.id.as_str()),
                ExtensionPayload::DashboardsTab(t) => (&mut tabs, "dashboards tab", t.id.as_str()),
                _ => continue,
            };
            if let Some(first) = seen.insert(id, ext.plugin.as_str()) {
                return Err(ValidationError::Duplicate {
                    plugin: ext.plugin.clone(),
                    what,
                    id: id.to_string(),
                    first: first.to_string(),
                });
            }
        }
        if tabs.contains_key(OVERVIEW_TAB) {
            let plugin = tabs[OVERVIEW_TAB];
            return Err(ValidationError::Duplicate {
                plugin: plugin.to_string(),
                what: "dashboards tab",
                id: OVERVIEW_TAB.to_string(),
                first: "(built-in)".to_string(),
            });
        }

        // Index of each extension within its own plugin, for error messages.
        let mut per_plugin: FxHashMap<&str, usize> = FxHashMap::default();
        for ext in &self.extensions {
            let index = {
                let n = per_plugin.entry(ext.plugin.as_str()).or_insert(0);
                *n += 1;
                *n - 1
            };
            let unknown = |what: &'static str, id: &str| ValidationError::UnknownReference {
                plugin: ext.plugin.clone(),
                index,
                kind: ext.kind.wire_name(),
                what,
                id: id.to_string(),
            };
            if let Some(p) = ext.perspective() {
                if !perspectives.contains_key(p) {
                    return Err(unknown("perspective", p));
                }
            }
            if let ExtensionPayload::DashboardsCard(c) = &ext.payload {
                if c.tab != OVERVIEW_TAB && !tabs.contains_key(c.tab.as_str()) {
                    return Err(unknown("dashboards tab", &c.tab));
                }
            }
        }
        histogram!("registry_build_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(plugins = self.plugins.len(), extensions = self.extensions.len(), "registry: built");
        Ok(ExtensionRegistry { plugins: self.plugins, extensions: self.extensions })
    }
}

/// Immutable, ordered set of registered extensions.
#[derive(Debug)]
pub struct ExtensionRegistry {
    plugins: Vec<String>,
    extensions: Vec<Extension>,
}

impl ExtensionRegistry {
    pub fn builder() -> RegistryBuilder { RegistryBuilder::new() }

    /// Registry populated with every built-in plugin module.
    pub fn with_builtin_plugins(config: &ConsoleConfig) -> Result<Self, ValidationError> {
        let mut b = RegistryBuilder::new();
        for plugin in plugins::builtin(config) {
            b.register(plugin)?;
        }
        b.build()
    }

    pub fn len(&self) -> usize { self.extensions.len() }
    pub fn is_empty(&self) -> bool { self.extensions.is_empty() }
    pub fn plugins(&self) -> &[String] { &self.plugins }

    /// Flag-filtered view bound to one flags snapshot.
    pub fn visible<'a>(&'a self, flags: &'a FlagsSnapshot) -> Visible<'a> {
        Visible { registry: self, flags }
    }

    /// Flags referenced by extensions of the given kinds.
    pub fn required_flags(&self, kinds: &[ExtensionKind]) -> BTreeSet<String> {
        self.extensions
            .iter()
            .filter(|e| kinds.contains(&e.kind))
            .filter_map(|e| e.required().map(|s| s.to_string()))
            .collect()
    }

    /// Model-existence flag bindings; consumed by capability probes.
    pub fn flag_bindings(&self) -> Vec<&FeatureFlagBinding> {
        self.extensions
            .iter()
            .filter_map(|e| match &e.payload {
                ExtensionPayload::FeatureFlag(b) => Some(b),
                _ => None,
            })
            .collect()
    }
}

/// Registry view that only yields extensions allowed by a flags snapshot.
#[derive(Clone, Copy)]
pub struct Visible<'a> {
    registry: &'a ExtensionRegistry,
    flags: &'a FlagsSnapshot,
}

impl<'a> Visible<'a> {
    pub fn flags(&self) -> &'a FlagsSnapshot { self.flags }

    fn allowed(&self) -> impl Iterator<Item = &'a Extension> + 'a {
        let flags = self.flags;
        self.registry.extensions.iter().filter(move |e| flags.allows(e.required()))
    }

    pub fn all(&self) -> Vec<&'a Extension> { self.allowed().collect() }

    /// Extensions of `kind` in registration order.
    pub fn query_by_kind(&self, kind: ExtensionKind) -> Vec<&'a Extension> {
        self.allowed().filter(|e| e.kind == kind).collect()
    }

    pub fn query_by_kind_with<P>(&self, kind: ExtensionKind, predicate: P) -> Vec<&'a Extension>
    where
        P: Fn(&Extension) -> bool,
    {
        self.allowed().filter(|e| e.kind == kind && predicate(e)).collect()
    }

    pub fn nav_items(&self) -> Vec<&'a NavItem> {
        self.allowed()
            .filter_map(|e| match &e.payload {
                ExtensionPayload::NavItem(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn resource_pages(&self) -> Vec<&'a ResourcePage> {
        self.allowed()
            .filter_map(|e| match &e.payload {
                ExtensionPayload::ResourcePage(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn perspectives(&self) -> Vec<&'a Perspective> {
        self.allowed()
            .filter_map(|e| match &e.payload {
                ExtensionPayload::Perspective(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn route_pages(&self) -> Vec<&'a RoutePage> {
        self.allowed()
            .filter_map(|e| match &e.payload {
                ExtensionPayload::RoutePage(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn dashboards_cards(&self) -> Vec<&'a DashboardsCard> {
        self.allowed()
            .filter_map(|e| match &e.payload {
                ExtensionPayload::DashboardsCard(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn dashboards_tabs(&self) -> Vec<&'a DashboardsTab> {
        self.allowed()
            .filter_map(|e| match &e.payload {
                ExtensionPayload::DashboardsTab(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn health_subsystems(&self) -> Vec<&'a HealthSubsystem> {
        let out: Vec<&HealthSubsystem> = self
            .allowed()
            .filter_map(|e| match &e.payload {
                ExtensionPayload::HealthSubsystem(s) => Some(s),
                _ => None,
            })
            .collect();
        debug!(count = out.len(), epoch = self.flags.epoch, "registry: health subsystems");
        out
    }

    pub fn url_health_subsystems(&self) -> Vec<&'a UrlSubsystem> {
        self.health_subsystems()
            .into_iter()
            .filter_map(|s| match s {
                HealthSubsystem::Url(u) => Some(u),
                HealthSubsystem::Metric(_) => None,
            })
            .collect()
    }

    pub fn metric_health_subsystems(&self) -> Vec<&'a MetricSubsystem> {
        self.health_subsystems()
            .into_iter()
            .filter_map(|s| match s {
                HealthSubsystem::Metric(m) => Some(m),
                HealthSubsystem::Url(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_plugins_build() {
        let reg = ExtensionRegistry::with_builtin_plugins(&ConsoleConfig::default()).unwrap();
        assert!(reg.plugins().iter().any(|p| p == "dev-console"));
        let snap = lookout_flags::FlagGate::new().snapshot();
        let models = reg.visible(&snap).query_by_kind(ExtensionKind::ModelDefinition);
        assert!(models.iter().any(|e| matches!(&e.payload, ExtensionPayload::ModelDefinition { models } if models.iter().any(|m| m.plural == "pipelines"))));
        assert!(!reg.flag_bindings().is_empty());
    }

    #[test]
    fn failed_plugin_registers_nothing() {
        let mut b = RegistryBuilder::new();
        let plugin = Plugin::new("broken")
            .with(NavItem::href("Ok", "/ok"))
            .with(NavItem::href("Bad", "bad"));
        let err = b.register(plugin).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidExtension { index: 1, field: "href", .. }));
        let reg = b.build().unwrap();
        assert!(reg.is_empty());
        assert!(reg.plugins().is_empty());
    }
}

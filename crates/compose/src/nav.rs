use lookout_core::{NavItem, NavTarget};
use lookout_flags::FlagsSnapshot;
use lookout_registry::ExtensionRegistry;
use serde::Serialize;

use crate::default_perspective;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NavLink {
    pub name: String,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NavEntry {
    Link(NavLink),
    Section { name: String, items: Vec<NavLink> },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NavTree {
    pub perspective: String,
    pub entries: Vec<NavEntry>,
}

impl NavTree {
    /// All links in display order, sections flattened.
    pub fn links(&self) -> Vec<&NavLink> {
        self.entries
            .iter()
            .flat_map(|e| match e {
                NavEntry::Link(l) => vec![l],
                NavEntry::Section { items, .. } => items.iter().collect(),
            })
            .collect()
    }
}

/// URL a nav item points at. Namespaced resources fall back to the
/// all-namespaces list when no namespace is selected.
pub fn resolve_href(target: &NavTarget, namespace: Option<&str>) -> String {
    match target {
        NavTarget::Href(h) => h.clone(),
        NavTarget::ResourceNs(plural) => match namespace {
            Some(ns) => format!("/k8s/ns/{}/{}", ns, plural),
            None => format!("/k8s/all-namespaces/{}", plural),
        },
        NavTarget::ResourceCluster(plural) => format!("/k8s/cluster/{}", plural),
    }
}

/// Navigation of one perspective. Items without a perspective belong to the
/// default one; sections appear where their first item does.
pub fn nav_tree(registry: &ExtensionRegistry, flags: &FlagsSnapshot, perspective: &str, namespace: Option<&str>) -> NavTree {
    let fallback = default_perspective(registry, flags).map(|p| p.id.clone());
    let belongs = |item: &NavItem| match item.perspective.as_deref() {
        Some(p) => p == perspective,
        None => fallback.as_deref() == Some(perspective),
    };
    let mut entries: Vec<NavEntry> = Vec::new();
    for item in registry.visible(flags).nav_items().into_iter().filter(|i| belongs(*i)) {
        let link = NavLink {
            name: item.name.clone(),
            href: resolve_href(&item.target, namespace),
            test_id: item.test_id.clone(),
        };
        let Some(section) = item.section.as_deref() else {
            entries.push(NavEntry::Link(link));
            continue;
        };
        let existing = entries.iter_mut().find_map(|e| match e {
            NavEntry::Section { name, items } if name == section => Some(items),
            _ => None,
        });
        match existing {
            Some(items) => items.push(link),
            None => entries.push(NavEntry::Section { name: section.to_string(), items: vec![link] }),
        }
    }
    NavTree { perspective: perspective.to_string(), entries }
}

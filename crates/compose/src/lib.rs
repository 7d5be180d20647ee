//! Lookout compose: flag-filtered views over the registry for the presentation layer
//! (dashboard grid, navigation, perspectives and routing).

#![forbid(unsafe_code)]

use lookout_core::{ModelRef, PageKind, Perspective, ResourcePage, RoutePage, FLAG_OPENSHIFT};
use lookout_flags::FlagsSnapshot;
use lookout_registry::ExtensionRegistry;

mod dashboard;
mod nav;

pub use dashboard::{dashboard_tabs, DashboardTab, PlacedCard};
pub use nav::{nav_tree, resolve_href, NavEntry, NavLink, NavTree};

pub fn perspectives<'a>(registry: &'a ExtensionRegistry, flags: &'a FlagsSnapshot) -> Vec<&'a Perspective> {
    registry.visible(flags).perspectives()
}

/// The perspective flagged default, else the first registered.
pub fn default_perspective<'a>(registry: &'a ExtensionRegistry, flags: &'a FlagsSnapshot) -> Option<&'a Perspective> {
    let all = perspectives(registry, flags);
    all.iter().find(|p| p.default).or_else(|| all.first()).copied()
}

pub fn find_perspective<'a>(registry: &'a ExtensionRegistry, flags: &'a FlagsSnapshot, id: &str) -> Option<&'a Perspective> {
    perspectives(registry, flags).into_iter().find(|p| p.id == id)
}

/// Landing page of a perspective; plain Kubernetes clusters get the k8s variant.
pub fn landing_url<'a>(perspective: &'a Perspective, flags: &FlagsSnapshot) -> &'a str {
    if flags.get(FLAG_OPENSHIFT).is_true() {
        &perspective.landing_url
    } else {
        &perspective.k8s_landing_url
    }
}

/// Route pages active in a perspective: global routes plus the perspective's own.
pub fn routes<'a>(registry: &'a ExtensionRegistry, flags: &'a FlagsSnapshot, perspective: &str) -> Vec<&'a RoutePage> {
    registry
        .visible(flags)
        .route_pages()
        .into_iter()
        .filter(|r| r.perspective.as_deref().map(|p| p == perspective).unwrap_or(true))
        .collect()
}

fn path_matches(pattern: &str, path: &str, exact: bool) -> bool {
    let pat: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segs.len() < pat.len() || (exact && segs.len() != pat.len()) {
        return false;
    }
    pat.iter().zip(segs.iter()).all(|(p, s)| p.starts_with(':') || p == s)
}

/// First route whose paths match `path`; `:param` segments match any segment.
pub fn match_route<'a>(routes: &[&'a RoutePage], path: &str) -> Option<&'a RoutePage> {
    routes.iter().copied().find(|r| r.paths.iter().any(|p| path_matches(p, path, r.exact)))
}

pub fn resource_page<'a>(
    registry: &'a ExtensionRegistry,
    flags: &'a FlagsSnapshot,
    model: &ModelRef,
    page: PageKind,
) -> Option<&'a ResourcePage> {
    registry.visible(flags).resource_pages().into_iter().find(|p| p.page == page && &p.model == model)
}

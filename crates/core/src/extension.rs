//! Extension records contributed by plugin modules.
//!
//! The set of kinds is closed: every contribution is one variant of
//! [`ExtensionPayload`], validated against its kind's schema at registration.

use std::sync::Arc;

use serde::Serialize;
use smallvec::SmallVec;
use uuid::Uuid;

use crate::health::SubsystemHealth;
use crate::metric::{MetricResult, ResourceSelector};
use crate::FlagName;

/// Discriminant of an extension, including the sub-variant for nav items,
/// resource pages and health subsystems.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionKind {
    #[serde(rename = "ModelDefinition")]
    ModelDefinition,
    #[serde(rename = "FeatureFlag/Model")]
    FeatureFlagBinding,
    #[serde(rename = "NavItem/Href")]
    NavItemHref,
    #[serde(rename = "NavItem/ResourceNS")]
    NavItemResourceNs,
    #[serde(rename = "NavItem/ResourceCluster")]
    NavItemResourceCluster,
    #[serde(rename = "Page/Resource/List")]
    ResourceListPage,
    #[serde(rename = "Page/Resource/Details")]
    ResourceDetailsPage,
    #[serde(rename = "Perspective")]
    Perspective,
    #[serde(rename = "Page/Route")]
    RoutePage,
    #[serde(rename = "Dashboards/Card")]
    DashboardsCard,
    #[serde(rename = "Dashboards/Tab")]
    DashboardsTab,
    #[serde(rename = "Dashboards/Overview/Health/URL")]
    HealthUrlSubsystem,
    #[serde(rename = "Dashboards/Overview/Health/Prometheus")]
    HealthMetricSubsystem,
}

impl ExtensionKind {
    pub const ALL: [ExtensionKind; 13] = [
        ExtensionKind::ModelDefinition,
        ExtensionKind::FeatureFlagBinding,
        ExtensionKind::NavItemHref,
        ExtensionKind::NavItemResourceNs,
        ExtensionKind::NavItemResourceCluster,
        ExtensionKind::ResourceListPage,
        ExtensionKind::ResourceDetailsPage,
        ExtensionKind::Perspective,
        ExtensionKind::RoutePage,
        ExtensionKind::DashboardsCard,
        ExtensionKind::DashboardsTab,
        ExtensionKind::HealthUrlSubsystem,
        ExtensionKind::HealthMetricSubsystem,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            ExtensionKind::ModelDefinition => "ModelDefinition",
            ExtensionKind::FeatureFlagBinding => "FeatureFlag/Model",
            ExtensionKind::NavItemHref => "NavItem/Href",
            ExtensionKind::NavItemResourceNs => "NavItem/ResourceNS",
            ExtensionKind::NavItemResourceCluster => "NavItem/ResourceCluster",
            ExtensionKind::ResourceListPage => "Page/Resource/List",
            ExtensionKind::ResourceDetailsPage => "Page/Resource/Details",
            ExtensionKind::Perspective => "Perspective",
            ExtensionKind::RoutePage => "Page/Route",
            ExtensionKind::DashboardsCard => "Dashboards/Card",
            ExtensionKind::DashboardsTab => "Dashboards/Tab",
            ExtensionKind::HealthUrlSubsystem => "Dashboards/Overview/Health/URL",
            ExtensionKind::HealthMetricSubsystem => "Dashboards/Overview/Health/Prometheus",
        }
    }

}

impl std::fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.wire_name()) }
}

impl std::str::FromStr for ExtensionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExtensionKind::ALL
            .iter()
            .copied()
            .find(|k| k.wire_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown extension kind: {}", s))
    }
}

/// A registered extension. Immutable once the registry is built.
#[derive(Debug, Clone, Serialize)]
pub struct Extension {
    pub uid: Uuid,
    pub plugin: String,
    #[serde(rename = "type")]
    pub kind: ExtensionKind,
    #[serde(rename = "properties")]
    pub payload: ExtensionPayload,
}

impl Extension {
    pub fn new(plugin: &str, payload: ExtensionPayload) -> Self {
        Self { uid: Uuid::new_v4(), plugin: plugin.to_string(), kind: payload.kind(), payload }
    }

    pub fn required(&self) -> Option<&str> { self.payload.required() }
    pub fn perspective(&self) -> Option<&str> { self.payload.perspective() }
}

/// Kind-specific payload of an extension.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExtensionPayload {
    ModelDefinition { models: Vec<K8sModel> },
    FeatureFlag(FeatureFlagBinding),
    NavItem(NavItem),
    ResourcePage(ResourcePage),
    Perspective(Perspective),
    RoutePage(RoutePage),
    DashboardsCard(DashboardsCard),
    DashboardsTab(DashboardsTab),
    HealthSubsystem(HealthSubsystem),
}

impl ExtensionPayload {
    pub fn kind(&self) -> ExtensionKind {
        match self {
            ExtensionPayload::ModelDefinition { .. } => ExtensionKind::ModelDefinition,
            ExtensionPayload::FeatureFlag(_) => ExtensionKind::FeatureFlagBinding,
            ExtensionPayload::NavItem(n) => match n.target {
                NavTarget::Href(_) => ExtensionKind::NavItemHref,
                NavTarget::ResourceNs(_) => ExtensionKind::NavItemResourceNs,
                NavTarget::ResourceCluster(_) => ExtensionKind::NavItemResourceCluster,
            },
            ExtensionPayload::ResourcePage(p) => match p.page {
                PageKind::List => ExtensionKind::ResourceListPage,
                PageKind::Details => ExtensionKind::ResourceDetailsPage,
            },
            ExtensionPayload::Perspective(_) => ExtensionKind::Perspective,
            ExtensionPayload::RoutePage(_) => ExtensionKind::RoutePage,
            ExtensionPayload::DashboardsCard(_) => ExtensionKind::DashboardsCard,
            ExtensionPayload::DashboardsTab(_) => ExtensionKind::DashboardsTab,
            ExtensionPayload::HealthSubsystem(HealthSubsystem::Url(_)) => ExtensionKind::HealthUrlSubsystem,
            ExtensionPayload::HealthSubsystem(HealthSubsystem::Metric(_)) => ExtensionKind::HealthMetricSubsystem,
        }
    }

    /// Flag that must resolve to true before the extension becomes visible.
    pub fn required(&self) -> Option<&str> {
        match self {
            ExtensionPayload::ModelDefinition { .. }
            | ExtensionPayload::FeatureFlag(_)
            | ExtensionPayload::Perspective(_) => None,
            ExtensionPayload::NavItem(n) => n.required.as_deref(),
            ExtensionPayload::ResourcePage(p) => p.required.as_deref(),
            ExtensionPayload::RoutePage(r) => r.required.as_deref(),
            ExtensionPayload::DashboardsCard(c) => c.required.as_deref(),
            ExtensionPayload::DashboardsTab(t) => t.required.as_deref(),
            ExtensionPayload::HealthSubsystem(s) => s.required(),
        }
    }

    pub fn perspective(&self) -> Option<&str> {
        match self {
            ExtensionPayload::NavItem(n) => n.perspective.as_deref(),
            ExtensionPayload::RoutePage(r) => r.perspective.as_deref(),
            ExtensionPayload::Perspective(p) => Some(p.id.as_str()),
            _ => None,
        }
    }
}

/// Ordered contribution list exported by one plugin module.
#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: String,
    pub extensions: Vec<ExtensionPayload>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), extensions: Vec::new() } }

    pub fn with(mut self, payload: impl Into<ExtensionPayload>) -> Self {
        self.extensions.push(payload.into());
        self
    }
}

// ---- payloads ----

/// A Kubernetes model (kind) known to the console.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct K8sModel {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub label: String,
    pub namespaced: bool,
    pub crd: bool,
}

impl K8sModel {
    pub fn gvk_key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.kind)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.kind)
        }
    }

    pub fn model_ref(&self) -> ModelRef {
        ModelRef { group: self.group.clone(), version: self.version.clone(), kind: self.kind.clone() }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub group: String,
    pub version: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureFlagBinding {
    pub model: K8sModel,
    pub flag: FlagName,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum NavTarget {
    Href(String),
    /// Namespaced resource plural, e.g. `buildconfigs`.
    ResourceNs(String),
    /// Cluster-scoped resource plural, e.g. `projects`.
    ResourceCluster(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct NavItem {
    pub perspective: Option<String>,
    pub section: Option<String>,
    pub name: String,
    pub target: NavTarget,
    pub required: Option<FlagName>,
    pub test_id: Option<String>,
}

impl NavItem {
    fn with_target(name: &str, target: NavTarget) -> Self {
        Self { perspective: None, section: None, name: name.to_string(), target, required: None, test_id: None }
    }

    pub fn href(name: &str, href: &str) -> Self { Self::with_target(name, NavTarget::Href(href.to_string())) }
    pub fn resource_ns(name: &str, plural: &str) -> Self { Self::with_target(name, NavTarget::ResourceNs(plural.to_string())) }
    pub fn resource_cluster(name: &str, plural: &str) -> Self {
        Self::with_target(name, NavTarget::ResourceCluster(plural.to_string()))
    }

    pub fn perspective(mut self, id: &str) -> Self { self.perspective = Some(id.to_string()); self }
    pub fn section(mut self, section: &str) -> Self { self.section = Some(section.to_string()); self }
    pub fn required(mut self, flag: &str) -> Self { self.required = Some(flag.to_string()); self }
    pub fn test_id(mut self, id: &str) -> Self { self.test_id = Some(id.to_string()); self }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum PageKind {
    List,
    Details,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourcePage {
    pub page: PageKind,
    pub model: ModelRef,
    /// Identifier of the component the presentation layer loads for this page.
    pub component: String,
    pub required: Option<FlagName>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Perspective {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub landing_url: String,
    /// Landing page used when the platform is plain Kubernetes.
    pub k8s_landing_url: String,
    /// Template with a `{project}` placeholder.
    pub import_redirect_url: String,
    pub default: bool,
}

impl Perspective {
    pub fn import_redirect(&self, project: &str) -> String {
        self.import_redirect_url.replace("{project}", project)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutePage {
    pub perspective: Option<String>,
    pub exact: bool,
    pub paths: SmallVec<[String; 4]>,
    pub component: String,
    pub required: Option<FlagName>,
}

impl RoutePage {
    pub fn new(paths: &[&str], component: &str) -> Self {
        Self {
            perspective: None,
            exact: true,
            paths: paths.iter().map(|p| p.to_string()).collect(),
            component: component.to_string(),
            required: None,
        }
    }

    pub fn perspective(mut self, id: &str) -> Self { self.perspective = Some(id.to_string()); self }
    pub fn required(mut self, flag: &str) -> Self { self.required = Some(flag.to_string()); self }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum GridPosition {
    Main,
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardsCard {
    pub tab: String,
    pub position: GridPosition,
    pub span: Option<u8>,
    pub component: String,
    pub required: Option<FlagName>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardsTab {
    pub id: String,
    pub title: String,
    pub required: Option<FlagName>,
}

/// Maps the raw text of a URL probe (`None` until the first response) to health.
pub type UrlHealthHandler = Arc<dyn Fn(Option<&str>) -> SubsystemHealth + Send + Sync>;

/// Maps a metric result and the latest watched resource list to health.
pub type MetricHealthHandler =
    Arc<dyn Fn(Option<&MetricResult>, Option<&[serde_json::Value]>) -> SubsystemHealth + Send + Sync>;

#[derive(Clone, Serialize)]
pub struct UrlSubsystem {
    pub title: String,
    pub url: String,
    pub required: Option<FlagName>,
    #[serde(skip)]
    pub handler: UrlHealthHandler,
}

impl std::fmt::Debug for UrlSubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSubsystem")
            .field("title", &self.title)
            .field("url", &self.url)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize)]
pub struct MetricSubsystem {
    pub title: String,
    pub query: String,
    pub resource: Option<ResourceSelector>,
    pub required: Option<FlagName>,
    #[serde(skip)]
    pub handler: MetricHealthHandler,
}

impl std::fmt::Debug for MetricSubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSubsystem")
            .field("title", &self.title)
            .field("query", &self.query)
            .field("resource", &self.resource)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "variant", rename_all = "lowercase")]
pub enum HealthSubsystem {
    Url(UrlSubsystem),
    Metric(MetricSubsystem),
}

impl HealthSubsystem {
    pub fn title(&self) -> &str {
        match self {
            HealthSubsystem::Url(s) => &s.title,
            HealthSubsystem::Metric(s) => &s.title,
        }
    }

    pub fn required(&self) -> Option<&str> {
        match self {
            HealthSubsystem::Url(s) => s.required.as_deref(),
            HealthSubsystem::Metric(s) => s.required.as_deref(),
        }
    }
}

macro_rules! payload_from {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ExtensionPayload {
            fn from(v: $ty) -> Self { ExtensionPayload::$variant(v) }
        })*
    };
}

payload_from! {
    FeatureFlagBinding => FeatureFlag,
    NavItem => NavItem,
    ResourcePage => ResourcePage,
    Perspective => Perspective,
    RoutePage => RoutePage,
    DashboardsCard => DashboardsCard,
    DashboardsTab => DashboardsTab,
    HealthSubsystem => HealthSubsystem,
}

impl From<UrlSubsystem> for ExtensionPayload {
    fn from(v: UrlSubsystem) -> Self { ExtensionPayload::HealthSubsystem(HealthSubsystem::Url(v)) }
}

impl From<MetricSubsystem> for ExtensionPayload {
    fn from(v: MetricSubsystem) -> Self { ExtensionPayload::HealthSubsystem(HealthSubsystem::Metric(v)) }
}

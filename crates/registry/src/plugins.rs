//! Built-in plugin modules.
//!
//! Each function returns the ordered contribution list of one module; the
//! order is the nav display order and the health list order.

use std::sync::Arc;

use lookout_core::{
    ConsoleConfig, DashboardsCard, DashboardsTab, ExtensionPayload, FeatureFlagBinding, GridPosition, K8sModel,
    MetricResult, MetricSubsystem, NavItem, PageKind, Perspective, Plugin, ResourcePage, ResourceSelector,
    RoutePage, SubsystemHealth, UrlSubsystem, FLAG_OPENSHIFT,
};

use crate::OVERVIEW_TAB;

pub const ADMIN_PERSPECTIVE: &str = "admin";
pub const DEV_PERSPECTIVE: &str = "dev";

pub const FLAG_SHOW_PIPELINE: &str = "SHOW_PIPELINE";
pub const FLAG_PROMETHEUS: &str = "PROMETHEUS";
pub const FLAG_CEPH: &str = "CEPH";

/// All built-in modules, in registration order.
pub fn builtin(config: &ConsoleConfig) -> Vec<Plugin> {
    vec![console(), dev_console(), monitoring(config), storage()]
}

fn model(group: &str, version: &str, kind: &str, plural: &str, label: &str, namespaced: bool, crd: bool) -> K8sModel {
    K8sModel {
        group: group.into(),
        version: version.into(),
        kind: kind.into(),
        plural: plural.into(),
        label: label.into(),
        namespaced,
        crd,
    }
}

fn card(tab: &str, position: GridPosition, component: &str) -> DashboardsCard {
    DashboardsCard { tab: tab.into(), position, span: None, component: component.into(), required: None }
}

/// Administrator perspective and the core navigation.
pub fn console() -> Plugin {
    let core_models = vec![
        model("", "v1", "Namespace", "namespaces", "Namespace", false, false),
        model("", "v1", "Pod", "pods", "Pod", true, false),
        model("", "v1", "Event", "events", "Event", true, false),
        model("", "v1", "Node", "nodes", "Node", false, false),
        model("apps", "v1", "Deployment", "deployments", "Deployment", true, false),
        model("apps", "v1", "StatefulSet", "statefulsets", "Stateful Set", true, false),
        model("batch", "v1", "Job", "jobs", "Job", true, false),
        model("project.openshift.io", "v1", "Project", "projects", "Project", false, false),
        model("build.openshift.io", "v1", "BuildConfig", "buildconfigs", "Build Config", true, false),
        model(
            "apiextensions.k8s.io",
            "v1",
            "CustomResourceDefinition",
            "customresourcedefinitions",
            "Custom Resource Definition",
            false,
            false,
        ),
    ];
    let a = ADMIN_PERSPECTIVE;
    Plugin::new("console")
        .with(ExtensionPayload::ModelDefinition { models: core_models })
        .with(Perspective {
            id: a.into(),
            name: "Administrator".into(),
            icon: Some("cogs".into()),
            landing_url: "/dashboards".into(),
            k8s_landing_url: "/search".into(),
            import_redirect_url: "/k8s/cluster/projects/{project}/workloads".into(),
            default: true,
        })
        .with(NavItem::href("Dashboards", "/dashboards").perspective(a).section("Home"))
        .with(NavItem::resource_cluster("Projects", "projects").perspective(a).section("Home").required(FLAG_OPENSHIFT))
        .with(NavItem::href("Search", "/search").perspective(a).section("Home"))
        .with(NavItem::resource_ns("Events", "events").perspective(a).section("Home"))
        .with(NavItem::resource_ns("Pods", "pods").perspective(a).section("Workloads"))
        .with(NavItem::resource_ns("Deployments", "deployments").perspective(a).section("Workloads"))
        .with(NavItem::resource_ns("Stateful Sets", "statefulsets").perspective(a).section("Workloads"))
        .with(NavItem::resource_ns("Jobs", "jobs").perspective(a).section("Workloads"))
        .with(NavItem::resource_ns("Build Configs", "buildconfigs").perspective(a).section("Builds").required(FLAG_OPENSHIFT))
        .with(NavItem::href("Cluster Settings", "/settings/cluster").perspective(a).section("Administration").required(FLAG_OPENSHIFT))
        .with(NavItem::resource_cluster("Namespaces", "namespaces").perspective(a).section("Administration"))
        .with(
            NavItem::resource_cluster("Custom Resource Definitions", "customresourcedefinitions")
                .perspective(a)
                .section("Administration"),
        )
        .with(RoutePage::new(&["/dashboards"], "DashboardsPage").perspective(a))
        .with(RoutePage::new(&["/search"], "SearchPage"))
        .with(card(OVERVIEW_TAB, GridPosition::Left, "DetailsCard"))
        .with(card(OVERVIEW_TAB, GridPosition::Left, "InventoryCard"))
        .with(DashboardsCard { span: Some(12), ..card(OVERVIEW_TAB, GridPosition::Main, "HealthCard") })
        .with(card(OVERVIEW_TAB, GridPosition::Main, "CapacityCard"))
        .with(card(OVERVIEW_TAB, GridPosition::Main, "UtilizationCard"))
        .with(card(OVERVIEW_TAB, GridPosition::Right, "ActivityCard"))
}

/// Developer perspective contributions.
pub fn dev_console() -> Plugin {
    let pipeline = model("tekton.dev", "v1alpha1", "Pipeline", "pipelines", "Pipeline", true, true);
    let pipeline_run = model("tekton.dev", "v1alpha1", "PipelineRun", "pipelineruns", "Pipeline Run", true, true);
    let task = model("tekton.dev", "v1alpha1", "Task", "tasks", "Task", true, true);
    let task_run = model("tekton.dev", "v1alpha1", "TaskRun", "taskruns", "Task Run", true, true);
    let d = DEV_PERSPECTIVE;
    Plugin::new("dev-console")
        .with(ExtensionPayload::ModelDefinition {
            models: vec![pipeline.clone(), pipeline_run.clone(), task, task_run],
        })
        .with(FeatureFlagBinding { model: pipeline.clone(), flag: FLAG_SHOW_PIPELINE.into() })
        .with(NavItem::href("+Add", "/add").perspective(d).test_id("+Add-header"))
        .with(NavItem::href("Topology", "/topology").perspective(d).required(FLAG_OPENSHIFT).test_id("topology-header"))
        .with(NavItem::resource_ns("Builds", "buildconfigs").perspective(d).required(FLAG_OPENSHIFT).test_id("build-header"))
        .with(NavItem::resource_ns("Pipelines", "pipelines").perspective(d).required(FLAG_SHOW_PIPELINE).test_id("pipeline-header"))
        .with(
            NavItem::resource_cluster("Projects", "projects")
                .perspective(d)
                .section("Advanced")
                .required(FLAG_OPENSHIFT)
                .test_id("advanced-project-header"),
        )
        .with(NavItem::resource_ns("Events", "events").perspective(d).section("Advanced").test_id("advanced-events-header"))
        .with(NavItem::href("Search", "/search").perspective(d).section("Advanced").test_id("advanced-search-header"))
        .with(ResourcePage { page: PageKind::List, model: pipeline.model_ref(), component: "PipelinesPage".into(), required: None })
        .with(ResourcePage {
            page: PageKind::Details,
            model: pipeline.model_ref(),
            component: "PipelineDetailsPage".into(),
            required: None,
        })
        .with(ResourcePage {
            page: PageKind::Details,
            model: pipeline_run.model_ref(),
            component: "PipelineRunDetailsPage".into(),
            required: None,
        })
        .with(Perspective {
            id: d.into(),
            name: "Developer".into(),
            icon: Some("code".into()),
            landing_url: "/topology".into(),
            k8s_landing_url: "/add".into(),
            import_redirect_url: "/topology/ns/{project}".into(),
            default: false,
        })
        .with(RoutePage::new(&["/add", "/import", "/topology", "/deploy-image"], "NamespaceRedirect"))
        .with(RoutePage::new(&["/add/all-namespaces", "/add/ns/:ns"], "AddPage"))
        .with(RoutePage::new(&["/topology/all-namespaces", "/topology/ns/:ns"], "TopologyPage"))
        .with(RoutePage::new(&["/import/all-namespaces", "/import/ns/:ns"], "ImportPage"))
        .with(RoutePage::new(&["/catalog/source-to-image"], "ImportPage"))
        .with(
            RoutePage::new(&["/k8s/all-namespaces/buildconfigs", "/k8s/ns/:ns/buildconfigs"], "BuildConfigPage")
                .perspective(d),
        )
        .with(RoutePage::new(&["/deploy-image/all-namespaces", "/deploy-image/ns/:ns"], "DeployImagePage"))
}

fn monitoring_health(raw: Option<&str>) -> SubsystemHealth {
    match raw {
        None => SubsystemHealth::loading(),
        Some(body) if body.to_ascii_lowercase().contains("ready") => SubsystemHealth::ok("Monitoring is ready"),
        Some(body) => SubsystemHealth::error("Monitoring is not ready").with_details(body.trim().to_string()),
    }
}

/// Health of the metrics stack, probed through its readiness endpoint.
pub fn monitoring(config: &ConsoleConfig) -> Plugin {
    let base = config.prometheus_url.trim_end_matches('/');
    Plugin::new("monitoring")
        .with(ExtensionPayload::ModelDefinition {
            models: vec![model("monitoring.coreos.com", "v1", "Prometheus", "prometheuses", "Prometheus", true, true)],
        })
        .with(FeatureFlagBinding {
            model: model("monitoring.coreos.com", "v1", "Prometheus", "prometheuses", "Prometheus", true, true),
            flag: FLAG_PROMETHEUS.into(),
        })
        .with(UrlSubsystem {
            title: "Monitoring".into(),
            url: format!("{}/-/ready", base),
            required: Some(FLAG_PROMETHEUS.into()),
            handler: Arc::new(monitoring_health),
        })
}

/// Maps `ceph_health_status` (0 ok, 1 warning, 2 error) plus the watched
/// cluster resources to storage health.
pub fn storage_health(result: Option<&MetricResult>, clusters: Option<&[serde_json::Value]>) -> SubsystemHealth {
    if let Some(list) = clusters {
        if list.is_empty() {
            return SubsystemHealth::not_available().with_message("Storage cluster not found");
        }
    }
    let Some(result) = result else { return SubsystemHealth::loading(); };
    // Only the exact status levels count; NaN and fractional values are unknown.
    match result.first_value() {
        Some(v) if v == 0.0 => SubsystemHealth::ok("Storage is healthy"),
        Some(v) if v == 1.0 => SubsystemHealth::warning("Storage is degraded"),
        Some(v) if v == 2.0 => SubsystemHealth::error("Storage is in an error state"),
        _ => SubsystemHealth::not_available().with_message("Storage health is unknown"),
    }
}

/// Storage cluster health and its dashboard tab.
pub fn storage() -> Plugin {
    let ceph = model("ceph.rook.io", "v1", "CephCluster", "cephclusters", "Ceph Cluster", true, true);
    let tab = "persistent-storage";
    Plugin::new("storage")
        .with(ExtensionPayload::ModelDefinition { models: vec![ceph.clone()] })
        .with(FeatureFlagBinding { model: ceph.clone(), flag: FLAG_CEPH.into() })
        .with(MetricSubsystem {
            title: "Storage".into(),
            query: "ceph_health_status".into(),
            resource: Some(ResourceSelector::new(ceph.gvk_key(), Some("openshift-storage"))),
            required: Some(FLAG_CEPH.into()),
            handler: Arc::new(storage_health),
        })
        .with(DashboardsTab { id: tab.into(), title: "Persistent Storage".into(), required: Some(FLAG_CEPH.into()) })
        .with(DashboardsCard { required: Some(FLAG_CEPH.into()), ..card(tab, GridPosition::Left, "StorageDetailsCard") })
        .with(DashboardsCard { required: Some(FLAG_CEPH.into()), ..card(tab, GridPosition::Main, "StorageHealthCard") })
        .with(DashboardsCard { required: Some(FLAG_CEPH.into()), ..card(tab, GridPosition::Main, "StorageCapacityCard") })
        .with(DashboardsCard { required: Some(FLAG_CEPH.into()), ..card(tab, GridPosition::Right, "StorageEventsCard") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::HealthState;
    use lookout_core::MetricSample;

    fn value(v: f64) -> MetricResult {
        MetricResult { samples: vec![MetricSample { labels: Default::default(), timestamp: 0.0, value: v }] }
    }

    #[test]
    fn storage_health_maps_ceph_status() {
        assert_eq!(storage_health(None, None).state, HealthState::Loading);
        assert_eq!(storage_health(Some(&value(0.0)), None).state, HealthState::Ok);
        assert_eq!(storage_health(Some(&value(1.0)), None).state, HealthState::Warning);
        assert_eq!(storage_health(Some(&value(2.0)), None).state, HealthState::Error);
        assert_eq!(storage_health(Some(&MetricResult::default()), None).state, HealthState::NotAvailable);
        assert_eq!(storage_health(Some(&value(0.0)), Some(&[][..])).state, HealthState::NotAvailable);
    }

    #[test]
    fn storage_health_rejects_non_level_values() {
        for v in [f64::NAN, 0.7, 1.9, -0.5, 3.0, f64::INFINITY] {
            let h = storage_health(Some(&value(v)), None);
            assert_eq!(h.state, HealthState::NotAvailable, "value {}", v);
            assert_eq!(h.message.as_deref(), Some("Storage health is unknown"));
        }
    }

    #[test]
    fn monitoring_health_reads_readiness_text() {
        assert_eq!(monitoring_health(None).state, HealthState::Loading);
        assert_eq!(monitoring_health(Some("Prometheus is Ready.")).state, HealthState::Ok);
        let h = monitoring_health(Some("Service Unavailable\n"));
        assert_eq!(h.state, HealthState::Error);
        assert_eq!(h.details.as_deref(), Some("Service Unavailable"));
    }

    #[test]
    fn dev_console_keeps_nav_order() {
        let names: Vec<String> = dev_console()
            .extensions
            .iter()
            .filter_map(|p| match p {
                ExtensionPayload::NavItem(n) => Some(n.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["+Add", "Topology", "Builds", "Pipelines", "Projects", "Events", "Search"]);
    }
}

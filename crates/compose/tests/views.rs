use lookout_compose::{
    dashboard_tabs, default_perspective, find_perspective, landing_url, match_route, nav_tree, resource_page, routes,
    NavEntry,
};
use lookout_core::{ConsoleConfig, FlagState, GridPosition, ModelRef, PageKind};
use lookout_flags::FlagGate;
use lookout_registry::plugins::{ADMIN_PERSPECTIVE, DEV_PERSPECTIVE, FLAG_CEPH};
use lookout_registry::ExtensionRegistry;

fn registry() -> ExtensionRegistry { ExtensionRegistry::with_builtin_plugins(&ConsoleConfig::default()).unwrap() }

fn names(cards: &[lookout_compose::PlacedCard]) -> Vec<&str> { cards.iter().map(|c| c.component.as_str()).collect() }

#[test]
fn overview_tab_comes_first_with_slots_in_order() {
    let reg = registry();
    let gate = FlagGate::new();
    let tabs = dashboard_tabs(&reg, &gate.snapshot());
    assert_eq!(tabs.len(), 1);
    let overview = &tabs[0];
    assert_eq!(overview.id, "overview");
    assert_eq!(names(overview.slot(GridPosition::Left)), vec!["DetailsCard", "InventoryCard"]);
    assert_eq!(names(&overview.main), vec!["HealthCard", "CapacityCard", "UtilizationCard"]);
    assert_eq!(overview.main[0].span, Some(12));
    assert_eq!(names(&overview.right), vec!["ActivityCard"]);

    gate.set(FLAG_CEPH, FlagState::True);
    let tabs = dashboard_tabs(&reg, &gate.snapshot());
    assert_eq!(tabs.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["overview", "persistent-storage"]);
    assert_eq!(tabs[1].card_count(), 4);
    assert_eq!(names(&tabs[1].main), vec!["StorageHealthCard", "StorageCapacityCard"]);
}

#[test]
fn dev_nav_resolves_resource_links_and_sections() {
    let reg = registry();
    let gate = FlagGate::new();
    gate.set("OPENSHIFT", FlagState::True);
    gate.set("SHOW_PIPELINE", FlagState::False);

    let tree = nav_tree(&reg, &gate.snapshot(), DEV_PERSPECTIVE, Some("demo"));
    let hrefs: Vec<(&str, &str)> = tree.links().iter().map(|l| (l.name.as_str(), l.href.as_str())).collect();
    assert_eq!(
        hrefs,
        vec![
            ("+Add", "/add"),
            ("Topology", "/topology"),
            ("Builds", "/k8s/ns/demo/buildconfigs"),
            ("Projects", "/k8s/cluster/projects"),
            ("Events", "/k8s/ns/demo/events"),
            ("Search", "/search"),
        ]
    );
    match tree.entries.last().unwrap() {
        NavEntry::Section { name, items } => {
            assert_eq!(name, "Advanced");
            assert_eq!(items.len(), 3);
        }
        other => panic!("expected section, got {:?}", other),
    }
    assert_eq!(tree.links()[1].test_id.as_deref(), Some("topology-header"));

    let all_ns = nav_tree(&reg, &gate.snapshot(), DEV_PERSPECTIVE, None);
    assert_eq!(all_ns.links()[2].href, "/k8s/all-namespaces/buildconfigs");

    gate.set("SHOW_PIPELINE", FlagState::True);
    let tree = nav_tree(&reg, &gate.snapshot(), DEV_PERSPECTIVE, Some("demo"));
    assert_eq!(tree.links()[3].href, "/k8s/ns/demo/pipelines");
}

#[test]
fn admin_sections_keep_first_appearance_order() {
    let reg = registry();
    let gate = FlagGate::new();
    let tree = nav_tree(&reg, &gate.snapshot(), ADMIN_PERSPECTIVE, None);
    let sections: Vec<&str> = tree
        .entries
        .iter()
        .filter_map(|e| match e {
            NavEntry::Section { name, .. } => Some(name.as_str()),
            NavEntry::Link(_) => None,
        })
        .collect();
    assert_eq!(sections, vec!["Home", "Workloads", "Administration"]);
    assert!(tree.links().iter().all(|l| l.name != "Projects"));

    gate.set("OPENSHIFT", FlagState::True);
    let tree = nav_tree(&reg, &gate.snapshot(), ADMIN_PERSPECTIVE, None);
    assert_eq!(tree.entries.len(), 4);
}

#[test]
fn perspectives_landing_and_routes() {
    let reg = registry();
    let gate = FlagGate::new();
    let snap = gate.snapshot();
    assert_eq!(default_perspective(&reg, &snap).unwrap().id, ADMIN_PERSPECTIVE);
    let dev = find_perspective(&reg, &snap, DEV_PERSPECTIVE).unwrap();
    assert_eq!(landing_url(dev, &snap), "/add");
    assert_eq!(dev.import_redirect("demo"), "/topology/ns/demo");

    gate.set("OPENSHIFT", FlagState::True);
    let snap = gate.snapshot();
    assert_eq!(landing_url(dev, &snap), "/topology");

    let dev_routes = routes(&reg, &snap, DEV_PERSPECTIVE);
    assert_eq!(match_route(&dev_routes, "/topology/ns/demo").unwrap().component, "TopologyPage");
    assert_eq!(match_route(&dev_routes, "/k8s/ns/demo/buildconfigs").unwrap().component, "BuildConfigPage");
    assert!(match_route(&dev_routes, "/topology/ns/demo/extra").is_none());
    assert!(match_route(&dev_routes, "/dashboards").is_none());

    let admin_routes = routes(&reg, &snap, ADMIN_PERSPECTIVE);
    assert_eq!(match_route(&admin_routes, "/dashboards").unwrap().component, "DashboardsPage");
    assert!(match_route(&admin_routes, "/k8s/ns/demo/buildconfigs").is_none());
}

#[test]
fn resource_pages_by_model_and_kind() {
    let reg = registry();
    let snap = FlagGate::new().snapshot();
    let pipeline = ModelRef { group: "tekton.dev".into(), version: "v1alpha1".into(), kind: "Pipeline".into() };
    assert_eq!(resource_page(&reg, &snap, &pipeline, PageKind::List).unwrap().component, "PipelinesPage");
    assert_eq!(resource_page(&reg, &snap, &pipeline, PageKind::Details).unwrap().component, "PipelineDetailsPage");
    let task = ModelRef { kind: "Task".into(), ..pipeline };
    assert!(resource_page(&reg, &snap, &task, PageKind::List).is_none());
}

use lookout_core::{
    ConsoleConfig, DashboardsCard, DashboardsTab, ExtensionKind, FlagState, GridPosition, NavItem, Perspective, Plugin,
    ValidationError,
};
use lookout_flags::FlagGate;
use lookout_registry::plugins::{self, DEV_PERSPECTIVE, FLAG_SHOW_PIPELINE};
use lookout_registry::{ExtensionRegistry, RegistryBuilder, OVERVIEW_TAB};

fn perspective(id: &str) -> Perspective {
    Perspective {
        id: id.into(),
        name: id.to_uppercase(),
        icon: None,
        landing_url: "/".into(),
        k8s_landing_url: "/".into(),
        import_redirect_url: "/ns/{project}".into(),
        default: false,
    }
}

fn gated_registry() -> ExtensionRegistry {
    let mut b = RegistryBuilder::new();
    b.register(
        Plugin::new("p")
            .with(perspective("dev"))
            .with(NavItem::href("Always", "/always").perspective("dev"))
            .with(NavItem::href("Gated", "/gated").perspective("dev").required("F"))
            .with(NavItem::href("Last", "/last").perspective("dev")),
    )
    .unwrap();
    b.build().unwrap()
}

fn names(reg: &ExtensionRegistry, gate: &FlagGate) -> Vec<String> {
    let snap = gate.snapshot();
    reg.visible(&snap).nav_items().iter().map(|n| n.name.clone()).collect()
}

#[test]
fn gated_extension_follows_flag_state() {
    let reg = gated_registry();
    let gate = FlagGate::new();
    assert_eq!(names(&reg, &gate), vec!["Always", "Last"]);

    gate.set("F", FlagState::True);
    assert_eq!(names(&reg, &gate), vec!["Always", "Gated", "Last"]);
    let snap = gate.snapshot();
    assert_eq!(reg.visible(&snap).query_by_kind(ExtensionKind::NavItemHref).len(), 3);

    gate.set("F", FlagState::False);
    assert_eq!(names(&reg, &gate), vec!["Always", "Last"]);

    gate.set("F", FlagState::Pending);
    let snap = gate.snapshot();
    assert!(reg
        .visible(&snap)
        .query_by_kind_with(ExtensionKind::NavItemHref, |e| e.required() == Some("F"))
        .is_empty());
}

#[test]
fn typed_queries_narrow_health_variants() {
    let reg = ExtensionRegistry::with_builtin_plugins(&ConsoleConfig::default()).unwrap();
    let gate = FlagGate::new();
    let snap = gate.snapshot();
    assert!(reg.visible(&snap).health_subsystems().is_empty());

    gate.set(plugins::FLAG_CEPH, FlagState::True);
    gate.set(plugins::FLAG_PROMETHEUS, FlagState::True);
    let snap = gate.snapshot();
    let view = reg.visible(&snap);
    assert_eq!(view.url_health_subsystems().len(), 1);
    assert_eq!(view.metric_health_subsystems().len(), 1);
    assert_eq!(view.health_subsystems()[0].title(), "Monitoring");
    assert_eq!(view.query_by_kind(ExtensionKind::HealthMetricSubsystem).len(), 1);
}

#[test]
fn required_flags_lists_dependencies_of_kinds() {
    let reg = ExtensionRegistry::with_builtin_plugins(&ConsoleConfig::default()).unwrap();
    let flags = reg.required_flags(&[ExtensionKind::NavItemResourceNs]);
    assert!(flags.contains(FLAG_SHOW_PIPELINE));
    assert!(flags.contains("OPENSHIFT"));
    assert!(!flags.contains(plugins::FLAG_CEPH));
    let snap = FlagGate::new().snapshot();
    assert!(reg
        .visible(&snap)
        .all()
        .into_iter()
        .any(|e| e.perspective() == Some(DEV_PERSPECTIVE) && e.kind == ExtensionKind::Perspective));
}

#[test]
fn duplicate_plugin_and_perspective_are_rejected() {
    let mut b = RegistryBuilder::new();
    b.register(Plugin::new("a").with(perspective("dev"))).unwrap();
    assert_eq!(
        b.register(Plugin::new("a")).unwrap_err(),
        ValidationError::DuplicatePlugin("a".into())
    );
    b.register(Plugin::new("b").with(perspective("dev"))).unwrap();
    let err = b.build().unwrap_err();
    assert!(matches!(err, ValidationError::Duplicate { what: "perspective", .. }), "{err}");
    assert!(err.to_string().contains("already registered by plugin a"));
}

#[test]
fn dangling_references_fail_build() {
    let mut b = RegistryBuilder::new();
    b.register(Plugin::new("nav").with(NavItem::href("Orphan", "/orphan").perspective("ghost"))).unwrap();
    let err = b.build().unwrap_err();
    assert_eq!(
        err.to_string(),
        "plugin nav: extension #0 (NavItem/Href) references unknown perspective `ghost`"
    );

    let mut b = RegistryBuilder::new();
    let card = |tab: &str| DashboardsCard {
        tab: tab.into(),
        position: GridPosition::Main,
        span: None,
        component: "C".into(),
        required: None,
    };
    b.register(
        Plugin::new("dash")
            .with(DashboardsTab { id: "storage".into(), title: "Storage".into(), required: None })
            .with(card("storage"))
            .with(card(OVERVIEW_TAB))
            .with(card("missing")),
    )
    .unwrap();
    let err = b.build().unwrap_err();
    assert!(matches!(err, ValidationError::UnknownReference { index: 3, what: "dashboards tab", .. }));
}

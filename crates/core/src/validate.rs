//! Load-time schema checks for extension payloads.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extension::{ExtensionPayload, HealthSubsystem, K8sModel, NavTarget};

static FLAG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("static regex"));
static ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("static regex"));

/// Errors raised while registering plugins. All of them abort startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("plugin name must not be empty")]
    EmptyPluginName,
    #[error("plugin {0} registered more than once")]
    DuplicatePlugin(String),
    #[error("plugin {plugin}: extension #{index} ({kind}): field `{field}` {reason}")]
    InvalidExtension {
        plugin: String,
        index: usize,
        kind: &'static str,
        field: &'static str,
        reason: String,
    },
    #[error("plugin {plugin}: {what} `{id}` already registered by plugin {first}")]
    Duplicate { plugin: String, what: &'static str, id: String, first: String },
    #[error("plugin {plugin}: extension #{index} ({kind}) references unknown {what} `{id}`")]
    UnknownReference { plugin: String, index: usize, kind: &'static str, what: &'static str, id: String },
}

/// Field-level failure, lifted into [`ValidationError::InvalidExtension`] by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self { Self { field, reason: reason.into() } }
}

type FieldResult = Result<(), FieldError>;

fn non_empty(field: &'static str, v: &str) -> FieldResult {
    if v.trim().is_empty() { Err(FieldError::new(field, "must not be empty")) } else { Ok(()) }
}

fn path_like(field: &'static str, v: &str) -> FieldResult {
    non_empty(field, v)?;
    if !v.starts_with('/') {
        return Err(FieldError::new(field, format!("must start with '/', got {:?}", v)));
    }
    Ok(())
}

fn identifier(field: &'static str, v: &str) -> FieldResult {
    if ID.is_match(v) { Ok(()) } else { Err(FieldError::new(field, format!("must be a lowercase identifier, got {:?}", v))) }
}

pub fn is_valid_flag_name(name: &str) -> bool { FLAG_NAME.is_match(name) }

fn flag(field: &'static str, v: Option<&str>) -> FieldResult {
    match v {
        Some(name) if !is_valid_flag_name(name) => {
            Err(FieldError::new(field, format!("must match {}, got {:?}", FLAG_NAME.as_str(), name)))
        }
        _ => Ok(()),
    }
}

fn model(m: &K8sModel) -> FieldResult {
    non_empty("model.version", &m.version)?;
    non_empty("model.kind", &m.kind)?;
    non_empty("model.plural", &m.plural)?;
    non_empty("model.label", &m.label)?;
    if m.crd && m.group.is_empty() {
        return Err(FieldError::new("model.group", "custom resources must declare an API group"));
    }
    Ok(())
}

/// Check one payload against its kind's schema.
pub fn validate_payload(payload: &ExtensionPayload) -> FieldResult {
    match payload {
        ExtensionPayload::ModelDefinition { models } => {
            if models.is_empty() {
                return Err(FieldError::new("models", "must list at least one model"));
            }
            models.iter().try_for_each(model)
        }
        ExtensionPayload::FeatureFlag(b) => {
            model(&b.model)?;
            non_empty("flag", &b.flag)?;
            flag("flag", Some(&b.flag))
        }
        ExtensionPayload::NavItem(n) => {
            non_empty("name", &n.name)?;
            match &n.target {
                NavTarget::Href(h) => path_like("href", h)?,
                NavTarget::ResourceNs(r) | NavTarget::ResourceCluster(r) => identifier("resource", r)?,
            }
            if let Some(p) = &n.perspective { identifier("perspective", p)?; }
            if let Some(s) = &n.section { non_empty("section", s)?; }
            flag("required", n.required.as_deref())
        }
        ExtensionPayload::ResourcePage(p) => {
            non_empty("model.version", &p.model.version)?;
            non_empty("model.kind", &p.model.kind)?;
            non_empty("component", &p.component)?;
            flag("required", p.required.as_deref())
        }
        ExtensionPayload::Perspective(p) => {
            identifier("id", &p.id)?;
            non_empty("name", &p.name)?;
            path_like("landing_url", &p.landing_url)?;
            path_like("k8s_landing_url", &p.k8s_landing_url)?;
            path_like("import_redirect_url", &p.import_redirect_url)
        }
        ExtensionPayload::RoutePage(r) => {
            if r.paths.is_empty() {
                return Err(FieldError::new("paths", "must list at least one path"));
            }
            r.paths.iter().try_for_each(|p| path_like("paths", p))?;
            non_empty("component", &r.component)?;
            if let Some(p) = &r.perspective { identifier("perspective", p)?; }
            flag("required", r.required.as_deref())
        }
        ExtensionPayload::DashboardsCard(c) => {
            identifier("tab", &c.tab)?;
            non_empty("component", &c.component)?;
            if let Some(span) = c.span {
                if !(1..=12).contains(&span) {
                    return Err(FieldError::new("span", format!("must be within 1..=12, got {}", span)));
                }
            }
            flag("required", c.required.as_deref())
        }
        ExtensionPayload::DashboardsTab(t) => {
            identifier("id", &t.id)?;
            non_empty("title", &t.title)?;
            flag("required", t.required.as_deref())
        }
        ExtensionPayload::HealthSubsystem(HealthSubsystem::Url(s)) => {
            non_empty("title", &s.title)?;
            non_empty("url", &s.url)?;
            flag("required", s.required.as_deref())
        }
        ExtensionPayload::HealthSubsystem(HealthSubsystem::Metric(s)) => {
            non_empty("title", &s.title)?;
            non_empty("query", &s.query)?;
            if let Some(r) = &s.resource { non_empty("resource.gvk", &r.gvk)?; }
            flag("required", s.required.as_deref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{DashboardsCard, GridPosition, NavItem, RoutePage};

    #[test]
    fn nav_item_href_must_be_absolute() {
        let bad: ExtensionPayload = NavItem::href("Search", "search").into();
        let err = validate_payload(&bad).unwrap_err();
        assert_eq!(err.field, "href");
        let good: ExtensionPayload = NavItem::href("Search", "/search").perspective("dev").into();
        assert!(validate_payload(&good).is_ok());
    }

    #[test]
    fn flag_names_are_upper_snake() {
        assert!(is_valid_flag_name("SHOW_PIPELINE"));
        assert!(!is_valid_flag_name("showPipeline"));
        let bad: ExtensionPayload = NavItem::resource_ns("Builds", "buildconfigs").required("openshift").into();
        assert_eq!(validate_payload(&bad).unwrap_err().field, "required");
    }

    #[test]
    fn route_needs_paths_and_card_span_is_bounded() {
        let empty: ExtensionPayload = RoutePage::new(&[], "AddPage").into();
        assert_eq!(validate_payload(&empty).unwrap_err().field, "paths");
        let card: ExtensionPayload = DashboardsCard {
            tab: "storage".into(),
            position: GridPosition::Main,
            span: Some(13),
            component: "CapacityCard".into(),
            required: None,
        }
        .into();
        assert_eq!(validate_payload(&card).unwrap_err().field, "span");
    }
}

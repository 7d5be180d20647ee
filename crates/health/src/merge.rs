//! Cluster health merge and base platform health.

use lookout_core::{FlagState, HealthState, SubsystemHealth};

pub const HEALTHY: &str = "is healthy";
pub const ERROR_STATE: &str = "is in an error state";

/// Merge subsystem verdicts into one: loading beats error beats warning beats ok.
/// A single error or warning is returned verbatim; several collapse to a
/// generic message.
pub fn cluster_health(states: &[SubsystemHealth]) -> SubsystemHealth {
    let bucket = |s: HealthState| states.iter().filter(|h| h.state == s).collect::<Vec<_>>();

    if !bucket(HealthState::Loading).is_empty() {
        return SubsystemHealth::loading();
    }
    match bucket(HealthState::Error).as_slice() {
        [] => {}
        [one] => return (*one).clone(),
        _ => return SubsystemHealth::error("Multiple errors").with_details("Cluster health is degraded"),
    }
    match bucket(HealthState::Warning).as_slice() {
        [] => {}
        [one] => return (*one).clone(),
        _ => return SubsystemHealth::warning("Multiple warnings").with_details("Cluster health is degraded"),
    }
    SubsystemHealth::ok("Cluster is healthy")
}

/// Display name of the platform: the product name on the vendor distribution,
/// plain Kubernetes otherwise (including while the flag is pending).
pub fn platform_name(openshift: FlagState, product_name: &str) -> &str {
    if openshift.is_true() { product_name } else { "Kubernetes" }
}

/// Health of the API server from its `/healthz` body. `None` means no poll has completed.
pub fn platform_health(openshift: FlagState, product_name: &str, result: Option<Result<&str, &str>>) -> SubsystemHealth {
    let name = platform_name(openshift, product_name);
    match result {
        None => SubsystemHealth::loading(),
        Some(Ok(body)) if body.trim() == "ok" => SubsystemHealth::ok(format!("{} {}", name, HEALTHY)),
        Some(Ok(_)) => SubsystemHealth::error(format!("{} {}", name, ERROR_STATE)),
        Some(Err(e)) => SubsystemHealth::error(format!("{} {}", name, ERROR_STATE)).with_details(e.to_string()),
    }
}

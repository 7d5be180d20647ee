//! Lookout core types: extensions, flags, health and validation.

#![forbid(unsafe_code)]

pub mod config;
pub mod extension;
pub mod health;
pub mod metric;
pub mod validate;

pub use config::ConsoleConfig;
pub use extension::{
    DashboardsCard, DashboardsTab, Extension, ExtensionKind, ExtensionPayload, FeatureFlagBinding,
    GridPosition, HealthSubsystem, K8sModel, MetricHealthHandler, MetricSubsystem, ModelRef, NavItem,
    NavTarget, PageKind, Perspective, Plugin, ResourcePage, RoutePage, UrlHealthHandler, UrlSubsystem,
};
pub use health::{HealthState, SubsystemHealth};
pub use metric::{Alert, MetricResult, MetricSample, ResourceSelector};
pub use validate::ValidationError;

use serde::{Deserialize, Serialize};

/// Name of a feature flag, e.g. `OPENSHIFT` or `SHOW_PIPELINE`.
pub type FlagName = String;

/// Flag set once the platform is detected to be the vendor distribution.
pub const FLAG_OPENSHIFT: &str = "OPENSHIFT";

/// Three-valued resolution state of a feature flag. Unknown flags are `Pending`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FlagState {
    #[default]
    Pending,
    True,
    False,
}

impl FlagState {
    pub fn is_pending(self) -> bool { matches!(self, FlagState::Pending) }
    pub fn is_true(self) -> bool { matches!(self, FlagState::True) }
}

impl From<bool> for FlagState {
    fn from(v: bool) -> Self { if v { FlagState::True } else { FlagState::False } }
}

impl std::str::FromStr for FlagState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" => Ok(FlagState::True),
            "false" | "off" | "0" => Ok(FlagState::False),
            "pending" => Ok(FlagState::Pending),
            other => Err(format!("invalid flag state: {} (expect true|false|pending)", other)),
        }
    }
}

pub mod prelude {
    pub use super::{
        Extension, ExtensionKind, ExtensionPayload, FlagName, FlagState, HealthState, Plugin, SubsystemHealth,
        ValidationError,
    };
}

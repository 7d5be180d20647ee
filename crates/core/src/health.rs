use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Ok,
    Warning,
    Error,
    Loading,
    NotAvailable,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Ok => "OK",
            HealthState::Warning => "WARNING",
            HealthState::Error => "ERROR",
            HealthState::Loading => "LOADING",
            HealthState::NotAvailable => "NOT_AVAILABLE",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Health of one subsystem, or the merged cluster verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubsystemHealth {
    pub state: HealthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl SubsystemHealth {
    pub fn new(state: HealthState) -> Self { Self { state, message: None, details: None } }

    pub fn ok(message: impl Into<String>) -> Self { Self::new(HealthState::Ok).with_message(message) }
    pub fn warning(message: impl Into<String>) -> Self { Self::new(HealthState::Warning).with_message(message) }
    pub fn error(message: impl Into<String>) -> Self { Self::new(HealthState::Error).with_message(message) }
    pub fn loading() -> Self { Self::new(HealthState::Loading) }
    pub fn not_available() -> Self { Self::new(HealthState::NotAvailable) }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

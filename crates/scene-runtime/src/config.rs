//! Engine configuration

use serde::{Deserialize, Serialize};

use scene_core::ListenerFailurePolicy;

/// Scene engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// What to do with the remaining listeners once one panics
    pub listener_policy: ListenerFailurePolicy,
    /// Evaluate a scene against the current signal table as soon as it is
    /// registered, instead of waiting for the first relevant update
    pub evaluate_on_register: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            listener_policy: ListenerFailurePolicy::Continue,
            evaluate_on_register: false,
        }
    }
}

impl EngineConfig {
    /// Scenes pick up the existing signal table on registration
    pub fn eager() -> Self {
        EngineConfig {
            evaluate_on_register: true,
            ..Default::default()
        }
    }

    /// One panicking listener silences the rest of that transition
    pub fn strict() -> Self {
        EngineConfig {
            listener_policy: ListenerFailurePolicy::Abort,
            ..Default::default()
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Tracing subscriber configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directives, used when `RUST_LOG` is unset
    pub filter: String,
    pub format: LogFormat,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            filter: "info".to_string(),
            format: LogFormat::Compact,
            with_target: true,
        }
    }
}

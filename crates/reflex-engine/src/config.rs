//! YAML configuration for the engine
//!
//! Engine tuning plus a declarative trigger seed set. Rules carry arbitrary
//! closures, so they are seeded in code through the builder rather than
//! through config.
//!
//! ```yaml
//! history_capacity: 500
//! triggers:
//!   - id: queue_backlog
//!     kind: threshold
//!     name: "Queue backlog"
//!     condition:
//!       condition: threshold_exceeded
//!   - kind: deadline
//!     name: "Export at risk"
//!     condition:
//!       condition: deadline_within
//!       within: "00:10:00"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use reflex_automation::{Condition, Trigger};
use reflex_core::{Severity, TriggerKind, DEFAULT_NOTICE_CAPACITY};

use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Engine tuning and trigger seeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the completed-record ring
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Capacity of the notice broadcast channel
    #[serde(default = "default_notice_capacity")]
    pub notice_capacity: usize,

    /// Triggers registered when the engine is built
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_notice_capacity() -> usize {
    DEFAULT_NOTICE_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            notice_capacity: default_notice_capacity(),
            triggers: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from a YAML string
    pub fn from_yaml_str(raw: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Load a config from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }
}

/// Declarative trigger definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Unique ID (auto-generated if not provided)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The payload kind this trigger considers
    pub kind: TriggerKind,

    /// Human-readable name
    pub name: String,

    /// Matching condition
    pub condition: ConditionConfig,

    /// Whether the trigger starts enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TriggerConfig {
    /// Convert into a runtime trigger
    pub fn into_trigger(self) -> Trigger {
        let mut trigger = Trigger::new(self.kind, self.name, self.condition.into_condition());
        if let Some(id) = self.id {
            trigger = trigger.with_id(id);
        }
        if !self.enabled {
            trigger = trigger.disabled();
        }
        trigger
    }
}

/// The declarative condition variants available from config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum ConditionConfig {
    /// Threshold events whose value exceeds their configured threshold
    ThresholdExceeded,

    /// Anomaly events with a score at or above the limit
    AnomalyAbove { score: f64 },

    /// Failure events at or above a severity
    SeverityAtLeast { severity: Severity },

    /// Deadline events due within the window
    DeadlineWithin {
        #[serde(with = "duration_serde")]
        within: Duration,
    },

    /// Matches every event of the trigger's kind
    Always,
}

impl ConditionConfig {
    /// Convert into a runtime condition
    pub fn into_condition(self) -> Condition {
        match self {
            ConditionConfig::ThresholdExceeded => Condition::ThresholdExceeded,
            ConditionConfig::AnomalyAbove { score } => Condition::AnomalyAbove { score },
            ConditionConfig::SeverityAtLeast { severity } => {
                Condition::SeverityAtLeast { severity }
            }
            ConditionConfig::DeadlineWithin { within } => Condition::DeadlineWithin { within },
            ConditionConfig::Always => Condition::Always,
        }
    }
}

pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = value.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;
        serializer.serialize_str(&format!("{:02}:{:02}:{:02}", hours, mins, secs))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, String> {
        // HH:MM:SS, MM:SS, or plain seconds
        let parts: Vec<&str> = s.split(':').collect();
        match parts.len() {
            1 => {
                let secs: u64 = parts[0].parse().map_err(|_| "invalid seconds")?;
                Ok(Duration::from_secs(secs))
            }
            2 => {
                let mins: u64 = parts[0].parse().map_err(|_| "invalid minutes")?;
                let secs: u64 = parts[1].parse().map_err(|_| "invalid seconds")?;
                Ok(Duration::from_secs(mins * 60 + secs))
            }
            3 => {
                let hours: u64 = parts[0].parse().map_err(|_| "invalid hours")?;
                let mins: u64 = parts[1].parse().map_err(|_| "invalid minutes")?;
                let secs: u64 = parts[2].parse().map_err(|_| "invalid seconds")?;
                Ok(Duration::from_secs(hours * 3600 + mins * 60 + secs))
            }
            _ => Err("invalid duration format".to_string()),
        }
    }
}

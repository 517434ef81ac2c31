//! Context type for tracking event origin and causality

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Context for tracking the origin and causality of events and executions
///
/// Every event submitted to the engine carries a Context that identifies
/// which producer emitted it and allows tracing the chain of remediation
/// runs that resulted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Name of the producer subsystem that initiated this action (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Parent context ID for tracking causality chains
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a new context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            source: None,
            parent_id: None,
        }
    }

    /// Create a new context with a specific ID
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: None,
            parent_id: None,
        }
    }

    /// Create a new context attributed to a specific producer
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            source: Some(source.into()),
            parent_id: None,
        }
    }

    /// Create a child context with this context as parent
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            source: self.source.clone(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

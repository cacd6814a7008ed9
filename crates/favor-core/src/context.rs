//! Context type for tracking what caused a change

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies the poll, config flow or API request behind a state write
///
/// Child contexts keep a link to their parent so a sensor update can be
/// traced back to the poll that produced the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Short label of the originating component ("poll", "flow", "api")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Parent context ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            origin: None,
            parent_id: None,
        }
    }

    /// Create a context labelled with its origin
    pub fn with_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            ..Self::new()
        }
    }

    /// Create a child context with this context as parent
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            origin: self.origin.clone(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

//! Core types for bafavorank
//!
//! This crate provides the types shared by every other crate in the
//! workspace: EntityId, State, Event, Context and the student name directory.

mod context;
mod entity_id;
mod event;
mod state;
mod student;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use state::State;
pub use student::{StudentDirectory, StudentId};

/// Integration domain, used for config entries, storage keys and logging
pub const DOMAIN: &str = "bafavorank";

/// Entity domain of every entity this integration creates
pub const SENSOR_DOMAIN: &str = "sensor";

/// State value used before the first successful poll
pub const STATE_UNKNOWN: &str = "unknown";

/// Standard event types fired on the event bus
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Event type for a new cumulative exp value from a poll
    pub const FAVOR_EXP_UPDATED: &str = "bafavorank_exp_updated";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for FAVOR_EXP_UPDATED events
    #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct FavorExpUpdatedData {
        pub entry_id: String,
        pub student_id: StudentId,
        pub old_exp: Option<u64>,
        pub new_exp: u64,
    }

    impl EventData for FavorExpUpdatedData {
        fn event_type() -> &'static str {
            FAVOR_EXP_UPDATED
        }
    }
}

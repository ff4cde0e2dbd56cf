//! Session state
//!
//! One `Session` per conversation: its message history, what we learned
//! about the user, and the simulations shown. Owned by the caller, never global.

pub mod history;
pub mod state;

pub use history::{ConversationHistory, ConversationMessage, MessageRole};
pub use state::{SessionState, SimulationLog, SimulationRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub history: ConversationHistory,
    pub state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(session_id: Uuid) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            history: ConversationHistory::new(),
            state: SessionState::new(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

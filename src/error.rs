use thiserror::Error;

use crate::models::PollState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid poll definition: {0}")]
    Validation(String),

    #[error("poll {poll_id} cannot {action} while {from}")]
    InvalidStateTransition {
        poll_id: String,
        from: PollState,
        action: &'static str,
    },

    #[error("poll {poll_id} is not accepting votes")]
    PollNotOpen { poll_id: String },

    #[error("poll {poll_id} is closed")]
    PollClosed { poll_id: String },

    #[error("option '{option_id}' does not exist on poll {poll_id}")]
    UnknownOption { poll_id: String, option_id: String },

    #[error("poll {0} not found")]
    PollNotFound(String),

    #[error("poll {poll_id} already has a ballot from all {eligible} eligible voters")]
    EligibilityExhausted { poll_id: String, eligible: u32 },
}

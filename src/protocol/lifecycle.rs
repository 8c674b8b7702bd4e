//! Session lifecycle state machine.
//!
//! ```text
//! New --StartTaskSent--> TaskPending --TaskStarted--> SessionPending
//!     --SessionStarted--> Streaming --LastFrameSent--> Finishing
//!     --SessionFinished--> Done
//! ```
//!
//! `Failed` (an error response or loss of the transport) moves any phase to
//! `Done`. Every other combination is rejected.

use crate::error::{AsrError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    New,
    TaskPending,
    SessionPending,
    Streaming,
    Finishing,
    Done,
}

/// Inputs that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    StartTaskSent,
    TaskStarted,
    SessionStarted,
    LastFrameSent,
    SessionFinished,
    Failed,
}

impl SessionPhase {
    pub fn next(self, input: Transition) -> Result<SessionPhase> {
        use SessionPhase::*;
        use Transition::*;

        match (self, input) {
            (New, StartTaskSent) => Ok(TaskPending),
            (TaskPending, TaskStarted) => Ok(SessionPending),
            (SessionPending, SessionStarted) => Ok(Streaming),
            (Streaming, LastFrameSent) => Ok(Finishing),
            (Finishing, SessionFinished) => Ok(Done),
            (_, Failed) => Ok(Done),
            (from, input) => Err(AsrError::InvalidTransition {
                from,
                input: format!("{:?}", input),
            }),
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, SessionPhase::Done)
    }
}

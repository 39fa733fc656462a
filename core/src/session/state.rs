use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one reconstruction session
///
/// `Idle -> Created -> Processing -> {Completed | Failed | Cancelled}`.
/// Terminal states never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Created,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// The consumption loop can observe a terminal event before `start` has
    /// recorded `Processing`, so `Created` may go straight to a terminal state.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Created) => true,
            (Created, Processing) => true,
            (Created | Processing, Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Created => write!(f, "Created"),
            SessionState::Processing => write!(f, "Processing"),
            SessionState::Completed => write!(f, "Completed"),
            SessionState::Failed => write!(f, "Failed"),
            SessionState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

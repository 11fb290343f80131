use queue::{EntryId, TransitionError};
use reqwest::StatusCode;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Session expired")]
    Unauthorized,

    #[error("Rejected with {status}: {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("A reorder is already being committed")]
    ReorderInFlight,

    #[error("No drag in progress")]
    NotDragging,

    #[error("Drag out of range: {from} -> {to} with {len} entries")]
    InvalidDrag { from: usize, to: usize, len: usize },

    #[error("Unknown entry {0}")]
    UnknownEntry(EntryId),

    #[error("Invalid status change: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Entry {0} is in a terminal status")]
    TerminalEntry(EntryId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shop context is no longer current")]
    StaleContext,
}

/// How a failure is handled once it reaches the component that issued the
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried by the next poll tick or reconnect timer.
    Transient,
    /// Handed to the session handler, never retried locally.
    Authorization,
    /// Shown to the user, rolls back optimistic state.
    Rejected,
    /// Logged and dropped.
    Malformed,
    /// Caller misuse or local precondition.
    Usage,
}

impl SyncError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Network(_) | SyncError::WebSocket(_) | SyncError::Connect(_) => {
                ErrorClass::Transient
            }
            SyncError::Unauthorized => ErrorClass::Authorization,
            SyncError::Rejected { .. } => ErrorClass::Rejected,
            SyncError::Malformed(_) => ErrorClass::Malformed,
            SyncError::ReorderInFlight
            | SyncError::NotDragging
            | SyncError::InvalidDrag { .. }
            | SyncError::UnknownEntry(_)
            | SyncError::InvalidTransition(_)
            | SyncError::TerminalEntry(_)
            | SyncError::Config(_)
            | SyncError::StaleContext => ErrorClass::Usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        assert_eq!(SyncError::Unauthorized.class(), ErrorClass::Authorization);
        assert_eq!(
            SyncError::Connect("refused".to_string()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            SyncError::Rejected {
                status: StatusCode::CONFLICT,
                message: "position taken".to_string(),
            }
            .class(),
            ErrorClass::Rejected
        );

        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(SyncError::from(parse).class(), ErrorClass::Malformed);
        assert_eq!(SyncError::ReorderInFlight.class(), ErrorClass::Usage);
    }
}

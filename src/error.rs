//! Error types for the matchmaking engine
//!
//! This module defines all error kinds using anyhow for consistent error
//! handling throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Engine error kinds for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to acquire fetch lock: {message}")]
    LockAcquireFailed { message: String },

    #[error("failed to encode payload: {message}")]
    EncodeFailed { message: String },

    #[error("failed to decode payload: {message}")]
    DecodeFailed { message: String },

    #[error("failed to create ticket: {message}")]
    TicketCreateFailed { message: String },

    #[error("failed to get ticket: {message}")]
    TicketGetFailed { message: String },

    #[error("ticket not found: {ticket_id}")]
    TicketNotFound { ticket_id: String },

    #[error("failed to delete ticket: {message}")]
    TicketDeleteFailed { message: String },

    #[error("failed to set ticket expiration: {message}")]
    TicketExpireFailed { message: String },

    #[error("failed to get ticket index: {message}")]
    IndexGetFailed { message: String },

    #[error("failed to deindex tickets: {message}")]
    IndexDeleteFailed { message: String },

    #[error("failed to get pending tickets: {message}")]
    PendingGetFailed { message: String },

    #[error("failed to set tickets to pending: {message}")]
    PendingSetFailed { message: String },

    #[error("failed to release pending tickets: {message}")]
    PendingReleaseFailed { message: String },

    /// Sentinel driving the assignment watcher retry; never surfaced by the API.
    #[error("assignment not found")]
    AssignmentNotFound,

    #[error("failed to get assignment: {message}")]
    AssignmentGetFailed { message: String },

    #[error("failed to set assignment: {message}")]
    AssignmentSetFailed { message: String },

    #[error("failed to execute match functions: {message}")]
    MatchExecFailed { message: String },

    #[error("failed to evaluate matches: {message}")]
    MatchEvalFailed { message: String },

    #[error("failed to assign matches: {message}")]
    MatchAssignFailed { message: String },

    #[error("failed to watch assignments: {message}")]
    WatchFailed { message: String },
}

impl EngineError {
    /// Check whether an anyhow error is the assignment-not-found sentinel.
    pub fn is_assignment_not_found(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::AssignmentNotFound)
        )
    }
}

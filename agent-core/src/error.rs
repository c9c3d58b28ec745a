//! Error taxonomy, one enum per subsystem, matching §7's five-category
//! failure taxonomy (agent-observable, invalid tool call, internal-action
//! misuse, safety rejection, infrastructure failure).

use thiserror::Error;

/// Errors from the Remote Session Broker.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No session exists with the given id on the given host.
    #[error("session not found: {computer_ip}/{session_id}")]
    SessionNotFound {
        /// Host the session was expected on.
        computer_ip: String,
        /// The missing session id.
        session_id: String,
    },

    /// The session is already executing a command.
    #[error("session busy: {0}")]
    SessionBusy(String),

    /// `input_in_session` was called on a session that isn't currently
    /// detected as waiting on stdin.
    #[error("session not waiting for input: {0}")]
    NotWaitingForInput(String),

    /// A command was rejected by safety validation before dispatch.
    #[error("safety rejection: {0}")]
    SafetyRejected(String),

    /// The target host could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// A blocking operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the Action/Observation Registry.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ActionError {
    /// The tool name has no registered handler.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The argument blob didn't match the action's schema.
    #[error("invalid arguments for {action}: {reason}")]
    InvalidArgs {
        /// The action type the arguments were for.
        action: String,
        /// Why they were rejected.
        reason: String,
    },

    /// Tool name exceeded 64 characters or failed `[a-zA-Z0-9_-]+`.
    #[error("malformed tool name: {0}")]
    NameTooLong(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the Conversation Tree / Context Manager.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContextError {
    /// A `SUMMARIZE` internal action's depth range failed validation.
    #[error("invalid summarize range [{d1}, {d2}): {reason}")]
    InvalidSummarizeRange {
        /// Requested start depth.
        d1: u32,
        /// Requested end depth.
        d2: u32,
        /// Why the range is invalid.
        reason: String,
    },

    /// A loaded or in-memory tree violated a structural invariant.
    /// Per §9, this is a hard error — never silently corrected.
    #[error("tree corrupt: {0}")]
    TreeCorrupt(String),

    /// Failed to serialize or deserialize a node or tree.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the Scaffold (task driver).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ScaffoldError {
    /// The task's step or wall-clock budget was exhausted.
    #[error("budget exhausted: {0}")]
    BudgetExhausted(String),

    /// A checkpoint directory was missing or malformed.
    #[error("checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),

    /// A context-tree invariant was violated mid-run.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

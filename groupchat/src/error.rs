//! Error types for group chat orchestration
//!
//! Errors fall into two families:
//! - Capability errors: a remote generation call failed. Recoverable at the
//!   orchestration level, the run records them and keeps going.
//! - Structural errors: the orchestration itself cannot proceed correctly.
//!   These are fatal to a run and surfaced to the caller.

use std::time::Duration;

/// Failure of an agent's capability (or a capability-backed strategy/summarizer)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("capability timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(String),

    #[error("upstream returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Failed(String),
}

impl CapabilityError {
    /// Create a generic failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Failure of a selection or termination decision
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("decision capability failed: {0}")]
    Capability(#[from] CapabilityError),

    #[error("could not interpret decision: {0:?}")]
    Unrecognized(String),
}

/// Structural errors raised while assembling or configuring a group chat
#[derive(Debug, thiserror::Error)]
pub enum GroupChatError {
    #[error("agent '{0}' is already registered")]
    DuplicateAgent(String),

    #[error("agent '{0}' is not registered")]
    UnknownAgent(String),

    #[error("a group chat needs at least one agent")]
    NoAgents,

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("config error: {0}")]
    Config(String),
}

/// Fatal cause carried by a failed run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunFailure {
    #[error("turn budget of {max_turns} exceeded without termination")]
    TurnBudgetExceeded { max_turns: usize },

    #[error("selection failed: {0}")]
    SelectionFailed(StrategyError),

    #[error("termination check failed: {0}")]
    TerminationCheckFailed(StrategyError),

    #[error("selection chose unregistered agent '{0}'")]
    UnknownAgent(String),

    #[error("run cancelled")]
    Cancelled,
}

//! Error types for request preparation, batch execution and agent runs.

use serde::Serialize;
use thiserror::Error;

/// Result type alias used across nim-core.
pub type Result<T> = std::result::Result<T, NimError>;

/// Main error type.
///
/// `Validation` and `Schema` come from caller input, `Agent` from the tool
/// loop, and `Transport` wraps whatever the HTTP collaborator reported.
#[derive(Debug, Error)]
pub enum NimError {
    /// Malformed or missing caller input.
    #[error("{0}")]
    Validation(String),

    /// A tool's parameter schema could not be used.
    #[error("tool '{tool}' has an invalid parameters schema: {message}")]
    Schema { tool: String, message: String },

    /// Tool loop failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Opaque failure from the transport collaborator.
    #[error("{0:#}")]
    Transport(anyhow::Error),
}

impl NimError {
    pub fn validation(message: impl Into<String>) -> Self {
        NimError::Validation(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            NimError::Validation(_) => FailureKind::Validation,
            NimError::Schema { .. } => FailureKind::Schema,
            NimError::Agent(_) => FailureKind::Agent,
            NimError::Transport(_) => FailureKind::Transport,
        }
    }
}

/// Errors raised by the tool-calling agent loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    /// The model asked for a tool that is not connected.
    #[error("tool '{name}' is not available to this agent")]
    ToolNotFound { name: String },

    /// The loop ran out of prompting cycles.
    #[error("agent stopped after {max_iterations} iterations without a final answer")]
    IterationLimit { max_iterations: usize },

    /// A connected tool returned an error.
    #[error("tool '{name}' failed: {message}")]
    ToolFailed { name: String, message: String },
}

/// Discriminant recorded on per-item error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Schema,
    Agent,
    Transport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NimError::validation("at least one message is required");
        assert_eq!(err.to_string(), "at least one message is required");

        let err = NimError::Schema {
            tool: "lookup".to_string(),
            message: "expected value at line 1 column 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "tool 'lookup' has an invalid parameters schema: expected value at line 1 column 1"
        );
    }

    #[test]
    fn test_agent_error_is_transparent() {
        let err: NimError = AgentError::IterationLimit { max_iterations: 2 }.into();
        assert_eq!(
            err.to_string(),
            "agent stopped after 2 iterations without a final answer"
        );
        assert_eq!(err.kind(), FailureKind::Agent);
    }

    #[test]
    fn test_transport_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection reset").context("failed to call /chat/completions");
        let err = NimError::Transport(inner);
        assert_eq!(
            err.to_string(),
            "failed to call /chat/completions: connection reset"
        );
        assert_eq!(err.kind(), FailureKind::Transport);
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(FailureKind::Validation).unwrap(),
            serde_json::json!("validation")
        );
    }
}

//! Error types for the workflow engine

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using WorkflowError
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors that can occur while building or running a workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A node's execution raised; fatal for the whole run
    #[error("Node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },

    /// The graph description is structurally invalid
    #[error("Invalid workflow graph: {}", format_validation(.0))]
    Validation(Vec<ValidationError>),

    /// A node name was looked up that the graph does not contain
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// The condition evaluator rejected an expression
    #[error("Expression error: {0}")]
    Expression(String),

    /// The run exceeded the configured wave limit
    #[error("Wave limit reached ({0} waves)")]
    WaveLimitExceeded(u32),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    /// Create a node failure for the given node
    pub fn failed(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeFailed {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create an expression error
    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression(message.into())
    }

    /// Validation errors carried by this error, if any
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

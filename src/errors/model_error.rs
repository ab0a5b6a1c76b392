//! Model-related error types.

use thiserror::Error;

use crate::graph::Shape;

/// Errors that can occur while assembling, compiling or running a model graph.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid configuration for {operation}: {message}")]
    InvalidConfiguration {
        operation: &'static str,
        message: String,
    },

    #[error("Shape mismatch in {operation}: expected {expected}, got {actual}")]
    ShapeMismatch {
        operation: &'static str,
        expected: Shape,
        actual: Shape,
    },

    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn invalid_config(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            operation,
            message: message.into(),
        }
    }
}

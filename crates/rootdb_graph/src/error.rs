//! Error types for the graph crate.

use thiserror::Error;

/// Result type for serializer operations.
pub type SerializerResult<T> = Result<T, SerializerError>;

/// Errors that can occur while serializing or deserializing a graph.
#[derive(Debug, Error)]
pub enum SerializerError {
    /// The graph contains a cycle the active serializer cannot represent.
    #[error("graph contains a cycle, which this serializer cannot represent")]
    Cycle,

    /// Underlying JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The snapshot text does not have the expected structure.
    #[error("invalid snapshot structure: {message}")]
    InvalidStructure {
        /// Description of the structural problem.
        message: String,
    },
}

impl SerializerError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

//! Error types for the reactive store.

use thiserror::Error;

/// Main error type for store and stream operations.
///
/// Errors travel through streams as [`Notification::Error`](crate::stream::Notification),
/// so the type is `Clone` and can be fanned out to every subscriber of a
/// shared stream.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("Value for \"{operator}\" should be an array or a plain object, got {found}")]
    ShapeMismatch {
        operator: &'static str,
        found: String,
    },

    #[error("Payload for \"{operator}\" does not fit a {expected} collection")]
    PayloadMismatch {
        operator: &'static str,
        expected: &'static str,
    },

    #[error("Operator \"{operator}\" received a reducer before any state")]
    Uninitialized { operator: &'static str },

    #[error("Creator failed: {0}")]
    Creator(String),

    #[error("Middleware failed: {0}")]
    Middleware(String),

    #[error("Reducer failed: {0}")]
    Reducer(String),

    #[error("Leaf not found: {0}")]
    LeafNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

//! Error types for the story store.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Incorrect number of arguments for {operation}: expecting {expected}, got {got}")]
    Arity {
        operation: String,
        expected: usize,
        got: usize,
    },

    #[error("Received unknown function invocation: {0}")]
    UnknownOperation(String),

    #[error("Failed to get state for {0}")]
    NotFound(String),

    #[error("Cannot add story {0}, it already exists")]
    Duplicate(String),

    #[error("Story {name} not in the from state: {expected} (currently {actual})")]
    InvalidTransition {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Transition {from} -> {to} is not part of the workflow")]
    IllegalTransition { from: String, to: String },

    #[error("Unknown story state: {0}")]
    UnknownState(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid ledger format: {0}")]
    InvalidFormat(String),

    #[error("Ledger is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl StoreError {
    /// Structured error payload returned to callers of the read path.
    ///
    /// Lookup misses carry the offending key so they stay observable.
    pub fn payload(&self) -> Vec<u8> {
        let body = match self {
            StoreError::NotFound(key) => serde_json::json!({
                "Error": self.to_string(),
                "key": key,
            }),
            other => serde_json::json!({ "Error": other.to_string() }),
        };
        // Serializing a `Value` built from strings cannot fail.
        serde_json::to_vec(&body).unwrap_or_default()
    }

    /// Whether the error came from the underlying ledger rather than from
    /// workflow or argument validation.
    pub fn is_ledger_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Ledger(_) | StoreError::Io(_) | StoreError::Locked
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

//! Error Handling Module
//!
//! Error types for dataset ingestion, model construction and training.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for steering classifier operations
#[derive(Error, Debug)]
pub enum SteeringError {
    /// Error decoding an image file
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations (empty dataset, bad split...)
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error building or loading the model
    #[error("Model error: {0}")]
    Model(String),

    /// Error inside the training loop
    #[error("Training error: {0}")]
    Training(String),

    /// Error writing or reading the best-model checkpoint
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for SteeringError {
    fn from(err: serde_json::Error) -> Self {
        SteeringError::Serialization(err.to_string())
    }
}

/// Convenience Result type for steering classifier operations
pub type Result<T> = std::result::Result<T, SteeringError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Wrap the error as a checkpoint failure with a message prefix
    fn checkpoint_context(self, msg: &str) -> Result<T>;

    /// Wrap the error as a model failure, message built lazily
    fn model_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn checkpoint_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| SteeringError::Checkpoint(format!("{}: {}", msg, e)))
    }

    fn model_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| SteeringError::Model(format!("{}: {}", f(), e)))
    }
}

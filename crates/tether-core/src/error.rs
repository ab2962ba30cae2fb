//! Core error types

use thiserror::Error;

use crate::merge::MergeError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("unknown resource kind: {kind}")]
    UnknownKind { kind: String },

    #[error("object type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Failed to parse config: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl CoreError {
    /// Check if this error comes from a Fail merge policy
    pub fn is_merge_attempted(&self) -> bool {
        matches!(self, CoreError::Merge(e) if e.is_merge_attempted())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

//! Error types for tether-kube

use std::fmt;
use thiserror::Error;

use tether_core::{CoreError, ResourceKind};

use crate::object::Identity;

/// Result type for tether-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reconciling against a cluster
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Error from the core types (merge conflicts, config)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Object absent from the live cluster (mock client and typed lookups)
    #[error("{identity} not found")]
    NotFound { identity: Identity },

    /// Object is already being deleted
    #[error("{identity} is terminating")]
    Gone { identity: Identity },

    /// Owner back-reference could not be built
    #[error("cannot set owner reference on {identity}: {reason}")]
    OwnerReference { identity: Identity, reason: String },

    /// An object does not have the type registered for its kind
    #[error("type mismatch for {kind}: expected {expected}, found {found}")]
    TypeMismatch {
        kind: ResourceKind,
        expected: String,
        found: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A single API call exceeded the configured timeout
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<tether_core::MergeError> for KubeError {
    fn from(e: tether_core::MergeError) -> Self {
        KubeError::Core(CoreError::Merge(e))
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            KubeError::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if the object is gone or already terminating (410)
    pub fn is_gone(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 410,
            KubeError::Gone { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Check if this error comes from a Fail merge policy
    pub fn is_merge_attempted(&self) -> bool {
        matches!(self, KubeError::Core(e) if e.is_merge_attempted())
    }
}

/// Step of a batch operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get,
    Preprocess,
    Create,
    Update,
    List,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Get => "get",
            Action::Preprocess => "preprocess",
            Action::Create => "create",
            Action::Update => "update",
            Action::List => "list",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A per-object failure collected by Apply, Cleanup or DeleteAll
#[derive(Debug, Error)]
pub struct ReconcileError {
    pub action: Action,
    pub kind: ResourceKind,
    pub identity: Option<Identity>,
    #[source]
    pub source: KubeError,
}

impl ReconcileError {
    pub fn new(action: Action, identity: &Identity, source: KubeError) -> Self {
        Self {
            action,
            kind: identity.kind,
            identity: Some(identity.clone()),
            source,
        }
    }

    /// Failure not tied to one object, such as listing a kind
    pub fn for_kind(action: Action, kind: ResourceKind, source: KubeError) -> Self {
        Self {
            action,
            kind,
            identity: None,
            source,
        }
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity {
            Some(identity) => write!(f, "{} {}: {}", self.action, identity, self.source),
            None => write!(f, "{} {}: {}", self.action, self.kind, self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> KubeError {
        KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_error_classification() {
        assert!(api_error(404).is_not_found());
        assert!(api_error(410).is_gone());
        assert!(api_error(409).is_conflict());
        assert!(!api_error(500).is_not_found());

        let identity = Identity::new(ResourceKind::ConfigMap, "ns", "cm");
        assert!(KubeError::NotFound { identity: identity.clone() }.is_not_found());
        assert!(KubeError::Gone { identity }.is_gone());
    }

    #[test]
    fn test_merge_attempted_passes_through() {
        let err: KubeError = tether_core::MergeError::MergeAttempted.into();
        assert!(err.is_merge_attempted());
    }

    #[test]
    fn test_reconcile_error_display() {
        let identity = Identity::new(ResourceKind::Secret, "ns", "creds");
        let err = ReconcileError::new(
            Action::Create,
            &identity,
            KubeError::InvalidManifest("bad".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "create Secret ns/creds: invalid manifest: bad"
        );

        let err = ReconcileError::for_kind(
            Action::List,
            ResourceKind::Role,
            KubeError::InvalidConfig("x".to_string()),
        );
        assert_eq!(err.to_string(), "list Role: invalid configuration: x");
    }
}

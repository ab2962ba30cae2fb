//! CLI error types with exit code handling

use miette::Diagnostic;
use thiserror::Error;

use tether_core::CoreError;
use tether_kube::KubeError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid command-line input
    #[error("Invalid input: {message}")]
    #[diagnostic(code(tether::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Configuration file could not be loaded
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(tether::cli::config),
        help("check the file passed with --config or the default configuration path")
    )]
    Config { message: String },

    /// Manifest could not be parsed
    #[error("Manifest error: {message}")]
    #[diagnostic(code(tether::cli::manifest))]
    Manifest {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Cluster access failed
    #[error("Cluster error: {message}")]
    #[diagnostic(
        code(tether::cli::cluster),
        help("check your kubeconfig context and that the API server is reachable")
    )]
    Cluster { message: String },

    /// Some objects could not be reconciled
    #[error("{failed} object(s) failed to reconcile")]
    #[diagnostic(code(tether::cli::reconcile))]
    Reconcile { failed: usize },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(tether::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(tether::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Manifest { .. } => exit_codes::MANIFEST_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Reconcile { .. } => exit_codes::RECONCILE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
            help: Some("supported kinds are listed by `tether kinds`".to_string()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::InvalidManifest(_)
            | KubeError::TypeMismatch { .. }
            | KubeError::Core(CoreError::UnknownKind { .. }) => CliError::manifest(err.to_string()),
            KubeError::Io(e) => e.into(),
            other => CliError::Cluster {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::ResourceKind;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            CliError::input_with_help("bad", "fix it").exit_code(),
            exit_codes::INPUT_ERROR
        );
        assert_eq!(
            CliError::Reconcile { failed: 2 }.exit_code(),
            exit_codes::RECONCILE_ERROR
        );
    }

    #[test]
    fn test_kube_error_classification() {
        let err: CliError = KubeError::InvalidManifest("document 0".to_string()).into();
        assert!(matches!(err, CliError::Manifest { .. }));

        let err: CliError = KubeError::Timeout(std::time::Duration::from_secs(1)).into();
        assert!(matches!(err, CliError::Cluster { .. }));

        let err: CliError = KubeError::Core(CoreError::UnknownKind {
            kind: "Deployment".to_string(),
        })
        .into();
        assert_eq!(err.exit_code(), exit_codes::MANIFEST_ERROR);

        let err: CliError = KubeError::NotFound {
            identity: tether_kube::Identity::new(ResourceKind::ConfigMap, "ns", "owner"),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::CLUSTER_ERROR);
    }
}

//! CLI error types with exit code handling
//!
//! Every failure that ends the process goes through [`CliError`], which
//! carries the exit code the process terminates with.

use miette::Diagnostic;
use thiserror::Error;

use namespice_core::CoreError;
use namespice_kube::KubeError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(namespice::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Could not reach or authenticate against the cluster
    #[error("Cluster error: {message}")]
    #[diagnostic(
        code(namespice::cli::cluster),
        help("check KUBECONFIG or the in-cluster service account")
    )]
    Cluster { message: String },

    /// Class files could not be rendered
    #[error("Render error: {message}")]
    #[diagnostic(code(namespice::cli::render))]
    Render {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A sweep ran to completion but some objects failed
    #[error("Sweep finished with {failed} failed object(s)")]
    #[diagnostic(code(namespice::cli::sweep))]
    SweepFailed { failed: usize },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(namespice::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(namespice::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_UNAVAILABLE,
            CliError::Render { .. } => exit_codes::RENDER_ERROR,
            CliError::SweepFailed { .. } => exit_codes::PARTIAL_FAILURE,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a cluster error
    pub fn cluster(message: impl Into<String>) -> Self {
        Self::Cluster {
            message: message.into(),
        }
    }

    /// Create a render error
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
            help: None,
        }
    }

    /// Create a render error with help text
    pub fn render_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an internal error
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
            CoreError::Io(e) => CliError::from(e),
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        CliError::cluster(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::config("x").exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(CliError::cluster("x").exit_code(), exit_codes::CLUSTER_UNAVAILABLE);
        assert_eq!(CliError::render("x").exit_code(), exit_codes::RENDER_ERROR);
        assert_eq!(CliError::SweepFailed { failed: 2 }.exit_code(), exit_codes::PARTIAL_FAILURE);
        assert_eq!(CliError::internal("x").exit_code(), exit_codes::ERROR);
    }

    #[test]
    fn test_core_io_error_maps_to_io() {
        let err = CoreError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        assert!(matches!(CliError::from(err), CliError::Io { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = CliError::SweepFailed { failed: 3 };
        assert_eq!(err.to_string(), "Sweep finished with 3 failed object(s)");
    }
}

//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use miette::Diagnostic;
use thiserror::Error;
use tidemark_kube::{UpgradeError, error_chain};

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Target or source version rejected
    #[error("{message}")]
    #[diagnostic(code(tidemark::cli::version))]
    Version {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Nothing installed, or the installation state could not be read
    #[error("{message}")]
    #[diagnostic(code(tidemark::cli::state))]
    State {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Cluster connection could not be established
    #[error("Unable to connect to the cluster: {message}")]
    #[diagnostic(
        code(tidemark::cli::connection),
        help("Check your kubeconfig, or pick a context with --kube-context")
    )]
    Connection { message: String },

    /// Operator declined the confirmation prompt
    #[error("Upgrade aborted by operator")]
    #[diagnostic(code(tidemark::cli::declined))]
    Declined,

    /// Failed after the cluster was modified
    #[error("{message}")]
    #[diagnostic(
        code(tidemark::cli::partial),
        help("The cluster may be partially upgraded. Re-run `tidemark upgrade` to converge")
    )]
    Partial { message: String },

    /// Interrupted with Ctrl-C
    #[error("Upgrade cancelled")]
    #[diagnostic(code(tidemark::cli::cancelled))]
    Cancelled {
        #[help]
        help: Option<String>,
    },

    /// Settings file unreadable or invalid
    #[error("Invalid settings file {path}: {message}")]
    #[diagnostic(code(tidemark::cli::settings))]
    Settings { path: String, message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(tidemark::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(tidemark::cli::error))]
    Other { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(tidemark::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Version { .. } => exit_codes::VERSION_ERROR,
            CliError::State { .. } => exit_codes::STATE_ERROR,
            CliError::Connection { .. } => exit_codes::STATE_ERROR,
            CliError::Declined => exit_codes::DECLINED,
            CliError::Partial { .. } => exit_codes::PARTIAL_UPGRADE,
            CliError::Cancelled { .. } => exit_codes::INTERRUPTED,
            CliError::Settings { .. } => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a version error with help text
    pub fn version_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Version {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Map the terminal error of a run
    ///
    /// `partial` is set when the run stopped after the cluster was modified.
    pub fn from_upgrade(error: &UpgradeError, partial: bool) -> Self {
        let message = error_chain(error);

        if let UpgradeError::Cancelled = error {
            return Self::Cancelled {
                help: partial.then(|| {
                    "The cluster may be partially upgraded. Re-run `tidemark upgrade` to converge"
                        .to_string()
                }),
            };
        }
        if partial {
            return Self::Partial { message };
        }

        match error {
            UpgradeError::UnparsableVersion { .. } => Self::Version {
                message,
                help: Some("Versions look like 1.3.0 or v1.3.0".to_string()),
            },
            UpgradeError::IncompatibleSourceVersion { .. } => Self::version_with_help(
                message,
                "Uninstall Tidemark and install the target version instead",
            ),
            UpgradeError::NamespaceNotFound => Self::State {
                message,
                help: Some(
                    "Install Tidemark first, or select another cluster with --kube-context"
                        .to_string(),
                ),
            },
            UpgradeError::VersionRecordMissing { .. } => Self::State {
                message,
                help: Some("The installation looks broken; reinstall Tidemark".to_string()),
            },
            UpgradeError::CloudModeDetection(_)
            | UpgradeError::ConfigurationUnreadable { .. }
            | UpgradeError::StateRead(_) => Self::State {
                message,
                help: None,
            },
            UpgradeError::UserDeclined => Self::Declined,
            _ => Self::Other { message },
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

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

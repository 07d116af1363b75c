//! Error types for tidemark-kube
//!
//! Two layers: [`KubeError`] is what cluster calls, managers and the registry
//! return; [`UpgradeError`] is the terminal taxonomy the executor reports,
//! carrying which phase, manager or kind failed.

use thiserror::Error;
use tidemark_core::CoreError;

/// Result type for tidemark-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error(transparent)]
    Api(#[from] kube::Error),

    /// Transport failure reported by a non-kube client
    #[error("cluster request failed: {0}")]
    Transport(String),

    /// Object not found (reported by non-kube clients)
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// No namespace carries the installation marker
    #[error("no installation namespace found in cluster")]
    NamespaceNotFound,

    /// Installation namespace exists but the version record does not
    #[error("version record missing or empty in namespace '{namespace}'")]
    VersionRecordMissing { namespace: String },

    /// Probe for the cloud secret failed with something other than not-found
    #[error("unable to check if cloud mode is enabled")]
    CloudModeDetection(#[source] Box<KubeError>),

    /// Installation configuration missing or invalid
    #[error("unable to read the installation configuration in '{namespace}': {reason}")]
    ConfigurationUnreadable { namespace: String, reason: String },

    /// A registry entry depends on a manager that was never registered
    #[error("manager '{manager}' depends on unknown manager '{dependency}'")]
    UnknownDependency { manager: String, dependency: String },

    /// Registry dependencies form a cycle
    #[error("dependency cycle between managers: {}", .managers.join(", "))]
    DependencyCycle { managers: Vec<String> },

    /// Two registry entries share a name
    #[error("manager '{0}' registered twice")]
    DuplicateManager(String),

    /// Generated or listed object is malformed
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Confirmation prompt could not be shown or answered
    #[error("confirmation prompt failed: {0}")]
    Prompt(String),

    /// Operation cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Core error (version parsing, configuration)
    #[error(transparent)]
    Core(#[from] CoreError),
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

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            KubeError::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}

/// Terminal error of an upgrade run
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpgradeError {
    #[error("unable to parse version '{input}': {reason}")]
    UnparsableVersion { input: String, reason: String },

    #[error("unable to upgrade from version '{current}', which is older than '{minimum}'")]
    IncompatibleSourceVersion { current: String, minimum: String },

    #[error("no installation found in cluster to upgrade")]
    NamespaceNotFound,

    #[error("unable to read the current version for migration (namespace '{namespace}')")]
    VersionRecordMissing { namespace: String },

    #[error("unable to check if cloud mode is enabled")]
    CloudModeDetection(#[source] KubeError),

    #[error("unable to read the current configuration: {reason}")]
    ConfigurationUnreadable { reason: String },

    #[error("unable to read cluster state")]
    StateRead(#[source] KubeError),

    #[error("upgrade declined by operator")]
    UserDeclined,

    #[error("unable to build the resource manager list")]
    Registry(#[source] KubeError),

    #[error("failed to upgrade {name}")]
    ManagerInstall {
        name: String,
        #[source]
        cause: KubeError,
    },

    #[error("failed to sync {kind}")]
    Reconcile {
        kind: String,
        #[source]
        cause: KubeError,
    },

    #[error("upgrade cancelled")]
    Cancelled,
}

impl From<CoreError> for UpgradeError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnparsableVersion { input, reason } => {
                UpgradeError::UnparsableVersion { input, reason }
            }
            CoreError::IncompatibleSourceVersion { current, minimum } => {
                UpgradeError::IncompatibleSourceVersion { current, minimum }
            }
            CoreError::InvalidConfig { message } => {
                UpgradeError::ConfigurationUnreadable { reason: message }
            }
        }
    }
}

impl From<KubeError> for UpgradeError {
    /// Map a state-read failure onto the terminal taxonomy
    fn from(e: KubeError) -> Self {
        match e {
            KubeError::NamespaceNotFound => UpgradeError::NamespaceNotFound,
            KubeError::VersionRecordMissing { namespace } => {
                UpgradeError::VersionRecordMissing { namespace }
            }
            KubeError::CloudModeDetection(inner) => UpgradeError::CloudModeDetection(*inner),
            KubeError::ConfigurationUnreadable { reason, .. } => {
                UpgradeError::ConfigurationUnreadable { reason }
            }
            KubeError::Core(core) => core.into(),
            KubeError::Cancelled => UpgradeError::Cancelled,
            other => UpgradeError::StateRead(other),
        }
    }
}

impl UpgradeError {
    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnparsableVersion { .. } => "unparsable-version",
            Self::IncompatibleSourceVersion { .. } => "incompatible-source-version",
            Self::NamespaceNotFound => "namespace-not-found",
            Self::VersionRecordMissing { .. } => "version-record-missing",
            Self::CloudModeDetection(_) => "cloud-mode-detection",
            Self::ConfigurationUnreadable { .. } => "configuration-unreadable",
            Self::StateRead(_) => "state-read",
            Self::UserDeclined => "user-declined",
            Self::Registry(_) => "registry",
            Self::ManagerInstall { .. } => "manager-install",
            Self::Reconcile { .. } => "reconcile",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = KubeError::NotFound {
            kind: "Secret".to_string(),
            name: "x".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!KubeError::Transport("reset".to_string()).is_not_found());
    }

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: "Forbidden".to_string(),
            code,
        })
    }

    #[test]
    fn test_api_error_reads_once_in_chain() {
        let inner = api_error(403, "secrets is forbidden");
        let inner_chain = crate::executor::error_chain(&inner);

        let err = KubeError::Api(inner);
        assert_eq!(crate::executor::error_chain(&err), inner_chain);

        let upgrade = UpgradeError::StateRead(KubeError::Api(api_error(403, "secrets is forbidden")));
        assert_eq!(
            crate::executor::error_chain(&upgrade),
            format!("unable to read cluster state: {}", inner_chain)
        );
    }

    #[test]
    fn test_cloud_probe_error_reads_once_in_chain() {
        let err = KubeError::CloudModeDetection(Box::new(KubeError::Transport("timeout".to_string())));
        assert_eq!(
            crate::executor::error_chain(&err),
            "unable to check if cloud mode is enabled: cluster request failed: timeout"
        );
    }

    #[test]
    fn test_state_errors_map_to_taxonomy() {
        assert!(matches!(
            UpgradeError::from(KubeError::NamespaceNotFound),
            UpgradeError::NamespaceNotFound
        ));
        assert!(matches!(
            UpgradeError::from(KubeError::CloudModeDetection(Box::new(KubeError::Transport(
                "timeout".to_string()
            )))),
            UpgradeError::CloudModeDetection(KubeError::Transport(_))
        ));
        assert!(matches!(
            UpgradeError::from(KubeError::Transport("eof".to_string())),
            UpgradeError::StateRead(_)
        ));
        let core = CoreError::UnparsableVersion {
            input: "x".to_string(),
            reason: "bad".to_string(),
        };
        assert_eq!(UpgradeError::from(KubeError::Core(core)).kind(), "unparsable-version");
    }
}

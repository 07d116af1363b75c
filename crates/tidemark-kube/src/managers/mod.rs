//! Resource managers
//!
//! A manager owns the installation logic for one slice of the system. It is
//! built fresh for every run with the target version and configuration baked
//! in, so `install_from_scratch` takes nothing but the cluster client.
//!
//! Every object a manager writes carries the ownership marker stamped with
//! the target version; the reconciler relies on that to find stragglers.

mod builtin;
mod objects;

pub use builtin::{
    COMPONENTS, ConfigManager, DeploymentRecordManager, RbacManager, WorkloadKind,
    WorkloadManager, WorkloadSpec,
};
pub use objects::Manifest;

use async_trait::async_trait;
use semver::Version;
use tidemark_core::{ClusterRecordedState, ConfigSpec};
use tidemark_core::resource::labels;

use crate::cluster::ClusterClient;
use crate::error::Result;

/// Installation logic for one resource kind
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Stable name used for ordering, logging and error reporting
    fn name(&self) -> &str;

    /// Create or update every object this manager owns
    ///
    /// Must be idempotent: re-running against an already-upgraded cluster
    /// leaves it unchanged.
    async fn install_from_scratch(&self, client: &dyn ClusterClient) -> Result<()>;
}

/// Everything a manager constructor needs to know about the run
#[derive(Debug, Clone, PartialEq)]
pub struct InstallContext {
    /// Installation namespace
    pub namespace: String,
    /// Version being installed
    pub target_version: Version,
    /// Whether the installation runs in cloud mode
    pub cloud_mode_enabled: bool,
    /// Installation configuration read from the cluster
    pub config: ConfigSpec,
}

impl InstallContext {
    pub fn new(namespace: impl Into<String>, target_version: Version) -> Self {
        Self {
            namespace: namespace.into(),
            target_version,
            cloud_mode_enabled: false,
            config: ConfigSpec::default(),
        }
    }

    /// Context for installing `target_version` over the recorded state
    pub fn from_state(state: &ClusterRecordedState, target_version: Version) -> Self {
        Self {
            namespace: state.namespace.clone(),
            target_version,
            cloud_mode_enabled: state.cloud_mode_enabled,
            config: state.configuration.clone(),
        }
    }

    /// Builder: enable or disable cloud mode
    pub fn with_cloud_mode(mut self, enabled: bool) -> Self {
        self.cloud_mode_enabled = enabled;
        self
    }

    /// Builder: set the installation configuration
    pub fn with_config(mut self, config: ConfigSpec) -> Self {
        self.config = config;
        self
    }

    /// Value written to the version label
    pub fn version_label(&self) -> String {
        labels::version_value(&self.target_version)
    }
}

/// Apply manifests in order, stopping at the first failure
pub(crate) async fn apply_all(
    client: &dyn ClusterClient,
    manager: &str,
    manifests: &[Manifest],
) -> Result<()> {
    for manifest in manifests {
        tracing::debug!(
            manager,
            kind = manifest.kind.kind,
            name = %manifest.name(),
            "applying object"
        );
        client
            .apply_object(&manifest.kind, manifest.namespace.as_deref(), &manifest.body)
            .await?;
    }
    Ok(())
}

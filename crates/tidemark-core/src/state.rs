//! Recorded cluster state read at the start of an upgrade

use semver::Version;

use crate::config::ConfigSpec;
use crate::resource::{ManagedResourceDescriptor, managed_resources};

/// Snapshot of the installation taken once per upgrade attempt
///
/// Never mutated by the orchestrator. Installers rewrite the recorded
/// version as a side effect; the snapshot is discarded after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRecordedState {
    /// Installation namespace
    pub namespace: String,
    /// Version recorded by the last successful install or upgrade
    pub current_version: Version,
    /// Whether the cloud secret is present
    pub cloud_mode_enabled: bool,
    /// Installation configuration
    pub configuration: ConfigSpec,
}

impl ClusterRecordedState {
    /// Buckets the reconciler sweeps for this installation
    pub fn managed_resources(&self) -> Vec<ManagedResourceDescriptor> {
        managed_resources(&self.namespace)
    }
}

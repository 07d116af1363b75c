//! Tidemark Kube - Kubernetes integration for Tidemark
//!
//! This crate provides:
//! - **Cluster Access**: A narrow async client trait, backed by `kube` or an in-memory mock
//! - **State Reading**: Installation namespace, recorded version, cloud flag and configuration
//! - **Resource Managers**: Idempotent installers, one per slice of the system
//! - **Registry**: Dependency-ordered manager catalog with deterministic ordering
//! - **Reconciliation**: Deletion of owned objects left behind by other versions
//! - **Upgrade Executor**: The state machine tying it all together
//! - **Progress Reporting**: Step events rendered for terminals, CI or tests

pub mod cluster;
pub mod error;
pub mod executor;
pub mod managers;
pub mod progress;
pub mod reconcile;
pub mod registry;
pub mod state;

pub use cluster::{ClusterClient, FIELD_MANAGER, KubeClusterClient, MockClusterClient, OperationCounts};
pub use error::{KubeError, Result, UpgradeError};
pub use executor::{
    ConfirmationRequest, Confirmer, StaticConfirmer, UpgradeExecutor, UpgradeOptions,
    UpgradeOutcome, UpgradePhase, UpgradeReport, error_chain,
};
pub use managers::{InstallContext, Manifest, ResourceManager};
pub use progress::{
    JsonProgressReporter, ProgressEvent, ProgressReporter, ProgressSink, QuietProgressReporter,
    RecordingProgress, Step, StepStatus,
};
pub use reconcile::StaleResourceReconciler;
pub use registry::ManagerRegistry;
pub use state::{ClusterStateReader, RecordedVersion};

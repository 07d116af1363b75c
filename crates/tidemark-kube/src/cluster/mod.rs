//! Cluster access
//!
//! Everything Tidemark needs from the cluster goes through [`ClusterClient`]:
//! - **KubeClusterClient**: the real thing, backed by `kube` and the dynamic API
//! - **MockClusterClient**: in-memory, with operation counts and error injection
//!
//! Lookups return `Ok(None)` for objects that do not exist; `Err` is reserved
//! for transport and API failures so callers can tell "absent" from "unreadable".

mod kube_client;
mod mock;

pub use kube_client::{FIELD_MANAGER, KubeClusterClient};
pub use mock::{MockClusterClient, OperationCounts};

use async_trait::async_trait;
use tidemark_core::{ManagedObject, ResourceKind};

use crate::error::Result;

/// Cluster operations used by the upgrade orchestrator
///
/// Implementations must be Send + Sync; calls are single-shot and never
/// retried at this layer.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Name of the namespace labelled with the ownership marker
    async fn find_installation_namespace(&self) -> Result<Option<String>>;

    /// A single key of a ConfigMap
    async fn get_config_value(
        &self,
        namespace: &str,
        object: &str,
        key: &str,
    ) -> Result<Option<String>>;

    /// Metadata of a Secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<ManagedObject>>;

    /// Objects of `kind` in `namespace` (or cluster-wide) matching `selector`
    async fn list_objects(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<ManagedObject>>;

    /// Delete one object; a missing object is reported as a not-found error
    async fn delete_object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()>;

    /// Create or update one object from its full manifest
    async fn apply_object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        manifest: &serde_json::Value,
    ) -> Result<()>;
}

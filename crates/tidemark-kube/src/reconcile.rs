//! Stale resource reconciliation
//!
//! After every manager has run, any owned object whose version label does not
//! match the target was left behind by an older release and is deleted.

use semver::Version;
use tidemark_core::ManagedResourceDescriptor;
use tidemark_core::resource::labels;

use crate::cluster::ClusterClient;
use crate::error::Result;

/// Deletes owned objects left behind by other versions
pub struct StaleResourceReconciler<'a> {
    client: &'a dyn ClusterClient,
}

impl<'a> StaleResourceReconciler<'a> {
    pub fn new(client: &'a dyn ClusterClient) -> Self {
        Self { client }
    }

    /// Sweep one (kind, namespace) bucket and return how many objects were deleted
    ///
    /// Objects without a version label count as stale. The first failing
    /// delete aborts the sweep; an object that is already gone does not.
    pub async fn sweep(
        &self,
        descriptor: &ManagedResourceDescriptor,
        target: &Version,
    ) -> Result<usize> {
        let expected = labels::version_value(target);
        let namespace = descriptor.namespace.as_deref();

        let objects = self
            .client
            .list_objects(&descriptor.kind, namespace, &labels::owned_selector())
            .await?;

        let mut deleted = 0;
        for object in objects
            .iter()
            .filter(|o| o.version_tag() != Some(expected.as_str()))
        {
            tracing::info!(
                kind = descriptor.kind.kind,
                object = %object.key(),
                found = object.version_tag().unwrap_or("<none>"),
                expected = %expected,
                "deleting stale object"
            );

            let object_namespace = object.namespace.as_deref().or(namespace);
            match self
                .client
                .delete_object(&descriptor.kind, object_namespace, &object.name)
                .await
            {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(object = %object.key(), "already deleted");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterClient;
    use crate::error::KubeError;
    use tidemark_core::{ManagedObject, ResourceKind};

    fn deployments() -> ManagedResourceDescriptor {
        ManagedResourceDescriptor::namespaced(ResourceKind::DEPLOYMENTS, "tm")
    }

    fn target() -> Version {
        Version::new(1, 3, 0)
    }

    #[tokio::test]
    async fn test_deletes_only_mismatched_versions() {
        let mock = MockClusterClient::new();
        mock.add_owned_object(&ResourceKind::DEPLOYMENTS, Some("tm"), "current", "1.3.0");
        mock.add_owned_object(&ResourceKind::DEPLOYMENTS, Some("tm"), "old", "1.2.0");
        mock.add_object(
            &ResourceKind::DEPLOYMENTS,
            ManagedObject::new("unlabelled", Some("tm"))
                .with_label(labels::SYSTEM_OBJECT, labels::SYSTEM_OBJECT_VALUE),
        );
        mock.add_object(
            &ResourceKind::DEPLOYMENTS,
            ManagedObject::new("foreign", Some("tm")).with_label(labels::VERSION, "0.1.0"),
        );

        let reconciler = StaleResourceReconciler::new(&mock);
        let deleted = reconciler.sweep(&deployments(), &target()).await.unwrap();

        assert_eq!(deleted, 2);
        let mut gone = mock.deleted();
        gone.sort();
        assert_eq!(gone, vec!["Deployment/old", "Deployment/unlabelled"]);
        assert!(mock.object(&ResourceKind::DEPLOYMENTS, Some("tm"), "foreign").is_some());
    }

    #[tokio::test]
    async fn test_second_sweep_deletes_nothing() {
        let mock = MockClusterClient::new();
        mock.add_owned_object(&ResourceKind::DEPLOYMENTS, Some("tm"), "old", "1.2.0");

        let reconciler = StaleResourceReconciler::new(&mock);
        assert_eq!(reconciler.sweep(&deployments(), &target()).await.unwrap(), 1);
        assert_eq!(reconciler.sweep(&deployments(), &target()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_other_namespaces_untouched() {
        let mock = MockClusterClient::new();
        mock.add_owned_object(&ResourceKind::DEPLOYMENTS, Some("elsewhere"), "old", "1.2.0");

        let deleted = StaleResourceReconciler::new(&mock)
            .sweep(&deployments(), &target())
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_cluster_scoped_sweep() {
        let mock = MockClusterClient::new();
        mock.add_owned_object(&ResourceKind::CLUSTER_ROLES, None, "tidemark-old", "1.1.0");
        mock.add_owned_object(&ResourceKind::CLUSTER_ROLES, None, "tidemark-new", "1.3.0");

        let descriptor = ManagedResourceDescriptor::cluster_scoped(ResourceKind::CLUSTER_ROLES);
        let deleted = StaleResourceReconciler::new(&mock)
            .sweep(&descriptor, &target())
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(mock.deleted(), vec!["ClusterRole/tidemark-old"]);
    }

    #[tokio::test]
    async fn test_build_metadata_label_matches() {
        let mock = MockClusterClient::new();
        mock.add_owned_object(&ResourceKind::DEPLOYMENTS, Some("tm"), "built", "1.3.0_g42");

        let target = Version::parse("1.3.0+g42").unwrap();
        let deleted = StaleResourceReconciler::new(&mock)
            .sweep(&deployments(), &target)
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_delete_failure_is_fatal() {
        let mock = MockClusterClient::new();
        mock.add_owned_object(&ResourceKind::DEPLOYMENTS, Some("tm"), "old", "1.2.0");
        mock.fail_delete("old");

        let err = StaleResourceReconciler::new(&mock)
            .sweep(&deployments(), &target())
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Transport(_)));
    }

    /// Lists like the mock but every object has vanished by delete time
    struct Vanishing(MockClusterClient);

    #[async_trait::async_trait]
    impl ClusterClient for Vanishing {
        async fn find_installation_namespace(&self) -> Result<Option<String>> {
            self.0.find_installation_namespace().await
        }

        async fn get_config_value(&self, ns: &str, object: &str, key: &str) -> Result<Option<String>> {
            self.0.get_config_value(ns, object, key).await
        }

        async fn get_secret(&self, ns: &str, name: &str) -> Result<Option<ManagedObject>> {
            self.0.get_secret(ns, name).await
        }

        async fn list_objects(
            &self,
            kind: &ResourceKind,
            ns: Option<&str>,
            selector: &str,
        ) -> Result<Vec<ManagedObject>> {
            self.0.list_objects(kind, ns, selector).await
        }

        async fn delete_object(&self, kind: &ResourceKind, _ns: Option<&str>, name: &str) -> Result<()> {
            Err(KubeError::NotFound {
                kind: kind.kind.to_string(),
                name: name.to_string(),
            })
        }

        async fn apply_object(
            &self,
            kind: &ResourceKind,
            ns: Option<&str>,
            manifest: &serde_json::Value,
        ) -> Result<()> {
            self.0.apply_object(kind, ns, manifest).await
        }
    }

    #[tokio::test]
    async fn test_already_deleted_is_success_but_not_counted() {
        let mock = MockClusterClient::new();
        mock.add_owned_object(&ResourceKind::DEPLOYMENTS, Some("tm"), "old", "1.2.0");
        let client = Vanishing(mock);

        let deleted = StaleResourceReconciler::new(&client)
            .sweep(&deployments(), &target())
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let mock = MockClusterClient::new();
        mock.fail_list(&ResourceKind::DEPLOYMENTS);

        let result = StaleResourceReconciler::new(&mock)
            .sweep(&deployments(), &target())
            .await;
        assert!(result.is_err());
        assert_eq!(mock.operation_counts().deletes, 0);
    }
}

//! Mock cluster client for testing
//!
//! This client keeps a tiny in-memory cluster: one installation namespace,
//! ConfigMap values, Secrets and labelled objects per kind. Applied
//! manifests become live objects, so an install followed by a sweep
//! behaves like it would against a real cluster.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tidemark_core::resource::names;
use tidemark_core::{ConfigSpec, ManagedObject, ResourceKind};

use super::ClusterClient;
use crate::error::{KubeError, Result};

/// Object key: (kind plural, namespace, name)
type ObjectKey = (String, Option<String>, String);

#[derive(Default)]
struct MockState {
    namespace: Option<String>,
    config_values: HashMap<(String, String, String), String>,
    secrets: HashMap<(String, String), ManagedObject>,
    objects: BTreeMap<ObjectKey, ManagedObject>,
    applied: Vec<String>,
    deleted: Vec<String>,
    failures: Failures,
}

#[derive(Default)]
struct Failures {
    namespace_lookup: Option<String>,
    config_read: Option<String>,
    secret_probe: Option<String>,
    list: HashSet<String>,
    delete: HashSet<String>,
    apply: HashSet<String>,
}

/// In-memory cluster client for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    state: Arc<RwLock<MockState>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub namespace_lookups: usize,
    pub config_reads: usize,
    pub secret_reads: usize,
    pub lists: usize,
    pub deletes: usize,
    pub applies: usize,
}

impl OperationCounts {
    /// Total number of cluster calls
    pub fn total(&self) -> usize {
        self.reads() + self.mutations()
    }

    /// Calls that only read state
    pub fn reads(&self) -> usize {
        self.namespace_lookups + self.config_reads + self.secret_reads + self.lists
    }

    /// Calls that mutate the cluster
    pub fn mutations(&self) -> usize {
        self.deletes + self.applies
    }
}

fn kind_key(kind: &ResourceKind) -> String {
    kind.to_string()
}

fn object_key(kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ObjectKey {
    (
        kind_key(kind),
        namespace.filter(|_| kind.namespaced).map(String::from),
        name.to_string(),
    )
}

impl MockClusterClient {
    /// Create an empty cluster (no installation)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cluster with an installation at `version` in `namespace`
    ///
    /// The installation has a version record and a default configuration,
    /// but no cloud secret.
    pub fn with_installation(namespace: &str, version: &str) -> Self {
        let mock = Self::new();
        mock.set_installation_namespace(namespace);
        mock.set_config_value(
            namespace,
            names::DEPLOYMENT_CONFIG_MAP,
            names::VERSION_KEY,
            version,
        );
        // ConfigSpec serialization only fails on non-string map keys
        if let Ok(config) = ConfigSpec::default().to_yaml() {
            mock.set_config_value(namespace, names::CONFIG_OBJECT, names::CONFIG_KEY, &config);
        }
        mock
    }

    fn state(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        let mut ops = self.operations.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut ops);
    }

    pub fn set_installation_namespace(&self, namespace: &str) {
        self.state().namespace = Some(namespace.to_string());
    }

    pub fn set_config_value(&self, namespace: &str, object: &str, key: &str, value: &str) {
        self.state().config_values.insert(
            (namespace.to_string(), object.to_string(), key.to_string()),
            value.to_string(),
        );
    }

    pub fn remove_config_value(&self, namespace: &str, object: &str, key: &str) {
        self.state().config_values.remove(&(
            namespace.to_string(),
            object.to_string(),
            key.to_string(),
        ));
    }

    /// Add a Secret (e.g. the cloud secret)
    pub fn add_secret(&self, namespace: &str, name: &str) {
        self.state().secrets.insert(
            (namespace.to_string(), name.to_string()),
            ManagedObject::new(name, Some(namespace)),
        );
    }

    /// Add a live object of `kind`
    pub fn add_object(&self, kind: &ResourceKind, object: ManagedObject) {
        let key = object_key(kind, object.namespace.as_deref(), &object.name);
        self.state().objects.insert(key, object);
    }

    /// Add an owned object tagged with `version`
    pub fn add_owned_object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        version: &str,
    ) {
        self.add_object(kind, ManagedObject::new(name, namespace).owned_at(version));
    }

    /// Live objects of `kind`, regardless of labels
    pub fn objects(&self, kind: &ResourceKind) -> Vec<ManagedObject> {
        let key = kind_key(kind);
        self.read_state()
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == key)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// Find a live object
    pub fn object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<ManagedObject> {
        self.read_state()
            .objects
            .get(&object_key(kind, namespace, name))
            .cloned()
    }

    /// "Kind/name" of every applied object, in order
    pub fn applied(&self) -> Vec<String> {
        self.read_state().applied.clone()
    }

    /// "Kind/name" of every deleted object, in order
    pub fn deleted(&self) -> Vec<String> {
        self.read_state().deleted.clone()
    }

    /// Make the namespace lookup fail with a transport error
    pub fn fail_namespace_lookup(&self, message: &str) {
        self.state().failures.namespace_lookup = Some(message.to_string());
    }

    /// Make ConfigMap reads fail with a transport error
    pub fn fail_config_reads(&self, message: &str) {
        self.state().failures.config_read = Some(message.to_string());
    }

    /// Make Secret reads fail with a transport error
    pub fn fail_secret_probe(&self, message: &str) {
        self.state().failures.secret_probe = Some(message.to_string());
    }

    /// Make listing `kind` fail
    pub fn fail_list(&self, kind: &ResourceKind) {
        self.state().failures.list.insert(kind_key(kind));
    }

    /// Make deleting the object named `name` fail
    pub fn fail_delete(&self, name: &str) {
        self.state().failures.delete.insert(name.to_string());
    }

    /// Make applying the object named `name` fail
    pub fn fail_apply(&self, name: &str) {
        self.state().failures.apply.insert(name.to_string());
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        self.count(|ops| *ops = OperationCounts::default());
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn find_installation_namespace(&self) -> Result<Option<String>> {
        self.count(|ops| ops.namespace_lookups += 1);

        let state = self.read_state();
        if let Some(message) = &state.failures.namespace_lookup {
            return Err(KubeError::Transport(message.clone()));
        }
        Ok(state.namespace.clone())
    }

    async fn get_config_value(
        &self,
        namespace: &str,
        object: &str,
        key: &str,
    ) -> Result<Option<String>> {
        self.count(|ops| ops.config_reads += 1);

        let state = self.read_state();
        if let Some(message) = &state.failures.config_read {
            return Err(KubeError::Transport(message.clone()));
        }
        Ok(state
            .config_values
            .get(&(namespace.to_string(), object.to_string(), key.to_string()))
            .cloned())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<ManagedObject>> {
        self.count(|ops| ops.secret_reads += 1);

        let state = self.read_state();
        if let Some(message) = &state.failures.secret_probe {
            return Err(KubeError::Transport(message.clone()));
        }
        Ok(state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_objects(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<ManagedObject>> {
        self.count(|ops| ops.lists += 1);

        let state = self.read_state();
        let key = kind_key(kind);
        if state.failures.list.contains(&key) {
            return Err(KubeError::Transport(format!("listing {} failed", key)));
        }

        // Only equality selectors ("a=b,c=d") are needed here
        let wanted: Vec<(&str, &str)> = selector
            .split(',')
            .filter_map(|term| term.split_once('='))
            .collect();

        let namespace = namespace.filter(|_| kind.namespaced);
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == key && (namespace.is_none() || ns.as_deref() == namespace))
            .map(|(_, obj)| obj)
            .filter(|obj| {
                wanted
                    .iter()
                    .all(|(k, v)| obj.labels.get(*k).map(String::as_str) == Some(*v))
            })
            .cloned()
            .collect())
    }

    async fn delete_object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        self.count(|ops| ops.deletes += 1);

        let mut state = self.state();
        if state.failures.delete.contains(name) {
            return Err(KubeError::Transport(format!("deleting {} failed", name)));
        }

        match state.objects.remove(&object_key(kind, namespace, name)) {
            Some(_) => {
                state.deleted.push(format!("{}/{}", kind.kind, name));
                Ok(())
            }
            None => Err(KubeError::NotFound {
                kind: kind.kind.to_string(),
                name: name.to_string(),
            }),
        }
    }

    async fn apply_object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        manifest: &serde_json::Value,
    ) -> Result<()> {
        self.count(|ops| ops.applies += 1);

        let metadata = manifest
            .get("metadata")
            .ok_or_else(|| KubeError::InvalidManifest("missing metadata".to_string()))?;
        let name = metadata
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| KubeError::InvalidManifest("missing metadata.name".to_string()))?;
        let object_labels: BTreeMap<String, String> = metadata
            .get("labels")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let mut state = self.state();
        if state.failures.apply.contains(name) {
            return Err(KubeError::Transport(format!("applying {} failed", name)));
        }

        // ConfigMap data is readable through get_config_value afterwards
        if *kind == ResourceKind::CONFIG_MAPS
            && let (Some(ns), Some(data)) = (namespace, manifest.get("data").and_then(|d| d.as_object()))
        {
            for (key, value) in data {
                if let Some(value) = value.as_str() {
                    state.config_values.insert(
                        (ns.to_string(), name.to_string(), key.clone()),
                        value.to_string(),
                    );
                }
            }
        }

        let object = ManagedObject {
            name: name.to_string(),
            namespace: namespace.filter(|_| kind.namespaced).map(String::from),
            labels: object_labels,
        };
        state.objects.insert(object_key(kind, namespace, name), object);
        state.applied.push(format!("{}/{}", kind.kind, name));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::resource::labels;

    #[tokio::test]
    async fn test_installation_fixture() {
        let mock = MockClusterClient::with_installation("tm", "1.2.0");

        assert_eq!(
            mock.find_installation_namespace().await.unwrap(),
            Some("tm".to_string())
        );
        assert_eq!(
            mock.get_config_value("tm", names::DEPLOYMENT_CONFIG_MAP, names::VERSION_KEY)
                .await
                .unwrap(),
            Some("1.2.0".to_string())
        );
        assert!(mock.get_secret("tm", names::CLOUD_SECRET).await.unwrap().is_none());
        assert_eq!(mock.operation_counts().reads(), 3);
    }

    #[tokio::test]
    async fn test_list_filters_by_selector_and_namespace() {
        let mock = MockClusterClient::new();
        mock.add_owned_object(&ResourceKind::DEPLOYMENTS, Some("tm"), "a", "1.2.0");
        mock.add_owned_object(&ResourceKind::DEPLOYMENTS, Some("other"), "b", "1.2.0");
        mock.add_object(&ResourceKind::DEPLOYMENTS, ManagedObject::new("c", Some("tm")));

        let listed = mock
            .list_objects(&ResourceKind::DEPLOYMENTS, Some("tm"), &labels::owned_selector())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a");
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_not_found() {
        let mock = MockClusterClient::new();
        let err = mock
            .delete_object(&ResourceKind::SERVICES, Some("tm"), "ghost")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_apply_makes_config_map_readable() {
        let mock = MockClusterClient::new();
        let manifest = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "tidemark-deployment",
                "labels": { "tidemark.io/version": "1.3.0" }
            },
            "data": { "TIDEMARK_VERSION": "1.3.0" }
        });
        mock.apply_object(&ResourceKind::CONFIG_MAPS, Some("tm"), &manifest)
            .await
            .unwrap();

        assert_eq!(
            mock.get_config_value("tm", "tidemark-deployment", "TIDEMARK_VERSION")
                .await
                .unwrap(),
            Some("1.3.0".to_string())
        );
        let obj = mock
            .object(&ResourceKind::CONFIG_MAPS, Some("tm"), "tidemark-deployment")
            .unwrap();
        assert_eq!(obj.version_tag(), Some("1.3.0"));
        assert_eq!(mock.applied(), vec!["ConfigMap/tidemark-deployment"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let mock = MockClusterClient::with_installation("tm", "1.2.0");
        mock.fail_secret_probe("connection reset");
        let err = mock.get_secret("tm", names::CLOUD_SECRET).await.unwrap_err();
        assert!(!err.is_not_found());
    }
}

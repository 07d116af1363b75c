//! `ClusterClient` backed by a live Kubernetes API server
//!
//! Managed kinds are addressed through the dynamic API so the reconciler
//! can treat every descriptor the same way. Writes use Server-Side Apply,
//! which keeps installers idempotent across re-runs.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::{
    Client, Config,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams},
    config::KubeConfigOptions,
    core::{ApiResource, GroupVersionKind},
};
use tidemark_core::resource::labels;
use tidemark_core::{ManagedObject, ResourceKind};

use super::ClusterClient;
use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "tidemark";

/// Cluster client talking to the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Connect using the default kubeconfig / in-cluster configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Connect using a named kubeconfig context
    pub async fn for_context(context: Option<&str>) -> Result<Self> {
        let Some(context) = context else {
            return Self::try_default().await;
        };

        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        };
        let config = Config::from_kubeconfig(&options)
            .await
            .map_err(|e| KubeError::Transport(format!("invalid kubeconfig context '{}': {}", context, e)))?;
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }

    /// Create with an existing Kubernetes client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying Kubernetes client
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    /// Dynamic API for a managed kind, scoped to `namespace` when given
    fn dynamic_api(&self, kind: &ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(kind.group, kind.version, kind.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, kind.plural);

        match namespace {
            Some(ns) if kind.namespaced => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn to_managed_object(obj: DynamicObject) -> ManagedObject {
    ManagedObject {
        name: obj.metadata.name.unwrap_or_default(),
        namespace: obj.metadata.namespace,
        labels: obj.metadata.labels.unwrap_or_default(),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn find_installation_namespace(&self) -> Result<Option<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let params = ListParams::default().labels(&labels::owned_selector());
        let namespaces = api.list(&params).await?;

        Ok(namespaces
            .items
            .into_iter()
            .find_map(|ns| ns.metadata.name))
    }

    async fn get_config_value(
        &self,
        namespace: &str,
        object: &str,
        key: &str,
    ) -> Result<Option<String>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let config_map = api.get_opt(object).await?;

        Ok(config_map
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(key)))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<ManagedObject>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get_opt(name).await?;

        Ok(secret.map(|s| ManagedObject {
            name: s.metadata.name.unwrap_or_else(|| name.to_string()),
            namespace: s.metadata.namespace,
            labels: s.metadata.labels.unwrap_or_default(),
        }))
    }

    async fn list_objects(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<ManagedObject>> {
        let api = self.dynamic_api(kind, namespace);
        let params = ListParams::default().labels(selector);
        let list = api.list(&params).await?;

        Ok(list.items.into_iter().map(to_managed_object).collect())
    }

    async fn delete_object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let api = self.dynamic_api(kind, namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn apply_object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        manifest: &serde_json::Value,
    ) -> Result<()> {
        let obj: DynamicObject = serde_json::from_value(manifest.clone())?;
        let name = obj.metadata.name.clone().ok_or_else(|| {
            KubeError::InvalidManifest(format!("{} manifest missing metadata.name", kind.kind))
        })?;

        let api = self.dynamic_api(kind, namespace);

        // Take ownership of fields previously written by older releases
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(&obj)).await?;

        Ok(())
    }
}

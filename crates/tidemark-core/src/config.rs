//! Installation configuration
//!
//! Stored as YAML under `config.yaml` in the `tidemark-config` ConfigMap of
//! the installation namespace. Every field is optional so configurations
//! written by older releases keep parsing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Default registry prefix for component images
pub const DEFAULT_IMAGE_PREFIX: &str = "registry.tidemark.io";

/// Installation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    /// Whether anonymous usage telemetry is reported
    #[serde(default)]
    pub telemetry_enabled: bool,

    /// Registry prefix for component images
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,

    /// Namespaces never instrumented
    #[serde(default = "default_ignored_namespaces")]
    pub ignored_namespaces: Vec<String>,

    /// Container names never instrumented
    #[serde(default)]
    pub ignored_containers: Vec<String>,

    /// Default SDK per language
    #[serde(default)]
    pub default_sdks: BTreeMap<String, String>,

    /// Whether the node agent runs with a pod security policy
    #[serde(default)]
    pub psp: bool,

    /// Replica count for the autoscaled collector
    #[serde(default = "default_collector_replicas")]
    pub collector_replicas: u32,
}

fn default_image_prefix() -> String {
    DEFAULT_IMAGE_PREFIX.to_string()
}

fn default_ignored_namespaces() -> Vec<String> {
    vec!["kube-system".to_string()]
}

fn default_collector_replicas() -> u32 {
    1
}

impl Default for ConfigSpec {
    fn default() -> Self {
        Self {
            telemetry_enabled: false,
            image_prefix: default_image_prefix(),
            ignored_namespaces: default_ignored_namespaces(),
            ignored_containers: Vec::new(),
            default_sdks: BTreeMap::new(),
            psp: false,
            collector_replicas: default_collector_replicas(),
        }
    }
}

impl ConfigSpec {
    /// Parse from the YAML stored in the cluster
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Serialize for storage in the cluster
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Fully-qualified image reference for a component at `version`
    pub fn image(&self, component: &str, version: &str) -> String {
        let prefix = self.image_prefix.trim_end_matches('/');
        format!("{}/{}:v{}", prefix, component, version.trim_start_matches('v'))
    }
}

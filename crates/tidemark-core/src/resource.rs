//! Managed resource kinds and the ownership marker
//!
//! Every object Tidemark writes carries two labels: one marking it as a
//! system object and one recording the version that last wrote it. The
//! reconciler compares the latter against the target version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ownership marker labels
pub mod labels {
    /// Marks an object (or the installation namespace) as owned by Tidemark
    pub const SYSTEM_OBJECT: &str = "tidemark.io/system-object";
    /// Value of [`SYSTEM_OBJECT`] on owned objects
    pub const SYSTEM_OBJECT_VALUE: &str = "true";
    /// Version that created or last updated the object
    pub const VERSION: &str = "tidemark.io/version";
    /// Component the object belongs to (informational)
    pub const COMPONENT: &str = "tidemark.io/component";

    /// Label selector matching every owned object
    pub fn owned_selector() -> String {
        format!("{}={}", SYSTEM_OBJECT, SYSTEM_OBJECT_VALUE)
    }

    /// Value of [`VERSION`] for `version`
    ///
    /// Label values cannot contain `+`, so build metadata is joined with `_`.
    pub fn version_value(version: &semver::Version) -> String {
        version.to_string().replace('+', "_")
    }
}

/// Well-known object names inside the installation namespace
pub mod names {
    /// ConfigMap holding the recorded installation version
    pub const DEPLOYMENT_CONFIG_MAP: &str = "tidemark-deployment";
    /// Key of the recorded version inside [`DEPLOYMENT_CONFIG_MAP`]
    pub const VERSION_KEY: &str = "TIDEMARK_VERSION";
    /// ConfigMap holding the installation configuration
    pub const CONFIG_OBJECT: &str = "tidemark-config";
    /// Key of the serialized configuration inside [`CONFIG_OBJECT`]
    pub const CONFIG_KEY: &str = "config.yaml";
    /// Secret whose presence enables cloud mode
    pub const CLOUD_SECRET: &str = "tidemark-cloud-proxy";
}

/// A Kubernetes resource type addressed through the dynamic API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    /// API group ("" for the core group)
    pub group: &'static str,
    /// API version
    pub version: &'static str,
    /// Kind name
    pub kind: &'static str,
    /// Plural resource name
    pub plural: &'static str,
    /// Whether objects of this kind live in a namespace
    pub namespaced: bool,
}

impl ResourceKind {
    pub const DEPLOYMENTS: Self = Self::new("apps", "v1", "Deployment", "deployments", true);
    pub const DAEMON_SETS: Self = Self::new("apps", "v1", "DaemonSet", "daemonsets", true);
    pub const CONFIG_MAPS: Self = Self::new("", "v1", "ConfigMap", "configmaps", true);
    pub const SERVICES: Self = Self::new("", "v1", "Service", "services", true);
    pub const SERVICE_ACCOUNTS: Self =
        Self::new("", "v1", "ServiceAccount", "serviceaccounts", true);
    pub const SECRETS: Self = Self::new("", "v1", "Secret", "secrets", true);
    pub const CLUSTER_ROLES: Self = Self::new(
        "rbac.authorization.k8s.io",
        "v1",
        "ClusterRole",
        "clusterroles",
        false,
    );
    pub const CLUSTER_ROLE_BINDINGS: Self = Self::new(
        "rbac.authorization.k8s.io",
        "v1",
        "ClusterRoleBinding",
        "clusterrolebindings",
        false,
    );
    pub const ROLES: Self = Self::new("rbac.authorization.k8s.io", "v1", "Role", "roles", true);
    pub const ROLE_BINDINGS: Self = Self::new(
        "rbac.authorization.k8s.io",
        "v1",
        "RoleBinding",
        "rolebindings",
        true,
    );

    pub const fn new(
        group: &'static str,
        version: &'static str,
        kind: &'static str,
        plural: &'static str,
        namespaced: bool,
    ) -> Self {
        Self {
            group,
            version,
            kind,
            plural,
            namespaced,
        }
    }

    /// `apiVersion` as written in manifests ("apps/v1", or "v1" for core)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.plural)
        } else {
            write!(f, "{}.{}", self.plural, self.group)
        }
    }
}

/// One (kind, namespace) bucket of objects owned by Tidemark
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedResourceDescriptor {
    pub kind: ResourceKind,
    /// Absent for cluster-scoped kinds
    pub namespace: Option<String>,
}

impl ManagedResourceDescriptor {
    pub fn namespaced(kind: ResourceKind, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
        }
    }

    pub fn cluster_scoped(kind: ResourceKind) -> Self {
        Self {
            kind,
            namespace: None,
        }
    }
}

impl fmt::Display for ManagedResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} in {}", self.kind, ns),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// The fixed set of buckets the reconciler sweeps
///
/// This is metadata of the system, not cluster state: kinds are never
/// discovered at runtime.
pub fn managed_resources(namespace: &str) -> Vec<ManagedResourceDescriptor> {
    vec![
        ManagedResourceDescriptor::namespaced(ResourceKind::DEPLOYMENTS, namespace),
        ManagedResourceDescriptor::namespaced(ResourceKind::DAEMON_SETS, namespace),
        ManagedResourceDescriptor::namespaced(ResourceKind::CONFIG_MAPS, namespace),
        ManagedResourceDescriptor::namespaced(ResourceKind::SERVICES, namespace),
        ManagedResourceDescriptor::cluster_scoped(ResourceKind::CLUSTER_ROLES),
        ManagedResourceDescriptor::cluster_scoped(ResourceKind::CLUSTER_ROLE_BINDINGS),
        ManagedResourceDescriptor::namespaced(ResourceKind::ROLES, namespace),
        ManagedResourceDescriptor::namespaced(ResourceKind::ROLE_BINDINGS, namespace),
    ]
}

/// A live object as listed from the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedObject {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ManagedObject {
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(String::from),
            labels: BTreeMap::new(),
        }
    }

    /// Builder: add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Builder: stamp the ownership marker for `version`
    pub fn owned_at(self, version: impl Into<String>) -> Self {
        self.with_label(labels::SYSTEM_OBJECT, labels::SYSTEM_OBJECT_VALUE)
            .with_label(labels::VERSION, version)
    }

    /// Whether the object carries the ownership marker
    pub fn is_owned(&self) -> bool {
        self.labels.get(labels::SYSTEM_OBJECT).map(String::as_str)
            == Some(labels::SYSTEM_OBJECT_VALUE)
    }

    /// Version recorded on the object, if any
    pub fn version_tag(&self) -> Option<&str> {
        self.labels.get(labels::VERSION).map(String::as_str)
    }

    /// Display key ("namespace/name" or "name")
    pub fn key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

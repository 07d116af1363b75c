//! Typed object builders
//!
//! Objects are built with k8s-openapi types and serialized into manifests,
//! so `apiVersion` and `kind` always match the Rust type.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Service,
    ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use serde_json::Value;
use tidemark_core::ResourceKind;
use tidemark_core::resource::labels;

use super::InstallContext;
use super::builtin::{WorkloadKind, WorkloadSpec};
use crate::error::Result;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const APP_NAME_LABEL: &str = "app.kubernetes.io/name";
const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";

/// A generated object ready to be applied
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub kind: ResourceKind,
    /// Absent for cluster-scoped kinds
    pub namespace: Option<String>,
    pub body: Value,
}

impl Manifest {
    /// Serialize a typed object
    pub fn from_object<K: Serialize>(
        kind: ResourceKind,
        namespace: Option<&str>,
        object: &K,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            namespace: namespace.filter(|_| kind.namespaced).map(String::from),
            body: serde_json::to_value(object)?,
        })
    }

    /// `metadata.name`
    pub fn name(&self) -> &str {
        self.body
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// A label from `metadata.labels`
    pub fn label(&self, key: &str) -> Option<&str> {
        self.body
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.get(key))
            .and_then(Value::as_str)
    }
}

/// Name shared by a component's ServiceAccount, ClusterRole and binding
pub(crate) fn component_object_name(component: &str) -> String {
    format!("tidemark-{}", component)
}

fn selector_labels(component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_NAME_LABEL.to_string(), component.to_string()),
        (PART_OF_LABEL.to_string(), "tidemark".to_string()),
    ])
}

/// Metadata carrying the ownership marker for the target version
fn metadata(ctx: &InstallContext, name: &str, component: &str, namespaced: bool) -> ObjectMeta {
    let mut object_labels = selector_labels(component);
    object_labels.insert(
        labels::SYSTEM_OBJECT.to_string(),
        labels::SYSTEM_OBJECT_VALUE.to_string(),
    );
    object_labels.insert(labels::VERSION.to_string(), ctx.version_label());
    object_labels.insert(labels::COMPONENT.to_string(), component.to_string());

    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespaced.then(|| ctx.namespace.clone()),
        labels: Some(object_labels),
        ..Default::default()
    }
}

pub(crate) fn config_map(
    ctx: &InstallContext,
    name: &str,
    component: &str,
    data: BTreeMap<String, String>,
) -> Result<Manifest> {
    let object = ConfigMap {
        metadata: metadata(ctx, name, component, true),
        data: Some(data),
        ..Default::default()
    };
    Manifest::from_object(ResourceKind::CONFIG_MAPS, Some(&ctx.namespace), &object)
}

pub(crate) fn service_account(ctx: &InstallContext, component: &str) -> Result<Manifest> {
    let object = ServiceAccount {
        metadata: metadata(ctx, &component_object_name(component), component, true),
        ..Default::default()
    };
    Manifest::from_object(ResourceKind::SERVICE_ACCOUNTS, Some(&ctx.namespace), &object)
}

fn subject(ctx: &InstallContext, component: &str) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: component_object_name(component),
        namespace: Some(ctx.namespace.clone()),
        ..Default::default()
    }
}

pub(crate) fn cluster_role(
    ctx: &InstallContext,
    component: &str,
    rules: Vec<PolicyRule>,
) -> Result<Manifest> {
    let object = ClusterRole {
        metadata: metadata(ctx, &component_object_name(component), component, false),
        rules: Some(rules),
        ..Default::default()
    };
    Manifest::from_object(ResourceKind::CLUSTER_ROLES, None, &object)
}

pub(crate) fn cluster_role_binding(ctx: &InstallContext, component: &str) -> Result<Manifest> {
    let name = component_object_name(component);
    let object = ClusterRoleBinding {
        metadata: metadata(ctx, &name, component, false),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name,
        },
        subjects: Some(vec![subject(ctx, component)]),
    };
    Manifest::from_object(ResourceKind::CLUSTER_ROLE_BINDINGS, None, &object)
}

pub(crate) fn role(
    ctx: &InstallContext,
    name: &str,
    component: &str,
    rules: Vec<PolicyRule>,
) -> Result<Manifest> {
    let object = Role {
        metadata: metadata(ctx, name, component, true),
        rules: Some(rules),
    };
    Manifest::from_object(ResourceKind::ROLES, Some(&ctx.namespace), &object)
}

/// Bind the namespaced role `name` to the service accounts of `components`
pub(crate) fn role_binding(
    ctx: &InstallContext,
    name: &str,
    component: &str,
    components: &[&str],
) -> Result<Manifest> {
    let object = RoleBinding {
        metadata: metadata(ctx, name, component, true),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: name.to_string(),
        },
        subjects: Some(components.iter().map(|c| subject(ctx, c)).collect()),
    };
    Manifest::from_object(ResourceKind::ROLE_BINDINGS, Some(&ctx.namespace), &object)
}

/// One rule granting `verbs` on `resources` of `group`
pub(crate) fn rule(group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

fn pod_template(ctx: &InstallContext, spec: &WorkloadSpec) -> PodTemplateSpec {
    let version = ctx.version_label();
    let env = spec
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();

    let container = Container {
        name: spec.component.to_string(),
        image: Some(ctx.config.image(spec.component, &version)),
        args: (!spec.args.is_empty()).then(|| spec.args.clone()),
        env: Some(env),
        ports: spec.port.map(|port| {
            vec![ContainerPort {
                name: Some("http".to_string()),
                container_port: port,
                ..Default::default()
            }]
        }),
        ..Default::default()
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(selector_labels(spec.component)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            service_account_name: Some(component_object_name(spec.component)),
            ..Default::default()
        }),
    }
}

fn label_selector(component: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(selector_labels(component)),
        ..Default::default()
    }
}

/// Deployment or DaemonSet for a workload
pub(crate) fn workload(ctx: &InstallContext, spec: &WorkloadSpec) -> Result<Manifest> {
    let meta = metadata(ctx, &component_object_name(spec.component), spec.component, true);
    let template = pod_template(ctx, spec);
    let selector = label_selector(spec.component);

    match spec.kind {
        WorkloadKind::Deployment => {
            let object = Deployment {
                metadata: meta,
                spec: Some(DeploymentSpec {
                    replicas: Some(spec.replicas),
                    selector,
                    template,
                    ..Default::default()
                }),
                ..Default::default()
            };
            Manifest::from_object(ResourceKind::DEPLOYMENTS, Some(&ctx.namespace), &object)
        }
        WorkloadKind::DaemonSet => {
            let object = DaemonSet {
                metadata: meta,
                spec: Some(DaemonSetSpec {
                    selector,
                    template,
                    ..Default::default()
                }),
                ..Default::default()
            };
            Manifest::from_object(ResourceKind::DAEMON_SETS, Some(&ctx.namespace), &object)
        }
    }
}

/// ClusterIP Service in front of a workload port
pub(crate) fn service(ctx: &InstallContext, component: &str, port: i32) -> Result<Manifest> {
    let object = Service {
        metadata: metadata(ctx, &component_object_name(component), component, true),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(component)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    Manifest::from_object(ResourceKind::SERVICES, Some(&ctx.namespace), &object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn ctx() -> InstallContext {
        InstallContext::new("tm", Version::new(1, 3, 0))
    }

    #[test]
    fn test_config_map_manifest() {
        let data = BTreeMap::from([("k".to_string(), "v".to_string())]);
        let manifest = config_map(&ctx(), "tidemark-test", "test", data).unwrap();

        assert_eq!(manifest.name(), "tidemark-test");
        assert_eq!(manifest.namespace.as_deref(), Some("tm"));
        assert_eq!(manifest.body["apiVersion"], "v1");
        assert_eq!(manifest.body["kind"], "ConfigMap");
        assert_eq!(manifest.body["data"]["k"], "v");
        assert_eq!(manifest.label(labels::SYSTEM_OBJECT), Some("true"));
        assert_eq!(manifest.label(labels::VERSION), Some("1.3.0"));
        assert_eq!(manifest.label(labels::COMPONENT), Some("test"));
    }

    #[test]
    fn test_cluster_scoped_manifest_has_no_namespace() {
        let manifest = cluster_role(&ctx(), "scheduler", vec![rule("", &["pods"], &["get"])])
            .unwrap();
        assert_eq!(manifest.namespace, None);
        assert!(manifest.body["metadata"].get("namespace").is_none());
        assert_eq!(manifest.body["rules"][0]["resources"][0], "pods");

        let binding = cluster_role_binding(&ctx(), "scheduler").unwrap();
        assert_eq!(binding.body["roleRef"]["name"], "tidemark-scheduler");
        assert_eq!(binding.body["subjects"][0]["namespace"], "tm");
    }

    #[test]
    fn test_service_targets_workload_port() {
        let manifest = service(&ctx(), "autoscaler", 8080).unwrap();
        assert_eq!(manifest.body["spec"]["ports"][0]["targetPort"], 8080);
        assert_eq!(
            manifest.body["spec"]["selector"][APP_NAME_LABEL],
            "autoscaler"
        );
    }
}

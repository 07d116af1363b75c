//! Built-in resource managers

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::PolicyRule;
use tidemark_core::resource::names;

use super::objects::{self, Manifest, rule};
use super::{InstallContext, ResourceManager, apply_all};
use crate::cluster::ClusterClient;
use crate::error::Result;

/// Components that run as workloads, in installation order
pub const COMPONENTS: &[&str] = &[
    "instrumentor",
    "scheduler",
    "node-agent",
    "autoscaler",
    "cloud-proxy",
];

const CLOUD_PROXY: &str = "cloud-proxy";
const LEADER_ELECTION_ROLE: &str = "tidemark-leader-election";

const READ: &[&str] = &["get", "list", "watch"];

/// Records the installed version in the deployment ConfigMap
pub struct DeploymentRecordManager {
    ctx: InstallContext,
}

impl DeploymentRecordManager {
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    fn manifests(&self) -> Result<Vec<Manifest>> {
        let data = BTreeMap::from([
            (
                names::VERSION_KEY.to_string(),
                self.ctx.target_version.to_string(),
            ),
            ("INSTALLATION_METHOD".to_string(), "tidemark-cli".to_string()),
        ]);
        Ok(vec![objects::config_map(
            &self.ctx,
            names::DEPLOYMENT_CONFIG_MAP,
            "deployment",
            data,
        )?])
    }
}

#[async_trait]
impl ResourceManager for DeploymentRecordManager {
    fn name(&self) -> &str {
        "deployment"
    }

    async fn install_from_scratch(&self, client: &dyn ClusterClient) -> Result<()> {
        apply_all(client, self.name(), &self.manifests()?).await
    }
}

/// Writes the installation configuration back in the current schema
pub struct ConfigManager {
    ctx: InstallContext,
}

impl ConfigManager {
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    fn manifests(&self) -> Result<Vec<Manifest>> {
        let data = BTreeMap::from([(names::CONFIG_KEY.to_string(), self.ctx.config.to_yaml()?)]);
        Ok(vec![objects::config_map(
            &self.ctx,
            names::CONFIG_OBJECT,
            "config",
            data,
        )?])
    }
}

#[async_trait]
impl ResourceManager for ConfigManager {
    fn name(&self) -> &str {
        "config"
    }

    async fn install_from_scratch(&self, client: &dyn ClusterClient) -> Result<()> {
        apply_all(client, self.name(), &self.manifests()?).await
    }
}

/// ServiceAccounts and RBAC for every component
pub struct RbacManager {
    ctx: InstallContext,
}

impl RbacManager {
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    /// Components that get an identity in this run
    fn components(&self) -> Vec<&'static str> {
        COMPONENTS
            .iter()
            .copied()
            .filter(|c| *c != CLOUD_PROXY || self.ctx.cloud_mode_enabled)
            .collect()
    }

    fn cluster_rules(&self, component: &str) -> Vec<PolicyRule> {
        let mut rules = match component {
            "instrumentor" => vec![
                rule("", &["pods", "namespaces"], READ),
                rule(
                    "apps",
                    &["deployments", "daemonsets", "statefulsets"],
                    &["get", "list", "watch", "patch", "update"],
                ),
            ],
            "scheduler" => vec![rule("", &["namespaces", "configmaps"], READ)],
            "node-agent" => vec![rule("", &["pods", "nodes"], READ)],
            "autoscaler" => vec![
                rule("", &["services", "configmaps"], &["get", "list", "watch", "create", "update"]),
                rule("apps", &["deployments"], &["get", "list", "watch", "update"]),
            ],
            CLOUD_PROXY => vec![
                rule("", &["namespaces", "pods"], READ),
                rule("apps", &["deployments", "daemonsets"], READ),
            ],
            _ => Vec::new(),
        };

        if self.ctx.config.psp && component == "node-agent" {
            rules.push(rule("policy", &["podsecuritypolicies"], &["use"]));
        }
        rules
    }

    fn manifests(&self) -> Result<Vec<Manifest>> {
        let components = self.components();
        let mut manifests = Vec::with_capacity(components.len() * 3 + 2);

        for component in &components {
            manifests.push(objects::service_account(&self.ctx, component)?);
            manifests.push(objects::cluster_role(
                &self.ctx,
                component,
                self.cluster_rules(component),
            )?);
            manifests.push(objects::cluster_role_binding(&self.ctx, component)?);
        }

        let leader_election = vec![
            rule("coordination.k8s.io", &["leases"], &["get", "list", "watch", "create", "update"]),
            rule("", &["configmaps"], READ),
        ];
        manifests.push(objects::role(
            &self.ctx,
            LEADER_ELECTION_ROLE,
            "rbac",
            leader_election,
        )?);
        manifests.push(objects::role_binding(
            &self.ctx,
            LEADER_ELECTION_ROLE,
            "rbac",
            &components,
        )?);

        Ok(manifests)
    }
}

#[async_trait]
impl ResourceManager for RbacManager {
    fn name(&self) -> &str {
        "rbac"
    }

    async fn install_from_scratch(&self, client: &dyn ClusterClient) -> Result<()> {
        apply_all(client, self.name(), &self.manifests()?).await
    }
}

/// How a component runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
}

/// Shape of one component's workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub component: &'static str,
    pub kind: WorkloadKind,
    pub replicas: i32,
    /// Port exposed through a Service
    pub port: Option<i32>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl WorkloadSpec {
    /// Workload for a known component, derived from the run's configuration
    pub fn for_component(component: &str, ctx: &InstallContext) -> Option<Self> {
        let config = &ctx.config;
        let (component, kind, port, args) = match component {
            "instrumentor" => {
                let mut args = Vec::new();
                if !config.ignored_namespaces.is_empty() {
                    args.push(format!(
                        "--ignored-namespaces={}",
                        config.ignored_namespaces.join(",")
                    ));
                }
                args.extend(
                    config
                        .default_sdks
                        .iter()
                        .map(|(language, sdk)| format!("--default-sdk={}={}", language, sdk)),
                );
                ("instrumentor", WorkloadKind::Deployment, None, args)
            }
            "scheduler" => ("scheduler", WorkloadKind::Deployment, None, Vec::new()),
            "node-agent" => {
                let args = if config.ignored_containers.is_empty() {
                    Vec::new()
                } else {
                    vec![format!(
                        "--ignored-containers={}",
                        config.ignored_containers.join(",")
                    )]
                };
                ("node-agent", WorkloadKind::DaemonSet, None, args)
            }
            "autoscaler" => (
                "autoscaler",
                WorkloadKind::Deployment,
                Some(8080),
                vec![format!("--collector-replicas={}", config.collector_replicas)],
            ),
            CLOUD_PROXY => (
                CLOUD_PROXY,
                WorkloadKind::Deployment,
                Some(8443),
                vec![format!("--secret-name={}", names::CLOUD_SECRET)],
            ),
            _ => return None,
        };

        let env = BTreeMap::from([
            ("TIDEMARK_NAMESPACE".to_string(), ctx.namespace.clone()),
            (
                names::VERSION_KEY.to_string(),
                ctx.target_version.to_string(),
            ),
            (
                "TIDEMARK_TELEMETRY_ENABLED".to_string(),
                config.telemetry_enabled.to_string(),
            ),
        ]);

        Some(Self {
            component,
            kind,
            replicas: 1,
            port,
            args,
            env,
        })
    }
}

/// Installs one component's workload and its Service
pub struct WorkloadManager {
    ctx: InstallContext,
    spec: WorkloadSpec,
}

impl WorkloadManager {
    pub fn new(ctx: InstallContext, spec: WorkloadSpec) -> Self {
        Self { ctx, spec }
    }

    pub fn spec(&self) -> &WorkloadSpec {
        &self.spec
    }

    fn manifests(&self) -> Result<Vec<Manifest>> {
        let mut manifests = vec![objects::workload(&self.ctx, &self.spec)?];
        if let Some(port) = self.spec.port {
            manifests.push(objects::service(&self.ctx, self.spec.component, port)?);
        }
        Ok(manifests)
    }
}

#[async_trait]
impl ResourceManager for WorkloadManager {
    fn name(&self) -> &str {
        self.spec.component
    }

    async fn install_from_scratch(&self, client: &dyn ClusterClient) -> Result<()> {
        apply_all(client, self.name(), &self.manifests()?).await
    }
}

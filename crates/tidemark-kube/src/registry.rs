//! Resource manager registry
//!
//! The installation order is derived from explicit dependencies rather than
//! from the position of an entry in a list. Entries are sorted with Kahn's
//! algorithm; when several entries are ready at once, the one registered
//! first wins, so the order is fully deterministic.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{KubeError, Result};
use crate::managers::{
    COMPONENTS, ConfigManager, DeploymentRecordManager, InstallContext, RbacManager,
    ResourceManager, WorkloadManager, WorkloadSpec,
};

/// Builds a manager for one run
pub type ManagerConstructor =
    Arc<dyn Fn(&InstallContext) -> Result<Box<dyn ResourceManager>> + Send + Sync>;

/// Decides whether an entry takes part in a run
pub type ManagerCondition = Arc<dyn Fn(&InstallContext) -> bool + Send + Sync>;

#[derive(Clone)]
struct RegistryEntry {
    name: String,
    depends_on: Vec<String>,
    condition: ManagerCondition,
    constructor: ManagerConstructor,
}

/// Catalog of resource managers and their dependencies
#[derive(Clone, Default)]
pub struct ManagerRegistry {
    entries: Vec<RegistryEntry>,
}

impl fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.name, &e.depends_on)))
            .finish()
    }
}

impl ManagerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manager that always takes part
    pub fn register<F>(&mut self, name: &str, depends_on: &[&str], constructor: F) -> &mut Self
    where
        F: Fn(&InstallContext) -> Result<Box<dyn ResourceManager>> + Send + Sync + 'static,
    {
        self.register_when(name, depends_on, |_| true, constructor)
    }

    /// Register a manager that only takes part when `condition` holds
    pub fn register_when<P, F>(
        &mut self,
        name: &str,
        depends_on: &[&str],
        condition: P,
        constructor: F,
    ) -> &mut Self
    where
        P: Fn(&InstallContext) -> bool + Send + Sync + 'static,
        F: Fn(&InstallContext) -> Result<Box<dyn ResourceManager>> + Send + Sync + 'static,
    {
        self.entries.push(RegistryEntry {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            condition: Arc::new(condition),
            constructor: Arc::new(constructor),
        });
        self
    }

    /// The catalog shipped with Tidemark
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("deployment", &[], |ctx| {
                Ok(Box::new(DeploymentRecordManager::new(ctx.clone())))
            })
            .register("config", &[], |ctx| Ok(Box::new(ConfigManager::new(ctx.clone()))))
            .register("rbac", &["deployment"], |ctx| {
                Ok(Box::new(RbacManager::new(ctx.clone())))
            });

        for &component in COMPONENTS {
            let depends_on: &[&str] = match component {
                "node-agent" => &["rbac", "config", "instrumentor"],
                _ => &["rbac", "config"],
            };
            registry.register_when(
                component,
                depends_on,
                move |ctx| component != "cloud-proxy" || ctx.cloud_mode_enabled,
                move |ctx| workload_manager(component, ctx),
            );
        }

        registry
    }

    /// Registered names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the managers that take part in a run, in installation order
    pub fn plan(&self, ctx: &InstallContext) -> Result<Vec<&str>> {
        Ok(self
            .resolve(ctx)?
            .into_iter()
            .map(|i| self.entries[i].name.as_str())
            .collect())
    }

    /// Construct the managers for a run, in installation order
    pub fn build(&self, ctx: &InstallContext) -> Result<Vec<Box<dyn ResourceManager>>> {
        self.resolve(ctx)?
            .into_iter()
            .map(|i| (self.entries[i].constructor)(ctx))
            .collect()
    }

    /// Entry indices in installation order
    fn resolve(&self, ctx: &InstallContext) -> Result<Vec<usize>> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            if index.insert(entry.name.as_str(), i).is_some() {
                return Err(KubeError::DuplicateManager(entry.name.clone()));
            }
        }

        // Unknown names are errors even on excluded entries
        for entry in &self.entries {
            if let Some(dependency) = entry
                .depends_on
                .iter()
                .find(|d| !index.contains_key(d.as_str()))
            {
                return Err(KubeError::UnknownDependency {
                    manager: entry.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let included: Vec<bool> = self.entries.iter().map(|e| (e.condition)(ctx)).collect();
        let mut in_degree = vec![0usize; self.entries.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.entries.len()];

        for (i, entry) in self.entries.iter().enumerate() {
            if !included[i] {
                continue;
            }
            for dependency in &entry.depends_on {
                let d = index[dependency.as_str()];
                // Dependencies on excluded entries are ignored
                if included[d] {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.entries.len())
            .filter(|&i| included[i] && in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.entries.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &j in &dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        let expected = included.iter().filter(|&&inc| inc).count();
        if order.len() < expected {
            let managers = (0..self.entries.len())
                .filter(|&i| included[i] && in_degree[i] > 0)
                .map(|i| self.entries[i].name.clone())
                .collect();
            return Err(KubeError::DependencyCycle { managers });
        }

        Ok(order)
    }
}

fn workload_manager(component: &str, ctx: &InstallContext) -> Result<Box<dyn ResourceManager>> {
    let spec = WorkloadSpec::for_component(component, ctx).ok_or_else(|| {
        KubeError::InvalidManifest(format!("no workload defined for component '{}'", component))
    })?;
    Ok(Box::new(WorkloadManager::new(ctx.clone(), spec)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterClient;
    use async_trait::async_trait;
    use semver::Version;

    struct Named(String);

    #[async_trait]
    impl ResourceManager for Named {
        fn name(&self) -> &str {
            &self.0
        }

        async fn install_from_scratch(&self, _client: &dyn ClusterClient) -> Result<()> {
            Ok(())
        }
    }

    fn named(
        name: &'static str,
    ) -> impl Fn(&InstallContext) -> Result<Box<dyn ResourceManager>> + Send + Sync + 'static {
        move |_| Ok(Box::new(Named(name.to_string())))
    }

    fn ctx(cloud: bool) -> InstallContext {
        InstallContext::new("tm", Version::new(1, 3, 0)).with_cloud_mode(cloud)
    }

    #[test]
    fn test_builtin_order() {
        let registry = ManagerRegistry::builtin();
        let order = registry.plan(&ctx(false)).unwrap();
        insta::assert_yaml_snapshot!(order, @r"
        - deployment
        - config
        - rbac
        - instrumentor
        - scheduler
        - node-agent
        - autoscaler
        ");
    }

    #[test]
    fn test_cloud_proxy_only_in_cloud_mode() {
        let registry = ManagerRegistry::builtin();
        assert!(!registry.plan(&ctx(false)).unwrap().contains(&"cloud-proxy"));
        assert_eq!(registry.plan(&ctx(true)).unwrap().last(), Some(&"cloud-proxy"));

        let managers = registry.build(&ctx(true)).unwrap();
        let names: Vec<&str> = managers.iter().map(|m| m.name()).collect();
        assert_eq!(names, registry.plan(&ctx(true)).unwrap());
    }

    #[test]
    fn test_build_is_deterministic() {
        let registry = ManagerRegistry::builtin();
        let first = registry.plan(&ctx(true)).unwrap();
        for _ in 0..10 {
            assert_eq!(registry.plan(&ctx(true)).unwrap(), first);
        }
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let mut registry = ManagerRegistry::new();
        registry
            .register("c", &["b"], named("c"))
            .register("a", &[], named("a"))
            .register("b", &["a"], named("b"))
            .register("d", &[], named("d"));

        assert_eq!(registry.plan(&ctx(false)).unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_ties_follow_registration_order() {
        let mut registry = ManagerRegistry::new();
        registry
            .register("z", &[], named("z"))
            .register("m", &[], named("m"))
            .register("a", &[], named("a"));

        assert_eq!(registry.plan(&ctx(false)).unwrap(), vec!["z", "m", "a"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let mut registry = ManagerRegistry::new();
        registry.register("a", &["ghost"], named("a"));

        let err = registry.plan(&ctx(false)).unwrap_err();
        assert!(matches!(
            err,
            KubeError::UnknownDependency { manager, dependency } if manager == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let mut registry = ManagerRegistry::new();
        registry
            .register("root", &[], named("root"))
            .register("a", &["b"], named("a"))
            .register("b", &["a"], named("b"));

        match registry.build(&ctx(false)) {
            Err(KubeError::DependencyCycle { managers }) => assert_eq!(managers, vec!["a", "b"]),
            other => panic!("expected a cycle, got {:?}", other.map(|m| m.len())),
        }
    }

    #[test]
    fn test_duplicate_name() {
        let mut registry = ManagerRegistry::new();
        registry
            .register("a", &[], named("a"))
            .register("a", &[], named("a"));
        assert!(matches!(
            registry.plan(&ctx(false)),
            Err(KubeError::DuplicateManager(name)) if name == "a"
        ));
    }

    #[test]
    fn test_excluded_dependency_is_ignored() {
        let mut registry = ManagerRegistry::new();
        registry
            .register_when("optional", &[], |ctx| ctx.cloud_mode_enabled, named("optional"))
            .register("after", &["optional"], named("after"));

        assert_eq!(registry.plan(&ctx(false)).unwrap(), vec!["after"]);
        assert_eq!(registry.plan(&ctx(true)).unwrap(), vec!["optional", "after"]);
    }

    #[test]
    fn test_constructor_failure_surfaces() {
        let mut registry = ManagerRegistry::new();
        registry.register("broken", &[], |_| {
            Err(KubeError::InvalidManifest("bad template".to_string()))
        });
        assert!(matches!(
            registry.build(&ctx(false)),
            Err(KubeError::InvalidManifest(_))
        ));
    }
}

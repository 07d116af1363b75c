//! Reading the recorded installation state
//!
//! The reader is split in two halves so the executor can run the version
//! gate as soon as the version record is known: an incompatible source
//! version then costs no further cluster calls.

use semver::Version;
use tidemark_core::resource::names;
use tidemark_core::{ClusterRecordedState, ConfigSpec, parse_version};

use crate::cluster::ClusterClient;
use crate::error::{KubeError, Result};

/// Installation namespace and the version recorded in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedVersion {
    pub namespace: String,
    pub version: Version,
}

/// Single-shot reader of the recorded cluster state
pub struct ClusterStateReader<'a> {
    client: &'a dyn ClusterClient,
}

impl<'a> ClusterStateReader<'a> {
    pub fn new(client: &'a dyn ClusterClient) -> Self {
        Self { client }
    }

    /// Read the full state in one go
    pub async fn read(&self) -> Result<ClusterRecordedState> {
        let recorded = self.read_version().await?;
        self.complete(recorded).await
    }

    /// Locate the installation and read its version record
    pub async fn read_version(&self) -> Result<RecordedVersion> {
        let namespace = self
            .client
            .find_installation_namespace()
            .await?
            .ok_or(KubeError::NamespaceNotFound)?;

        let raw = self
            .client
            .get_config_value(&namespace, names::DEPLOYMENT_CONFIG_MAP, names::VERSION_KEY)
            .await?
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| KubeError::VersionRecordMissing {
                namespace: namespace.clone(),
            })?;

        let version = parse_version(&raw)?;
        tracing::debug!(%namespace, %version, "read recorded version");

        Ok(RecordedVersion { namespace, version })
    }

    /// Read the rest of the state for an already located installation
    pub async fn complete(&self, recorded: RecordedVersion) -> Result<ClusterRecordedState> {
        let cloud_mode_enabled = self.read_cloud_mode(&recorded.namespace).await?;
        let configuration = self.read_configuration(&recorded.namespace).await?;

        Ok(ClusterRecordedState {
            namespace: recorded.namespace,
            current_version: recorded.version,
            cloud_mode_enabled,
            configuration,
        })
    }

    /// Cloud mode is enabled when the cloud secret exists
    ///
    /// A failed probe is an error, never "disabled".
    pub async fn read_cloud_mode(&self, namespace: &str) -> Result<bool> {
        match self.client.get_secret(namespace, names::CLOUD_SECRET).await {
            Ok(secret) => Ok(secret.is_some()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(KubeError::CloudModeDetection(Box::new(e))),
        }
    }

    /// Installation configuration
    pub async fn read_configuration(&self, namespace: &str) -> Result<ConfigSpec> {
        let content = self
            .client
            .get_config_value(namespace, names::CONFIG_OBJECT, names::CONFIG_KEY)
            .await?
            .ok_or_else(|| KubeError::ConfigurationUnreadable {
                namespace: namespace.to_string(),
                reason: format!(
                    "key '{}' missing from ConfigMap '{}'",
                    names::CONFIG_KEY,
                    names::CONFIG_OBJECT
                ),
            })?;

        ConfigSpec::from_yaml(&content).map_err(|e| KubeError::ConfigurationUnreadable {
            namespace: namespace.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterClient;

    #[tokio::test]
    async fn test_read_full_state() {
        let mock = MockClusterClient::with_installation("tidemark-system", "v1.2.0");
        mock.add_secret("tidemark-system", names::CLOUD_SECRET);

        let state = ClusterStateReader::new(&mock).read().await.unwrap();
        assert_eq!(state.namespace, "tidemark-system");
        assert_eq!(state.current_version, Version::new(1, 2, 0));
        assert!(state.cloud_mode_enabled);
        assert_eq!(state.configuration, ConfigSpec::default());
    }

    #[tokio::test]
    async fn test_cloud_mode_absent_secret() {
        let mock = MockClusterClient::with_installation("tm", "1.2.0");
        let state = ClusterStateReader::new(&mock).read().await.unwrap();
        assert!(!state.cloud_mode_enabled);
    }

    #[tokio::test]
    async fn test_no_installation() {
        let mock = MockClusterClient::new();
        let err = ClusterStateReader::new(&mock).read().await.unwrap_err();
        assert!(matches!(err, KubeError::NamespaceNotFound));
    }

    #[tokio::test]
    async fn test_missing_and_empty_version_record() {
        let mock = MockClusterClient::with_installation("tm", "1.2.0");
        mock.remove_config_value("tm", names::DEPLOYMENT_CONFIG_MAP, names::VERSION_KEY);
        let err = ClusterStateReader::new(&mock).read_version().await.unwrap_err();
        assert!(matches!(err, KubeError::VersionRecordMissing { namespace } if namespace == "tm"));

        mock.set_config_value("tm", names::DEPLOYMENT_CONFIG_MAP, names::VERSION_KEY, "  ");
        let err = ClusterStateReader::new(&mock).read_version().await.unwrap_err();
        assert!(matches!(err, KubeError::VersionRecordMissing { .. }));
    }

    #[tokio::test]
    async fn test_unparsable_version_record() {
        let mock = MockClusterClient::with_installation("tm", "not-a-version");
        let err = ClusterStateReader::new(&mock).read_version().await.unwrap_err();
        assert!(matches!(
            err,
            KubeError::Core(tidemark_core::CoreError::UnparsableVersion { .. })
        ));
    }

    #[tokio::test]
    async fn test_cloud_probe_failure_is_not_disabled() {
        let mock = MockClusterClient::with_installation("tm", "1.2.0");
        mock.fail_secret_probe("connection refused");
        let err = ClusterStateReader::new(&mock).read().await.unwrap_err();
        assert!(matches!(err, KubeError::CloudModeDetection(_)));
    }

    #[tokio::test]
    async fn test_transport_error_is_not_namespace_not_found() {
        let mock = MockClusterClient::with_installation("tm", "1.2.0");
        mock.fail_namespace_lookup("tls handshake eof");
        let err = ClusterStateReader::new(&mock).read().await.unwrap_err();
        assert!(matches!(err, KubeError::Transport(_)));
    }

    #[tokio::test]
    async fn test_unreadable_configuration() {
        let mock = MockClusterClient::with_installation("tm", "1.2.0");
        mock.set_config_value("tm", names::CONFIG_OBJECT, names::CONFIG_KEY, "collectorReplicas: [");
        let err = ClusterStateReader::new(&mock).read().await.unwrap_err();
        assert!(matches!(err, KubeError::ConfigurationUnreadable { .. }));

        mock.remove_config_value("tm", names::CONFIG_OBJECT, names::CONFIG_KEY);
        let err = ClusterStateReader::new(&mock).read().await.unwrap_err();
        assert!(matches!(err, KubeError::ConfigurationUnreadable { .. }));
    }
}

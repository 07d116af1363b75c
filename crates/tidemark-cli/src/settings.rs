//! User settings
//!
//! Stored in `~/.config/tidemark/settings.yaml`. Every field is optional;
//! command-line flags always win over what is stored here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::display::OutputFormat;
use crate::error::{CliError, Result};
use crate::logging::LogFormat;

/// Overrides the settings file location
pub const SETTINGS_ENV: &str = "TIDEMARK_SETTINGS";

/// Persistent CLI defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Default for `upgrade --output`
    pub output: Option<OutputFormat>,

    /// Default for `--log-format`
    pub log_format: Option<LogFormat>,

    /// Skip the confirmation prompt unless told otherwise
    pub assume_yes: bool,

    /// Default for `--kube-context`
    pub kube_context: Option<String>,
}

impl Settings {
    /// Load settings from the default location
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load settings from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let invalid = |message: String| CliError::Settings {
            path: path.display().to_string(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))
    }

    /// Settings path, honouring `TIDEMARK_SETTINGS`
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("tidemark").join("settings.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_settings(settings: &Settings, path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_yaml::to_string(settings).unwrap()).unwrap();
    }

    #[test]
    fn test_missing_fields_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "kubeContext: staging\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.kube_context.as_deref(), Some("staging"));
        assert!(!settings.assume_yes);
        assert_eq!(settings.output, None);
    }

    #[test]
    fn test_written_settings_load_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.yaml");
        let settings = Settings {
            output: Some(OutputFormat::Json),
            log_format: Some(LogFormat::Json),
            assume_yes: true,
            kube_context: None,
        };

        write_settings(&settings, &path);
        assert_eq!(Settings::load_from(&path).unwrap(), settings);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("assumeYes: true"));
        assert!(raw.contains("logFormat: json"));
    }

    #[test]
    fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "output: [not, a, format]\n").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(matches!(err, CliError::Settings { .. }));
        assert!(err.to_string().contains("settings.yaml"));
        assert_eq!(err.exit_code(), 1);
    }
}

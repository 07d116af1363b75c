//! Core error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid version '{input}': {reason}")]
    UnparsableVersion { input: String, reason: String },

    #[error(
        "Unable to upgrade from version '{current}', upgrades are only supported from '{minimum}' or newer"
    )]
    IncompatibleSourceVersion { current: String, minimum: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::InvalidConfig {
            message: e.to_string(),
        }
    }
}

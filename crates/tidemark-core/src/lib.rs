//! Tidemark Core - Core types for the Tidemark upgrade orchestrator
//!
//! This crate provides the foundational types used throughout Tidemark:
//! - `version`: Semantic version parsing and the upgrade gate
//! - `resource`: Managed resource kinds, descriptors and the ownership marker
//! - `config`: Installation configuration stored in the cluster
//! - `state`: The recorded cluster state read at the start of an upgrade

pub mod config;
pub mod error;
pub mod resource;
pub mod state;
pub mod version;

pub use config::ConfigSpec;
pub use error::{CoreError, Result};
pub use resource::{ManagedObject, ManagedResourceDescriptor, ResourceKind, managed_resources};
pub use state::ClusterRecordedState;
pub use version::{GateDecision, MINIMUM_UPGRADABLE_VERSION, VersionGate, parse_version};

//! Core types for mirrortree.
//!
//! This crate provides the data structures shared by the rest of the
//! workspace: snapshot trees, root-relative paths, changesets and the
//! replication configuration.

mod changeset;
mod config;
mod error;
mod node;
mod path;
mod tree;

pub use changeset::{Changeset, FileChange, Payload};
pub use config::{
    DEFAULT_PORT, Destination, ReplicaConfig, ReplicaConfigBuilder, ScanConfig, ScanConfigBuilder,
};
pub use error::{ConfigError, PathError, SnapshotError, SnapshotWarning, WarningKind};
pub use node::{Fingerprint, NodeKind, TreeNode};
pub use path::RelativePath;
pub use tree::{Snapshot, SnapshotStats};

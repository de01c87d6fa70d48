//! Directory snapshots for mirrortree.
//!
//! This crate walks a directory tree in parallel using jwalk and
//! fingerprints every regular file with BLAKE3.
//!
//! # Overview
//!
//! - **Parallel traversal** via jwalk/rayon
//! - **Parallel hashing** of file contents
//! - **Skip-and-report** for entries that cannot be read
//! - **Configurable** ignore patterns and hidden-file handling
//!
//! # Example
//!
//! ```rust,no_run
//! use mirrortree_scan::{ScanConfig, TreeBuilder};
//!
//! let config = ScanConfig::new("/path/to/replicate");
//! let snapshot = TreeBuilder::new().build(&config).unwrap();
//!
//! println!("Total files: {}", snapshot.total_files());
//! for warning in &snapshot.warnings {
//!     println!("skipped {}: {}", warning.path.display(), warning.message);
//! }
//! ```

mod builder;
mod hasher;

pub use builder::TreeBuilder;
pub use hasher::{FileDigest, HASH_BUFFER_SIZE, HashError, hash_bytes, hash_file, hash_reader};

// Re-export core types for convenience
pub use mirrortree_core::{
    Fingerprint, NodeKind, RelativePath, ScanConfig, Snapshot, SnapshotError, SnapshotStats,
    SnapshotWarning, TreeNode, WarningKind,
};

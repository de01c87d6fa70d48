//! Snapshot comparison for mirrortree.
//!
//! Compares two snapshots of the same root and classifies every
//! difference as created, deleted or modified:
//!
//! ```rust,ignore
//! use mirrortree_diff::diff;
//! use mirrortree_scan::{ScanConfig, TreeBuilder};
//!
//! let config = ScanConfig::new("/path/to/replicate");
//! let before = TreeBuilder::new().build(&config).unwrap();
//! // ... files change ...
//! let after = TreeBuilder::new().build(&config).unwrap();
//!
//! let changes = diff(&before, &after).unwrap();
//! println!("{} created, {} deleted, {} modified",
//!     changes.created_files.len(), changes.deleted.len(), changes.modified.len());
//! ```

mod differ;
mod error;

pub use differ::{diff, initial};
pub use error::DiffError;

// Re-export core types
pub use mirrortree_core::{Changeset, FileChange, Payload, RelativePath};

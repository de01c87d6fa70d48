//! Classified differences between two snapshots.

use std::path::PathBuf;

use crate::node::Fingerprint;
use crate::path::RelativePath;

/// Where the bytes of a changed file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Streamed from the source file when the changeset is encoded.
    File(PathBuf),
    /// Held in memory.
    Bytes(Vec<u8>),
}

/// A created or modified file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path relative to the replicated root.
    pub path: RelativePath,
    /// Number of payload bytes.
    pub size: u64,
    /// Fingerprint at snapshot time; not carried on the wire.
    pub fingerprint: Option<Fingerprint>,
    /// File content.
    pub payload: Payload,
}

impl FileChange {
    /// A change whose content is read from disk at send time.
    pub fn on_disk(
        path: RelativePath,
        size: u64,
        fingerprint: Fingerprint,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            path,
            size,
            fingerprint: Some(fingerprint),
            payload: Payload::File(source.into()),
        }
    }

    /// A change whose content is already in memory.
    pub fn in_memory(path: RelativePath, bytes: Vec<u8>) -> Self {
        Self {
            path,
            size: bytes.len() as u64,
            fingerprint: None,
            payload: Payload::Bytes(bytes),
        }
    }
}

/// The result of one diff cycle.
///
/// Created directories are listed parents first and deleted entries
/// children first. A path only appears in
/// both `deleted` and the created lists when its type changed between file
/// and directory; receivers apply the deletion before the creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    /// Newly appeared directories.
    pub created_dirs: Vec<RelativePath>,
    /// Newly appeared files.
    pub created_files: Vec<FileChange>,
    /// Files or directories no longer present.
    pub deleted: Vec<RelativePath>,
    /// Files whose fingerprint changed.
    pub modified: Vec<FileChange>,
}

impl Changeset {
    /// Create an empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        !self.has_created() && self.deleted.is_empty() && self.modified.is_empty()
    }

    /// Check if anything was created.
    pub fn has_created(&self) -> bool {
        !self.created_dirs.is_empty() || !self.created_files.is_empty()
    }

    /// Total number of entries across all lists.
    pub fn len(&self) -> usize {
        self.created_dirs.len() + self.created_files.len() + self.deleted.len() + self.modified.len()
    }

    /// Total payload bytes that will be transferred.
    pub fn payload_bytes(&self) -> u64 {
        self.created_files
            .iter()
            .chain(&self.modified)
            .map(|f| f.size)
            .sum()
    }
}

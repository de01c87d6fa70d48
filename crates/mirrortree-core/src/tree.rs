//! Snapshot container and statistics.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::SnapshotWarning;
use crate::node::TreeNode;
use crate::path::RelativePath;

/// Summary statistics for a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Total bytes hashed.
    pub total_bytes: u64,
    /// Total number of files.
    pub total_files: u64,
    /// Total number of directories, excluding the root.
    pub total_dirs: u64,
    /// Maximum depth reached.
    pub max_depth: u32,
    /// Largest file (path, size).
    pub largest_file: Option<(RelativePath, u64)>,
}

impl SnapshotStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a file entry.
    pub fn record_file(&mut self, path: &RelativePath, size: u64) {
        self.total_files += 1;
        self.total_bytes += size;
        self.max_depth = self.max_depth.max(path.depth() as u32);

        if self.largest_file.as_ref().is_none_or(|(_, s)| size > *s) {
            self.largest_file = Some((path.clone(), size));
        }
    }

    /// Record a directory.
    pub fn record_dir(&mut self, path: &RelativePath) {
        self.total_dirs += 1;
        self.max_depth = self.max_depth.max(path.depth() as u32);
    }
}

/// Immutable snapshot of a directory tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Root node of the tree.
    pub root: TreeNode,

    /// Canonical absolute root path that was walked.
    pub root_path: PathBuf,

    /// When this snapshot was taken.
    pub taken_at: SystemTime,

    /// Duration of the walk and hashing.
    pub duration: Duration,

    /// Summary statistics.
    pub stats: SnapshotStats,

    /// Entries that were skipped, with the reason.
    pub warnings: Vec<SnapshotWarning>,

    /// Relative paths whose state is unknown in this snapshot.
    skipped: BTreeSet<RelativePath>,
}

impl Snapshot {
    /// Create a new snapshot.
    pub fn new(
        root: TreeNode,
        root_path: PathBuf,
        stats: SnapshotStats,
        duration: Duration,
        warnings: Vec<SnapshotWarning>,
    ) -> Self {
        let skipped = warnings.iter().filter_map(|w| w.relative.clone()).collect();
        Self {
            root,
            root_path,
            taken_at: SystemTime::now(),
            duration,
            stats,
            warnings,
            skipped,
        }
    }

    /// Base name of the root directory, as sent to destinations.
    pub fn root_name(&self) -> String {
        self.root_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether `path`, or one of its ancestors, was skipped.
    ///
    /// A skipped entry's content is unknown, so it must not be compared
    /// against an earlier snapshot.
    pub fn is_skipped(&self, path: &RelativePath) -> bool {
        if self.skipped.is_empty() {
            return false;
        }
        let mut prefix = RelativePath::root();
        if self.skipped.contains(&prefix) {
            return true;
        }
        // One lookup per ancestor.
        path.components().any(|component| {
            prefix = prefix.join(component);
            self.skipped.contains(&prefix)
        })
    }

    /// Get the total number of files.
    pub fn total_files(&self) -> u64 {
        self.stats.total_files
    }

    /// Get the total number of directories.
    pub fn total_dirs(&self) -> u64 {
        self.stats.total_dirs
    }

    /// Check if any entry was skipped.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarningKind;

    fn warning(rel: &str) -> SnapshotWarning {
        SnapshotWarning::new(
            format!("/r/{rel}"),
            Some(RelativePath::parse(rel).unwrap()),
            "denied",
            WarningKind::PermissionDenied,
        )
    }

    #[test]
    fn test_stats_record_file() {
        let mut stats = SnapshotStats::new();
        stats.record_file(&RelativePath::parse("a/b.txt").unwrap(), 1024);
        stats.record_file(&RelativePath::parse("c.txt").unwrap(), 10);

        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_bytes, 1034);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.largest_file.as_ref().map(|(_, s)| *s), Some(1024));
    }

    #[test]
    fn test_is_skipped_covers_descendants() {
        let snapshot = Snapshot::new(
            TreeNode::new_directory("root", Vec::new()),
            PathBuf::from("/r"),
            SnapshotStats::new(),
            Duration::ZERO,
            vec![warning("locked"), warning("m/n")],
        );

        let check = |p: &str| snapshot.is_skipped(&RelativePath::parse(p).unwrap());
        assert!(check("locked"));
        assert!(check("locked/deep/file"));
        assert!(check("m/n"));
        assert!(!check("lockedx"));
        assert!(!check("m"));
        assert!(!check("other"));
        assert_eq!(snapshot.root_name(), "r");
    }

    #[test]
    fn test_is_skipped_with_many_siblings() {
        let mut warnings: Vec<SnapshotWarning> =
            (0..500).map(|i| warning(&format!("a/b/x{i:03}"))).collect();
        warnings.push(warning("a/b"));
        let snapshot = Snapshot::new(
            TreeNode::new_directory("root", Vec::new()),
            PathBuf::from("/r"),
            SnapshotStats::new(),
            Duration::ZERO,
            warnings,
        );

        let check = |p: &str| snapshot.is_skipped(&RelativePath::parse(p).unwrap());
        assert!(check("a/b/y"));
        assert!(check("a/b/x250/deep"));
        assert!(!check("a/b2"));
        assert!(!check("a"));
        assert!(!check("z"));
    }

    #[test]
    fn test_is_skipped_root() {
        let snapshot = Snapshot::new(
            TreeNode::new_directory("root", Vec::new()),
            PathBuf::from("/r"),
            SnapshotStats::new(),
            Duration::ZERO,
            vec![SnapshotWarning::new(
                "/r",
                Some(RelativePath::root()),
                "denied",
                WarningKind::PermissionDenied,
            )],
        );

        assert!(snapshot.is_skipped(&RelativePath::root()));
        assert!(snapshot.is_skipped(&RelativePath::parse("any/thing").unwrap()));
    }
}

//! JWalk-based parallel snapshot builder.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use compact_str::CompactString;
use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mirrortree_core::{
    RelativePath, ScanConfig, Snapshot, SnapshotError, SnapshotStats, SnapshotWarning, TreeNode,
    WarningKind,
};

use crate::hasher::{FileDigest, HashError, hash_file};

/// Builds snapshots using jwalk for traversal and rayon for hashing.
///
/// Entries that cannot be read are skipped and reported as warnings on the
/// resulting [`Snapshot`]; only a failure on the root itself, an invalid
/// configuration or cancellation aborts the build.
#[derive(Debug, Default)]
pub struct TreeBuilder;

impl TreeBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self
    }

    /// Build a snapshot of the configured root.
    pub fn build(&self, config: &ScanConfig) -> Result<Snapshot, SnapshotError> {
        self.build_cancellable(config, &CancellationToken::new())
    }

    /// Build a snapshot, checking `cancel` between entries and files.
    pub fn build_cancellable(
        &self,
        config: &ScanConfig,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, SnapshotError> {
        let start = Instant::now();
        let root_path = config
            .root
            .canonicalize()
            .map_err(|e| SnapshotError::io(&config.root, e))?;

        if !root_path.is_dir() {
            return Err(SnapshotError::NotADirectory { path: root_path });
        }

        let mut walk = self.collect_entries(config, &root_path, cancel)?;
        let digests = self.hash_files(config, &walk.files, cancel)?;
        walk.record_digests(digests);

        let mut stats = SnapshotStats::new();
        let name = root_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root_path.to_string_lossy().to_string());
        let root = build_node(
            name.into(),
            &RelativePath::root(),
            &mut walk.entries_by_parent,
            &walk.skipped,
            &mut stats,
        );

        walk.warnings.sort_by(|a, b| a.path.cmp(&b.path));
        let duration = start.elapsed();
        debug!(
            root = %root_path.display(),
            files = stats.total_files,
            dirs = stats.total_dirs,
            skipped = walk.warnings.len(),
            elapsed_ms = duration.as_millis() as u64,
            "snapshot built"
        );

        Ok(Snapshot::new(root, root_path, stats, duration, walk.warnings))
    }

    /// Walk the tree, grouping directories by parent and queueing files for hashing.
    fn collect_entries(
        &self,
        config: &ScanConfig,
        root_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Walk, SnapshotError> {
        let parallelism = match config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let matcher = Arc::new(config.ignore_matcher()?);
        let walker = WalkDir::new(root_path)
            .parallelism(parallelism)
            .skip_hidden(!config.include_hidden)
            .follow_links(false)
            .min_depth(0)
            .process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|child| match child {
                    Ok(entry) => !matcher.is_match(entry.file_name()),
                    Err(_) => true,
                });
            });

        let mut walk = Walk::default();

        for entry_result in walker {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Interrupted);
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    if path == root_path {
                        return Err(root_error(root_path, &err));
                    }
                    let rel = RelativePath::from_native(root_path, &path).ok();
                    let kind = err
                        .io_error()
                        .map(|e| WarningKind::from_io(e, WarningKind::ReadError))
                        .unwrap_or(WarningKind::ReadError);
                    walk.skip(path, rel, err.to_string(), kind);
                    continue;
                }
            };

            let path = entry.path();

            if entry.depth == 0 {
                if let Some(err) = &entry.read_children_error {
                    return Err(root_error(root_path, err));
                }
                continue;
            }

            let rel = match RelativePath::from_native(root_path, &path) {
                Ok(rel) => rel,
                Err(err) => {
                    walk.skip(path, None, err.to_string(), WarningKind::InvalidName);
                    continue;
                }
            };
            let Some(parent) = parent_of(&rel) else {
                continue;
            };
            let name = CompactString::from(rel.file_name().unwrap_or_default());

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                debug!(path = %path.display(), "skipping symlink");
                walk.skipped.insert(rel.clone());
                walk.warnings.push(SnapshotWarning::symlink(&path, rel));
            } else if file_type.is_dir() {
                if let Some(err) = &entry.read_children_error {
                    let kind = err
                        .io_error()
                        .map(|e| WarningKind::from_io(e, WarningKind::ReadError))
                        .unwrap_or(WarningKind::ReadError);
                    walk.skip(path, Some(rel), err.to_string(), kind);
                    continue;
                }
                walk.entries_by_parent.entry(parent).or_default().push(Pending {
                    name,
                    rel,
                    digest: None,
                });
            } else if file_type.is_file() {
                walk.files.push(FileJob {
                    name,
                    path,
                    rel,
                    parent,
                });
            } else {
                walk.skip(
                    path,
                    Some(rel),
                    "Not a regular file or directory",
                    WarningKind::Unsupported,
                );
            }
        }

        Ok(walk)
    }

    /// Hash queued files in parallel, preserving their order.
    fn hash_files(
        &self,
        config: &ScanConfig,
        files: &[FileJob],
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<FileDigest, HashError>>, SnapshotError> {
        let hash_all = || -> Vec<Option<Result<FileDigest, HashError>>> {
            files
                .par_iter()
                .map(|job| {
                    if cancel.is_cancelled() {
                        None
                    } else {
                        Some(hash_file(&job.path))
                    }
                })
                .collect()
        };

        let results = match config.threads {
            0 => hash_all(),
            n => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| SnapshotError::Other {
                    message: format!("Failed to start hashing pool: {e}"),
                })?
                .install(hash_all),
        };

        if cancel.is_cancelled() {
            return Err(SnapshotError::Interrupted);
        }
        results
            .into_iter()
            .map(|r| r.ok_or(SnapshotError::Interrupted))
            .collect()
    }
}

/// Entries gathered by a walk, before the tree is assembled.
#[derive(Default)]
struct Walk {
    entries_by_parent: HashMap<RelativePath, Vec<Pending>>,
    files: Vec<FileJob>,
    skipped: BTreeSet<RelativePath>,
    warnings: Vec<SnapshotWarning>,
}

impl Walk {
    /// File `digests` under their parents, skipping files that failed to hash.
    ///
    /// `digests` is in the order of `files`, which is drained.
    fn record_digests(&mut self, digests: Vec<Result<FileDigest, HashError>>) {
        for (job, digest) in std::mem::take(&mut self.files).into_iter().zip(digests) {
            match digest {
                Ok(digest) => self.entries_by_parent.entry(job.parent).or_default().push(Pending {
                    name: job.name,
                    rel: job.rel,
                    digest: Some(digest),
                }),
                Err(err) => {
                    warn!(path = %err.path.display(), error = %err.source, "skipping unreadable file");
                    self.skipped.insert(job.rel.clone());
                    self.warnings.push(SnapshotWarning::from_io(
                        &err.path,
                        Some(job.rel),
                        &err.source,
                        WarningKind::HashError,
                    ));
                }
            }
        }
    }

    fn skip(
        &mut self,
        path: PathBuf,
        rel: Option<RelativePath>,
        message: impl Into<String>,
        kind: WarningKind,
    ) {
        let message = message.into();
        warn!(path = %path.display(), %kind, %message, "skipping entry");
        if let Some(rel) = &rel {
            self.skipped.insert(rel.clone());
        }
        self.warnings
            .push(SnapshotWarning::new(path, rel, message, kind));
    }
}

/// A directory, or a file that has been hashed.
struct Pending {
    name: CompactString,
    rel: RelativePath,
    digest: Option<FileDigest>,
}

/// A file waiting to be hashed.
struct FileJob {
    name: CompactString,
    path: PathBuf,
    rel: RelativePath,
    parent: RelativePath,
}

/// Recursively build a directory node from the collected entries.
fn build_node(
    name: CompactString,
    rel: &RelativePath,
    entries_by_parent: &mut HashMap<RelativePath, Vec<Pending>>,
    skipped: &BTreeSet<RelativePath>,
    stats: &mut SnapshotStats,
) -> TreeNode {
    let pending = entries_by_parent.remove(rel).unwrap_or_default();
    let mut children = Vec::with_capacity(pending.len());

    for entry in pending {
        if skipped.contains(&entry.rel) {
            continue;
        }
        match entry.digest {
            Some(digest) => {
                stats.record_file(&entry.rel, digest.size);
                children.push(TreeNode::new_file(
                    entry.name,
                    digest.size,
                    digest.fingerprint,
                ));
            }
            None => {
                stats.record_dir(&entry.rel);
                children.push(build_node(
                    entry.name,
                    &entry.rel,
                    entries_by_parent,
                    skipped,
                    stats,
                ));
            }
        }
    }

    TreeNode::new_directory(name, children)
}

fn parent_of(rel: &RelativePath) -> Option<RelativePath> {
    let components: Vec<&str> = rel.components().collect();
    let (_, parents) = components.split_last()?;
    Some(
        parents
            .iter()
            .fold(RelativePath::root(), |acc, c| acc.join(c)),
    )
}

fn root_error(root_path: &Path, err: &jwalk::Error) -> SnapshotError {
    match err.io_error() {
        Some(io) => SnapshotError::io(root_path, std::io::Error::new(io.kind(), io.to_string())),
        None => SnapshotError::Other {
            message: err.to_string(),
        },
    }
}

//! Tree comparison.

use std::collections::HashMap;

use tracing::debug;

use mirrortree_core::{Changeset, FileChange, NodeKind, RelativePath, Snapshot, TreeNode};

use crate::error::DiffError;

/// Compare two snapshots of the same root.
///
/// Children are matched by name one directory level at a time. Entries only
/// in `current` are created (directories flattened parents first), entries
/// only in `previous` are deleted (flattened children first, so every
/// removed file is listed), and matched files whose fingerprints differ
/// are modified. An entry that
/// changed between file and directory is deleted and then created.
///
/// Entries `current` skipped while it was built are never reported as
/// deleted, since their state is unknown.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Result<Changeset, DiffError> {
    if previous.root_path != current.root_path {
        return Err(DiffError::RootMismatch {
            previous: previous.root_path.clone(),
            current: current.root_path.clone(),
        });
    }

    let mut changes = Changeset::new();
    diff_dir(
        &previous.root,
        &current.root,
        &RelativePath::root(),
        current,
        &mut changes,
    );

    debug!(
        root = %current.root_path.display(),
        created_dirs = changes.created_dirs.len(),
        created_files = changes.created_files.len(),
        deleted = changes.deleted.len(),
        modified = changes.modified.len(),
        "snapshots compared"
    );

    Ok(changes)
}

/// List the whole of `current` as created, for an initial full sync.
///
/// The root itself is never listed.
pub fn initial(current: &Snapshot) -> Changeset {
    let mut changes = Changeset::new();
    for child in &current.root.children {
        flatten_created(
            child,
            RelativePath::root().join(&child.name),
            current,
            &mut changes,
        );
    }
    changes
}

fn diff_dir(
    previous: &TreeNode,
    current: &TreeNode,
    rel: &RelativePath,
    snapshot: &Snapshot,
    changes: &mut Changeset,
) {
    let mut unmatched: HashMap<&str, &TreeNode> = previous
        .children
        .iter()
        .map(|child| (child.name.as_str(), child))
        .collect();

    for child in &current.children {
        let path = rel.join(&child.name);
        match unmatched.remove(child.name.as_str()) {
            Some(old) => compare(old, child, path, snapshot, changes),
            None => flatten_created(child, path, snapshot, changes),
        }
    }

    // Walk `previous` rather than the map so deletions keep name order.
    for old in &previous.children {
        if !unmatched.contains_key(old.name.as_str()) {
            continue;
        }
        flatten_deleted(old, rel.join(&old.name), snapshot, changes);
    }
}

fn compare(
    old: &TreeNode,
    new: &TreeNode,
    path: RelativePath,
    snapshot: &Snapshot,
    changes: &mut Changeset,
) {
    match (&old.kind, &new.kind) {
        (NodeKind::Directory, NodeKind::Directory) => diff_dir(old, new, &path, snapshot, changes),
        (
            NodeKind::File {
                fingerprint: before,
                ..
            },
            NodeKind::File { size, fingerprint },
        ) => {
            if before != fingerprint {
                let source = path.to_native(&snapshot.root_path);
                changes
                    .modified
                    .push(FileChange::on_disk(path, *size, *fingerprint, source));
            }
        }
        _ => {
            flatten_deleted(old, path.clone(), snapshot, changes);
            flatten_created(new, path, snapshot, changes);
        }
    }
}

/// Push `node` and everything below it onto the created lists, pre-order.
fn flatten_created(
    node: &TreeNode,
    path: RelativePath,
    snapshot: &Snapshot,
    changes: &mut Changeset,
) {
    match &node.kind {
        NodeKind::File { size, fingerprint } => {
            let source = path.to_native(&snapshot.root_path);
            changes
                .created_files
                .push(FileChange::on_disk(path, *size, *fingerprint, source));
        }
        NodeKind::Directory => {
            changes.created_dirs.push(path.clone());
            for child in &node.children {
                flatten_created(child, path.join(&child.name), snapshot, changes);
            }
        }
    }
}

/// Push `node` and everything below it onto the deleted list, post-order.
///
/// Paths `snapshot` skipped, and everything below them, are left out.
fn flatten_deleted(
    node: &TreeNode,
    path: RelativePath,
    snapshot: &Snapshot,
    changes: &mut Changeset,
) {
    if snapshot.is_skipped(&path) {
        debug!(path = %path, "not deleting skipped entry");
        return;
    }
    for child in &node.children {
        flatten_deleted(child, path.join(&child.name), snapshot, changes);
    }
    changes.deleted.push(path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrortree_core::{Fingerprint, SnapshotStats, SnapshotWarning, WarningKind};
    use std::path::PathBuf;
    use std::time::Duration;

    fn file(name: &str, byte: u8) -> TreeNode {
        TreeNode::new_file(name, 1, Fingerprint::new([byte; 32]))
    }

    fn dir(name: &str, children: Vec<TreeNode>) -> TreeNode {
        TreeNode::new_directory(name, children)
    }

    fn snapshot(children: Vec<TreeNode>) -> Snapshot {
        snapshot_with_warnings(children, Vec::new())
    }

    fn snapshot_with_warnings(children: Vec<TreeNode>, warnings: Vec<SnapshotWarning>) -> Snapshot {
        Snapshot::new(
            dir("root", children),
            PathBuf::from("/srv/root"),
            SnapshotStats::new(),
            Duration::ZERO,
            warnings,
        )
    }

    fn paths(list: &[RelativePath]) -> Vec<&str> {
        list.iter().map(RelativePath::as_str).collect()
    }

    fn file_paths(list: &[FileChange]) -> Vec<&str> {
        list.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn test_identical_trees() {
        let tree = || vec![dir("d", vec![file("x", 1)]), file("a", 2)];
        let changes = diff(&snapshot(tree()), &snapshot(tree())).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_nested_created_dirs_are_parents_first() {
        let prev = snapshot(vec![]);
        let curr = snapshot(vec![dir("a", vec![dir("b", vec![file("c", 1)]), file("z", 2)])]);

        let changes = diff(&prev, &curr).unwrap();
        assert_eq!(paths(&changes.created_dirs), vec!["a", "a/b"]);
        assert_eq!(file_paths(&changes.created_files), vec!["a/b/c", "a/z"]);
    }

    #[test]
    fn test_deleted_directory_lists_contents_first() {
        let prev = snapshot(vec![dir("gone", vec![dir("deep", vec![file("f", 1)])]), file("kept", 2)]);
        let curr = snapshot(vec![file("kept", 2)]);

        let changes = diff(&prev, &curr).unwrap();
        assert_eq!(paths(&changes.deleted), vec!["gone/deep/f", "gone/deep", "gone"]);
        assert!(!changes.has_created());
        assert!(changes.modified.is_empty());
    }

    #[test]
    fn test_modified_carries_source_path() {
        let prev = snapshot(vec![dir("d", vec![file("f", 1)])]);
        let curr = snapshot(vec![dir("d", vec![file("f", 9)])]);

        let changes = diff(&prev, &curr).unwrap();
        assert_eq!(file_paths(&changes.modified), vec!["d/f"]);
        assert_eq!(
            changes.modified[0].payload,
            mirrortree_core::Payload::File(PathBuf::from("/srv/root/d/f"))
        );
        assert_eq!(changes.modified[0].fingerprint, Some(Fingerprint::new([9; 32])));
    }

    #[test]
    fn test_type_change_is_delete_then_create() {
        let prev = snapshot(vec![file("x", 1)]);
        let curr = snapshot(vec![dir("x", vec![file("inner", 2)])]);

        let changes = diff(&prev, &curr).unwrap();
        assert_eq!(paths(&changes.deleted), vec!["x"]);
        assert_eq!(paths(&changes.created_dirs), vec!["x"]);
        assert_eq!(file_paths(&changes.created_files), vec!["x/inner"]);
        assert!(changes.modified.is_empty());
    }

    #[test]
    fn test_skipped_entries_are_not_deleted() {
        let prev = snapshot(vec![dir("locked", vec![file("f", 1)]), file("gone", 2)]);
        let curr = snapshot_with_warnings(
            vec![],
            vec![SnapshotWarning::new(
                "/srv/root/locked",
                Some(RelativePath::parse("locked").unwrap()),
                "Permission denied",
                WarningKind::PermissionDenied,
            )],
        );

        let changes = diff(&prev, &curr).unwrap();
        assert_eq!(paths(&changes.deleted), vec!["gone"]);
    }

    #[test]
    fn test_empty_new_directory() {
        let changes = diff(&snapshot(vec![]), &snapshot(vec![dir("empty", vec![])])).unwrap();
        assert_eq!(paths(&changes.created_dirs), vec!["empty"]);
        assert!(changes.created_files.is_empty());
    }

    #[test]
    fn test_directory_becoming_empty() {
        let prev = snapshot(vec![dir("d", vec![file("a", 1), file("b", 2)])]);
        let curr = snapshot(vec![dir("d", vec![])]);

        let changes = diff(&prev, &curr).unwrap();
        assert_eq!(paths(&changes.deleted), vec!["d/a", "d/b"]);
        assert!(!changes.has_created());
    }

    #[test]
    fn test_root_mismatch() {
        let prev = snapshot(vec![]);
        let mut curr = snapshot(vec![]);
        curr.root_path = PathBuf::from("/srv/other");

        assert!(matches!(
            diff(&prev, &curr),
            Err(DiffError::RootMismatch { .. })
        ));
    }

    #[test]
    fn test_initial_excludes_root() {
        let curr = snapshot(vec![dir("d", vec![file("f", 1)]), file("a", 2)]);
        let changes = initial(&curr);

        assert_eq!(paths(&changes.created_dirs), vec!["d"]);
        assert_eq!(file_paths(&changes.created_files), vec!["d/f", "a"]);
        assert!(changes.deleted.is_empty());
    }
}

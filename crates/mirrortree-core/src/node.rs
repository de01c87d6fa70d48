//! Snapshot tree node types.

use std::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::path::RelativePath;

/// BLAKE3 content fingerprint of a file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Create a fingerprint from raw digest bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the fingerprint as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// Get the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Fingerprint({})", &hex[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Type of snapshot node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular file with the digest of its content at snapshot time.
    File {
        /// Number of bytes that were hashed.
        size: u64,
        /// Content fingerprint.
        fingerprint: Fingerprint,
    },
    /// Directory.
    Directory,
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File { .. })
    }
}

/// A single file or directory in a snapshot.
///
/// Nodes are identified by name under their parent; the full identity of a
/// node is its [`RelativePath`] from the snapshot root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// File/directory name (not full path).
    pub name: CompactString,

    /// Node type and associated content metadata.
    pub kind: NodeKind,

    /// Children nodes (directories only), sorted by name.
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Create a new file node.
    pub fn new_file(name: impl Into<CompactString>, size: u64, fingerprint: Fingerprint) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File { size, fingerprint },
            children: Vec::new(),
        }
    }

    /// Create a new directory node.
    pub fn new_directory(name: impl Into<CompactString>, mut children: Vec<TreeNode>) -> Self {
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            name: name.into(),
            kind: NodeKind::Directory,
            children,
        }
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Content fingerprint, for files.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match &self.kind {
            NodeKind::File { fingerprint, .. } => Some(fingerprint),
            NodeKind::Directory => None,
        }
    }

    /// Hashed size in bytes, for files.
    pub fn size(&self) -> Option<u64> {
        match self.kind {
            NodeKind::File { size, .. } => Some(size),
            NodeKind::Directory => None,
        }
    }

    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children
            .binary_search_by(|c| c.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.children[i])
    }

    /// Look up a descendant by root-relative path.
    pub fn find(&self, path: &RelativePath) -> Option<&TreeNode> {
        path.components()
            .try_fold(self, |node, component| node.child(component))
    }

    /// Number of files in this subtree.
    pub fn file_count(&self) -> u64 {
        match self.kind {
            NodeKind::File { .. } => 1,
            NodeKind::Directory => self.children.iter().map(TreeNode::file_count).sum(),
        }
    }

    /// Number of directories below this node.
    pub fn dir_count(&self) -> u64 {
        self.children
            .iter()
            .filter(|c| c.is_dir())
            .map(|c| c.dir_count() + 1)
            .sum()
    }
}

//! The unit sent to a destination each cycle.

use mirrortree_core::Changeset;

/// Longest string the decoder accepts by default.
pub const DEFAULT_MAX_STRING_LEN: usize = 64 * 1024;

/// One encoded changeset, preceded by its cycle marker and root name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Whether this frame carries the full tree of an initial sync.
    pub initial: bool,
    /// Base name of the replicated root directory.
    pub root_name: String,
    /// The changes themselves.
    pub changeset: Changeset,
}

impl Frame {
    /// A full-tree frame for a destination's first sync.
    pub fn initial(root_name: impl Into<String>, changeset: Changeset) -> Self {
        Self {
            initial: true,
            root_name: root_name.into(),
            changeset,
        }
    }

    /// A frame carrying the changes since the previous cycle.
    pub fn incremental(root_name: impl Into<String>, changeset: Changeset) -> Self {
        Self {
            initial: false,
            root_name: root_name.into(),
            changeset,
        }
    }
}

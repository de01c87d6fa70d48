//! Delivery and cycle errors.

use std::path::PathBuf;
use std::time::Duration;

use strum::Display;
use thiserror::Error;

use mirrortree_core::SnapshotError;
use mirrortree_diff::DiffError;
use mirrortree_wire::ProtocolError;

/// Stage of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    /// Opening the connection.
    Connect,
    /// Writing the frame.
    Send,
    /// Shutting the connection down.
    Close,
}

/// Errors delivering a frame to one destination.
///
/// A failure for one destination never affects the others.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The connection could not be opened.
    #[error("Cannot connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A phase did not complete in time.
    #[error("Timed out during {phase} after {after:?}")]
    Timeout { phase: Phase, after: Duration },

    /// The frame could not be encoded onto the connection.
    #[error("Failed to send frame: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connection could not be shut down cleanly.
    #[error("Failed to close connection: {source}")]
    Shutdown {
        #[source]
        source: std::io::Error,
    },

    /// Delivery was cancelled.
    #[error("Delivery cancelled")]
    Cancelled,

    /// The delivery task ended abnormally.
    #[error("Delivery task failed: {message}")]
    TaskFailed { message: String },
}

impl DispatchError {
    /// The phase this error happened in, when known.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Connect { .. } => Some(Phase::Connect),
            Self::Timeout { phase, .. } => Some(*phase),
            Self::Protocol(_) => Some(Phase::Send),
            Self::Shutdown { .. } => Some(Phase::Close),
            Self::Cancelled | Self::TaskFailed { .. } => None,
        }
    }
}

/// Errors that end a replication cycle without a new baseline.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The snapshot could not be built.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The snapshot could not be compared with the baseline.
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// The root directory could not be created.
    #[error("Cannot create root {}: {source}", path.display())]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot task ended abnormally.
    #[error("Snapshot task failed: {message}")]
    TaskFailed { message: String },

    /// Delivery was cancelled, so destinations may not have the changes.
    #[error("Cycle cancelled during delivery")]
    Cancelled,
}

impl CycleError {
    /// Whether the cycle stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Snapshot(SnapshotError::Interrupted) | Self::Cancelled
        )
    }
}

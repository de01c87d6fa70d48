//! Diff errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that prevent two snapshots from being compared.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The snapshots describe different directories.
    #[error("Cannot compare snapshots of different roots: {} and {}", previous.display(), current.display())]
    RootMismatch { previous: PathBuf, current: PathBuf },
}

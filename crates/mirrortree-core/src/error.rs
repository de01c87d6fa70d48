//! Error types for snapshots, paths and configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::path::RelativePath;

/// Errors that abort building a snapshot.
///
/// Problems with individual entries never surface here; they are recorded
/// as [`SnapshotWarning`]s and the entry is skipped.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Permission denied for the root path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Root path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error on the root path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The build was cancelled.
    #[error("Snapshot interrupted")]
    Interrupted,

    /// Invalid scan configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl SnapshotError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of snapshot warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Entry disappeared while the tree was walked.
    Vanished,
    /// Symbolic links are not replicated.
    Symlink,
    /// Sockets, devices, fifos.
    Unsupported,
    /// Name is not valid UTF-8 or cannot travel on the wire.
    InvalidName,
    /// Error reading a directory listing.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Error reading file content for fingerprinting.
    HashError,
}

impl WarningKind {
    /// Classify an I/O error, falling back to `other` for unspecific kinds.
    pub fn from_io(error: &std::io::Error, other: WarningKind) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::NotFound => Self::Vanished,
            _ => other,
        }
    }
}

/// An entry that was skipped while building a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotWarning {
    /// Absolute path where the warning occurred.
    pub path: PathBuf,
    /// Root-relative path, when it could be computed.
    pub relative: Option<RelativePath>,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl SnapshotWarning {
    /// Create a new snapshot warning.
    pub fn new(
        path: impl Into<PathBuf>,
        relative: Option<RelativePath>,
        message: impl Into<String>,
        kind: WarningKind,
    ) -> Self {
        Self {
            path: path.into(),
            relative,
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from an I/O error.
    pub fn from_io(
        path: impl Into<PathBuf>,
        relative: Option<RelativePath>,
        error: &std::io::Error,
        fallback: WarningKind,
    ) -> Self {
        Self::new(
            path,
            relative,
            error.to_string(),
            WarningKind::from_io(error, fallback),
        )
    }

    /// Create a symlink warning.
    pub fn symlink(path: impl Into<PathBuf>, relative: RelativePath) -> Self {
        let path = path.into();
        Self {
            message: format!("Symbolic link skipped: {}", path.display()),
            path,
            relative: Some(relative),
            kind: WarningKind::Symlink,
        }
    }
}

/// Errors from parsing or building relative paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Path is absolute.
    #[error("path is absolute")]
    Absolute,

    /// Path contains `.` or `..`.
    #[error("path contains a parent or current-directory component")]
    ParentComponent,

    /// Path contains an empty component.
    #[error("path contains an empty component")]
    EmptyComponent,

    /// Component contains a character that cannot be replicated.
    #[error("component {component:?} contains an invalid character")]
    InvalidCharacter { component: String },

    /// Path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", path.display())]
    NonUtf8 { path: PathBuf },

    /// Path is not below the root.
    #[error("path is outside the root: {}", path.display())]
    OutsideRoot { path: PathBuf },
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("cannot parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration is invalid.
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_error_io() {
        let err = SnapshotError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, SnapshotError::PermissionDenied { .. }));
    }

    #[test]
    fn test_warning_kind_from_io() {
        let gone = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(
            WarningKind::from_io(&gone, WarningKind::HashError),
            WarningKind::Vanished
        );

        let other = std::io::Error::other("boom");
        assert_eq!(
            WarningKind::from_io(&other, WarningKind::HashError),
            WarningKind::HashError
        );
    }

    #[test]
    fn test_warning_display_kind() {
        assert_eq!(WarningKind::PermissionDenied.to_string(), "permission-denied");
        let warning = SnapshotWarning::symlink("/r/link", RelativePath::parse("link").unwrap());
        assert_eq!(warning.kind, WarningKind::Symlink);
        assert!(warning.message.contains("/r/link"));
    }
}

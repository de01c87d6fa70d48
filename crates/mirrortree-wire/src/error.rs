//! Protocol errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use mirrortree_core::PathError;

/// Errors from encoding or decoding a changeset frame.
///
/// Any error abandons the whole frame; there is no partial delivery.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The stream failed.
    #[error("I/O error while {phase}: {source}")]
    Io {
        phase: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The stream ended in the middle of a field.
    #[error("Stream ended while reading {what}")]
    UnexpectedEof { what: &'static str },

    /// A payload was shorter than its declared size.
    #[error("Payload for {path} truncated: expected {expected} bytes, got {actual}")]
    TruncatedPayload {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// The source file yielded fewer bytes than its recorded size.
    #[error("Source {} shrank: expected {expected} bytes, read {actual}", path.display())]
    SourceTruncated {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// The source file could not be opened or read.
    #[error("Cannot read source {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An in-memory payload disagrees with its declared size.
    #[error("Payload for {path} is {actual} bytes but declares {declared}")]
    SizeMismatch {
        path: String,
        declared: u64,
        actual: u64,
    },

    /// A boolean field held something other than 0 or 1.
    #[error("Invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A count or size was negative.
    #[error("Negative {what}: {value}")]
    Negative { what: &'static str, value: i64 },

    /// A count or size does not fit its wire field.
    #[error("{what} {value} does not fit on the wire")]
    Overflow { what: &'static str, value: u64 },

    /// A string is longer than the decoder accepts.
    #[error("String of {len} bytes exceeds limit of {limit}")]
    StringTooLong { len: u64, limit: usize },

    /// A string is not valid UTF-8.
    #[error("String is not valid UTF-8")]
    InvalidUtf8,

    /// A path would escape the replicated root.
    #[error("Unsafe path {path:?}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathError,
    },

    /// A write did not complete in time.
    #[error("Write timed out after {0:?}")]
    Timeout(Duration),
}

impl ProtocolError {
    /// Create an I/O error, mapping a short read onto [`ProtocolError::UnexpectedEof`].
    pub fn io(phase: &'static str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEof { what: phase },
            _ => Self::Io { phase, source },
        }
    }
}

//! Frame decoder.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use mirrortree_core::{Changeset, FileChange, PathError, RelativePath};

use crate::error::ProtocolError;
use crate::frame::{DEFAULT_MAX_STRING_LEN, Frame};

/// Reads frames from an async byte stream.
///
/// Every field is validated as it is read: booleans must be 0 or 1, counts
/// and sizes must be non-negative, strings must be UTF-8 and within the
/// length limit, and paths must stay below the replicated root. Payloads
/// must contain exactly their declared number of bytes.
pub struct FrameDecoder<R> {
    inner: R,
    max_string_len: usize,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    /// Create a decoder with the default string limit.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_string_len: DEFAULT_MAX_STRING_LEN,
        }
    }

    /// Reject strings longer than `limit` bytes.
    pub fn with_max_string_len(mut self, limit: usize) -> Self {
        self.max_string_len = limit;
        self
    }

    /// Decode one complete frame.
    pub async fn decode(&mut self) -> Result<Frame, ProtocolError> {
        let initial = self.read_bool("sync marker").await?;
        let root_name = self.read_string("root name").await?;
        let mut changeset = Changeset::new();

        let created_empty = self.read_bool("created flag").await?;
        if !created_empty {
            let dirs = self.read_count("directory count").await?;
            for _ in 0..dirs {
                changeset.created_dirs.push(self.read_path().await?);
            }
            let files = self.read_count("file count").await?;
            for _ in 0..files {
                changeset.created_files.push(self.read_file().await?);
            }
        }

        let deleted_empty = self.read_bool("deleted flag").await?;
        if !deleted_empty {
            let count = self.read_count("deleted count").await?;
            for _ in 0..count {
                changeset.deleted.push(self.read_path().await?);
            }
        }

        let modified_empty = self.read_bool("modified flag").await?;
        if !modified_empty {
            let count = self.read_count("modified count").await?;
            for _ in 0..count {
                changeset.modified.push(self.read_file().await?);
            }
        }

        debug!(
            root = %root_name,
            initial,
            entries = changeset.len(),
            bytes = changeset.payload_bytes(),
            "frame decoded"
        );

        Ok(Frame {
            initial,
            root_name,
            changeset,
        })
    }

    /// Consume the decoder, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn read_bool(&mut self, what: &'static str) -> Result<bool, ProtocolError> {
        match self
            .inner
            .read_u8()
            .await
            .map_err(|e| ProtocolError::io(what, e))?
        {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidBool(other)),
        }
    }

    async fn read_count(&mut self, what: &'static str) -> Result<u32, ProtocolError> {
        let count = self
            .inner
            .read_i32()
            .await
            .map_err(|e| ProtocolError::io(what, e))?;
        u32::try_from(count).map_err(|_| ProtocolError::Negative {
            what,
            value: i64::from(count),
        })
    }

    async fn read_string(&mut self, what: &'static str) -> Result<String, ProtocolError> {
        let len = self
            .inner
            .read_u32()
            .await
            .map_err(|e| ProtocolError::io(what, e))?;
        if len as usize > self.max_string_len {
            return Err(ProtocolError::StringTooLong {
                len: u64::from(len),
                limit: self.max_string_len,
            });
        }

        let mut buf = vec![0u8; len as usize];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(|e| ProtocolError::io(what, e))?;
        String::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8)
    }

    async fn read_path(&mut self) -> Result<RelativePath, ProtocolError> {
        let raw = self.read_string("path").await?;
        let parsed = match RelativePath::parse(&raw) {
            Ok(path) if path.is_root() => Err(PathError::EmptyComponent),
            other => other,
        };
        parsed.map_err(|source| ProtocolError::InvalidPath { path: raw, source })
    }

    async fn read_file(&mut self) -> Result<FileChange, ProtocolError> {
        let size = self
            .inner
            .read_i64()
            .await
            .map_err(|e| ProtocolError::io("file size", e))?;
        let size = u64::try_from(size).map_err(|_| ProtocolError::Negative {
            what: "file size",
            value: size,
        })?;
        let path = self.read_path().await?;

        // Grows with the data actually received rather than the declared size.
        let mut bytes = Vec::new();
        (&mut self.inner)
            .take(size)
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| ProtocolError::io("payload", e))?;
        if (bytes.len() as u64) < size {
            return Err(ProtocolError::TruncatedPayload {
                path: path.to_string(),
                expected: size,
                actual: bytes.len() as u64,
            });
        }

        Ok(FileChange::in_memory(path, bytes))
    }
}

//! Frame encoder.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use mirrortree_core::{FileChange, Payload};

use crate::error::ProtocolError;
use crate::frame::Frame;

/// Chunk size used when streaming file payloads.
const CHUNK_SIZE: usize = 64 * 1024;

/// Writes frames onto an async byte stream.
pub struct FrameEncoder<W> {
    inner: W,
    io_timeout: Option<Duration>,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin> FrameEncoder<W> {
    /// Create an encoder with no write timeout.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            io_timeout: None,
            bytes_written: 0,
        }
    }

    /// Fail any single write that takes longer than `limit`.
    pub fn with_io_timeout(mut self, limit: Duration) -> Self {
        self.io_timeout = Some(limit);
        self
    }

    /// Encode one frame and flush it, returning the number of bytes written.
    ///
    /// File payloads are streamed from disk; a file that yields fewer bytes
    /// than recorded at snapshot time abandons the frame.
    pub async fn encode(&mut self, frame: &Frame) -> Result<u64, ProtocolError> {
        self.bytes_written = 0;
        let changes = &frame.changeset;

        self.write_bool(frame.initial).await?;
        self.write_string(&frame.root_name).await?;

        self.write_bool(!changes.has_created()).await?;
        if changes.has_created() {
            self.write_count("directory count", changes.created_dirs.len())
                .await?;
            for dir in &changes.created_dirs {
                self.write_string(dir.as_str()).await?;
            }
            self.write_count("file count", changes.created_files.len())
                .await?;
            for file in &changes.created_files {
                self.write_file(file).await?;
            }
        }

        self.write_bool(changes.deleted.is_empty()).await?;
        if !changes.deleted.is_empty() {
            self.write_count("deleted count", changes.deleted.len())
                .await?;
            for path in &changes.deleted {
                self.write_string(path.as_str()).await?;
            }
        }

        self.write_bool(changes.modified.is_empty()).await?;
        if !changes.modified.is_empty() {
            self.write_count("modified count", changes.modified.len())
                .await?;
            for file in &changes.modified {
                self.write_file(file).await?;
            }
        }

        let flush = self.inner.flush();
        let flushed = match self.io_timeout {
            Some(limit) => timeout(limit, flush)
                .await
                .map_err(|_| ProtocolError::Timeout(limit))?,
            None => flush.await,
        };
        flushed.map_err(|e| ProtocolError::io("flushing frame", e))?;

        debug!(
            root = %frame.root_name,
            initial = frame.initial,
            bytes = self.bytes_written,
            "frame encoded"
        );
        Ok(self.bytes_written)
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the encoder, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), ProtocolError> {
        let write = self.inner.write_all(buf);
        let written = match self.io_timeout {
            Some(limit) => timeout(limit, write)
                .await
                .map_err(|_| ProtocolError::Timeout(limit))?,
            None => write.await,
        };
        written.map_err(|e| ProtocolError::io("writing frame", e))?;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    async fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.write_all(&[u8::from(value)]).await
    }

    async fn write_count(&mut self, what: &'static str, count: usize) -> Result<(), ProtocolError> {
        let count = i32::try_from(count).map_err(|_| ProtocolError::Overflow {
            what,
            value: count as u64,
        })?;
        self.write_all(&count.to_be_bytes()).await
    }

    async fn write_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        let len = u32::try_from(value.len()).map_err(|_| ProtocolError::Overflow {
            what: "string length",
            value: value.len() as u64,
        })?;
        self.write_all(&len.to_be_bytes()).await?;
        self.write_all(value.as_bytes()).await
    }

    async fn write_file(&mut self, file: &FileChange) -> Result<(), ProtocolError> {
        let size = i64::try_from(file.size).map_err(|_| ProtocolError::Overflow {
            what: "file size",
            value: file.size,
        })?;

        match &file.payload {
            Payload::Bytes(bytes) => {
                if bytes.len() as u64 != file.size {
                    return Err(ProtocolError::SizeMismatch {
                        path: file.path.to_string(),
                        declared: file.size,
                        actual: bytes.len() as u64,
                    });
                }
                self.write_all(&size.to_be_bytes()).await?;
                self.write_string(file.path.as_str()).await?;
                self.write_all(bytes).await
            }
            Payload::File(source) => {
                // Open before the header goes out so a vanished file fails cleanly.
                let reader = tokio::fs::File::open(source)
                    .await
                    .map_err(|e| ProtocolError::Source {
                        path: source.clone(),
                        source: e,
                    })?;
                self.write_all(&size.to_be_bytes()).await?;
                self.write_string(file.path.as_str()).await?;
                self.stream_file(reader, source, file.size).await
            }
        }
    }

    /// Copy exactly `size` bytes of `reader` to the stream.
    async fn stream_file(
        &mut self,
        mut reader: tokio::fs::File,
        source: &Path,
        size: u64,
    ) -> Result<(), ProtocolError> {
        let mut buffer = vec![0u8; chunk_len(size)];
        let mut remaining = size;

        while remaining > 0 {
            let want = remaining.min(buffer.len() as u64) as usize;
            let read = match reader.read(&mut buffer[..want]).await {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ProtocolError::Source {
                        path: source.to_path_buf(),
                        source: e,
                    });
                }
            };
            if read == 0 {
                return Err(ProtocolError::SourceTruncated {
                    path: source.to_path_buf(),
                    expected: size,
                    actual: size - remaining,
                });
            }
            self.write_all(&buffer[..read]).await?;
            remaining -= read as u64;
        }

        Ok(())
    }
}

/// Buffer length for streaming a payload of `size` bytes.
fn chunk_len(size: u64) -> usize {
    usize::try_from(size).map_or(CHUNK_SIZE, |size| size.min(CHUNK_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrortree_core::{Changeset, Fingerprint, RelativePath};
    use std::fs;
    use tempfile::TempDir;

    fn rel(path: &str) -> RelativePath {
        RelativePath::parse(path).unwrap()
    }

    async fn encode(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.encode(frame).await?;
        Ok(encoder.into_inner())
    }

    #[test]
    fn test_chunk_len_is_bounded() {
        assert_eq!(chunk_len(0), 0);
        assert_eq!(chunk_len(5), 5);
        assert_eq!(chunk_len(CHUNK_SIZE as u64 + 1), CHUNK_SIZE);
        assert_eq!(chunk_len(u64::MAX), CHUNK_SIZE);
        assert_eq!(chunk_len(u64::from(u32::MAX) + 1), CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_empty_incremental_frame_layout() {
        let bytes = encode(&Frame::incremental("r", Changeset::new())).await.unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 1, b'r', 1, 1, 1]);
    }

    #[tokio::test]
    async fn test_created_section_layout() {
        let mut changes = Changeset::new();
        changes.created_dirs.push(rel("b"));
        changes
            .created_files
            .push(FileChange::in_memory(rel("b/c"), b"x".to_vec()));

        let bytes = encode(&Frame::initial("r", changes)).await.unwrap();

        let parts: [&[u8]; 11] = [
            &[1],
            &[0, 0, 0, 1, b'r'],
            &[0],
            &[0, 0, 0, 1],
            &[0, 0, 0, 1, b'b'],
            &[0, 0, 0, 1],
            &[0, 0, 0, 0, 0, 0, 0, 1],
            &[0, 0, 0, 3, b'b', b'/', b'c'],
            b"x",
            // deleted and modified are empty
            &[1],
            &[1],
        ];
        let expected = parts.concat();
        assert_eq!(bytes, expected);
    }

    #[tokio::test]
    async fn test_streams_file_payload() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("big.bin");
        let content = vec![0x5a; CHUNK_SIZE * 2 + 3];
        fs::write(&source, &content).unwrap();

        let mut changes = Changeset::new();
        changes.modified.push(FileChange::on_disk(
            rel("big.bin"),
            content.len() as u64,
            Fingerprint::new([0; 32]),
            &source,
        ));

        let mut encoder = FrameEncoder::new(Vec::new());
        let written = encoder.encode(&Frame::incremental("r", changes)).await.unwrap();
        let bytes = encoder.into_inner();

        assert_eq!(written, bytes.len() as u64);
        assert!(bytes.ends_with(&content));
    }

    #[tokio::test]
    async fn test_shrunken_source_abandons_frame() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, "short").unwrap();

        let mut changes = Changeset::new();
        changes.created_files.push(FileChange::on_disk(
            rel("a.txt"),
            100,
            Fingerprint::new([0; 32]),
            &source,
        ));

        let err = encode(&Frame::initial("r", changes)).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::SourceTruncated {
                expected: 100,
                actual: 5,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_vanished_source() {
        let temp = TempDir::new().unwrap();
        let mut changes = Changeset::new();
        changes.created_files.push(FileChange::on_disk(
            rel("gone"),
            1,
            Fingerprint::new([0; 32]),
            temp.path().join("gone"),
        ));

        let err = encode(&Frame::initial("r", changes)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Source { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_size_mismatch() {
        let mut file = FileChange::in_memory(rel("a"), b"abc".to_vec());
        file.size = 4;
        let mut changes = Changeset::new();
        changes.modified.push(file);

        let err = encode(&Frame::incremental("r", changes)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::SizeMismatch { declared: 4, actual: 3, .. }));
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let mut file = FileChange::in_memory(rel("a"), Vec::new());
        file.size = u64::MAX;
        let mut changes = Changeset::new();
        changes.modified.push(file);

        let err = encode(&Frame::incremental("r", changes)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Overflow { what: "file size", .. }));
    }
}

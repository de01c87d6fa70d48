//! BLAKE3 content fingerprinting.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use mirrortree_core::Fingerprint;

/// Read buffer size for hashing.
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Fingerprint and byte count of one file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDigest {
    /// Content fingerprint.
    pub fingerprint: Fingerprint,
    /// Number of bytes that were hashed.
    pub size: u64,
}

/// A file could not be read to completion.
#[derive(Debug, Error)]
#[error("Failed to fingerprint {}: {source}", path.display())]
pub struct HashError {
    /// File that failed.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// Fingerprint an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> Fingerprint {
    Fingerprint::new(*blake3::hash(data).as_bytes())
}

/// Fingerprint everything a reader yields until EOF.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<FileDigest> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok(FileDigest {
        fingerprint: Fingerprint::new(*hasher.finalize().as_bytes()),
        size,
    })
}

/// Fingerprint a file on disk.
pub fn hash_file(path: &Path) -> Result<FileDigest, HashError> {
    let to_error = |source| HashError {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(to_error)?;
    hash_reader(file).map_err(to_error)
}

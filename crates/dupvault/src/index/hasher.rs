use crate::db::FileRecord;
use crate::error::{DupvaultError, Result};
use chrono::{DateTime, Duration, Utc};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 64 * 1024;

/// Default tolerance for timestamp comparison. Absorbs filesystem rounding, not edits.
pub const DEFAULT_TIMESTAMP_EPSILON_MS: i64 = 1;

/// Decides when a stored content hash may stand in for re-reading a file.
#[derive(Debug, Clone, Copy)]
pub struct HashCache {
    epsilon: Duration,
}

impl Default for HashCache {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_TIMESTAMP_EPSILON_MS))
    }
}

impl HashCache {
    pub fn new(epsilon: Duration) -> Self {
        Self { epsilon }
    }

    /// True when sizes are equal and both creation and modification times lie
    /// strictly within epsilon of the stored values. A timestamp the platform
    /// cannot report on either side only matches another missing timestamp.
    pub fn should_reuse(&self, existing: &FileRecord, observed: &FileRecord) -> bool {
        existing.size_bytes == observed.size_bytes
            && self.close(existing.created_at, observed.created_at)
            && self.close(existing.modified_at, observed.modified_at)
    }

    /// The stored hash, if [`should_reuse`](Self::should_reuse) allows it.
    pub fn cached_hash(&self, existing: &FileRecord, observed: &FileRecord) -> Option<String> {
        if self.should_reuse(existing, observed) {
            existing.content_hash.clone()
        } else {
            None
        }
    }

    pub fn hash(&self, path: &Path) -> Result<String> {
        hash_file(path)
    }

    fn close(&self, a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a - b < self.epsilon && b - a < self.epsilon,
            (None, None) => true,
            _ => false,
        }
    }
}

/// Computes the BLAKE3 hash of a file
///
/// Streams the file through a fixed 64 KiB buffer, so memory use does not grow
/// with file size.
pub fn hash_file<P: AsRef<Path>>(path: P) -> Result<String> {
    hash_file_with_progress(path, |_, _| {})
}

/// Computes the BLAKE3 hash with progress reporting
///
/// The callback receives (bytes_processed, total_bytes) after every read.
pub fn hash_file_with_progress<P, F>(path: P, mut progress: F) -> Result<String>
where
    P: AsRef<Path>,
    F: FnMut(u64, u64),
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DupvaultError::FileNotFound(path.to_path_buf()),
        _ => DupvaultError::Io(e),
    })?;
    let total_size = file.metadata()?.len();
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_processed = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        bytes_processed += bytes_read as u64;
        progress(bytes_processed, total_size);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Verifies that a file matches an expected hash
pub fn verify_hash<P: AsRef<Path>>(path: P, expected_hash: &str) -> Result<()> {
    let actual_hash = hash_file(path)?;

    if actual_hash.eq_ignore_ascii_case(expected_hash) {
        Ok(())
    } else {
        Err(DupvaultError::HashMismatch {
            expected: expected_hash.to_string(),
            actual: actual_hash,
        })
    }
}

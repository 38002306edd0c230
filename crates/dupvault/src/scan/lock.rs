use crate::error::{DupvaultError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Advisory lock held for the duration of a scan over one root set.
///
/// The lock file sits next to the database and is named after a digest of the
/// sorted root set, so scans of different root sets do not block each other.
#[derive(Debug)]
pub struct ScanLock {
    file: File,
    path: PathBuf,
}

impl ScanLock {
    pub fn lock_path(db_path: &Path, roots: &[PathBuf]) -> PathBuf {
        let mut keys: Vec<String> = roots
            .iter()
            .map(|r| r.to_string_lossy().to_lowercase())
            .collect();
        keys.sort();
        keys.dedup();

        let digest = blake3::hash(keys.join("\n").as_bytes()).to_hex();
        let mut name = db_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "dupvault".to_string());
        name.push_str(&format!(".{}.lock", &digest[..16]));

        db_path.with_file_name(name)
    }

    /// Takes the lock without waiting. Fails with [`DupvaultError::ScanInProgress`]
    /// when another process holds it.
    pub fn acquire(db_path: &Path, roots: &[PathBuf]) -> Result<Self> {
        let path = Self::lock_path(db_path, roots);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        try_lock(&file, &path)?;
        log::debug!("Acquired scan lock {}", path.display());

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock(file: &File, path: &Path) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            return Err(DupvaultError::ScanInProgress(path.to_path_buf()));
        }
        return Err(DupvaultError::Io(err));
    }
    Ok(())
}

#[cfg(not(unix))]
fn try_lock(_file: &File, _path: &Path) -> Result<()> {
    Ok(())
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

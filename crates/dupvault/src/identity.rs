use crate::db::{FileRecord, FileState};
use crate::error::{DupvaultError, Result};
use crate::volume::VolumeCatalog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Platform file identity: a volume identifier paired with the file-system
/// record index of the file on that volume.
///
/// Stable across renames and moves within one volume. The text form is
/// `volume@index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NativeFileId {
    volume: String,
    index: u64,
}

impl NativeFileId {
    pub fn new(volume: impl Into<String>, index: u64) -> Self {
        Self {
            volume: volume.into(),
            index,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (volume, index) = s.rsplit_once('@')?;
        if volume.is_empty() {
            return None;
        }
        let index = index.parse().ok()?;
        Some(Self::new(volume, index))
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn index(&self) -> u64 {
        self.index
    }
}

impl fmt::Display for NativeFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.volume, self.index)
    }
}

impl From<NativeFileId> for String {
    fn from(id: NativeFileId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for NativeFileId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        NativeFileId::parse(&value).ok_or_else(|| format!("invalid native file id: {}", value))
    }
}

/// Source of native file identities.
pub trait IdentityProvider: Send + Sync {
    fn identity_of(&self, path: &Path) -> Result<NativeFileId>;
}

/// Uses the device number and inode reported by `stat`.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixIdentityProvider;

#[cfg(unix)]
impl IdentityProvider for UnixIdentityProvider {
    fn identity_of(&self, path: &Path) -> Result<NativeFileId> {
        use std::os::unix::fs::MetadataExt;

        let metadata = std::fs::symlink_metadata(path).map_err(|e| DupvaultError::NativeIdentity {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(NativeFileId::new(format!("{:x}", metadata.dev()), metadata.ino()))
    }
}

/// Maps absolute paths to volume-relative identities and back.
pub struct FileIdentityResolver<'a> {
    catalog: &'a VolumeCatalog,
    provider: &'a dyn IdentityProvider,
}

impl<'a> FileIdentityResolver<'a> {
    pub fn new(catalog: &'a VolumeCatalog, provider: &'a dyn IdentityProvider) -> Self {
        Self { catalog, provider }
    }

    /// Builds an unsaved [`FileRecord`] for `path`.
    ///
    /// Fails when the file cannot be stat'ed or lies on no known volume. A failed
    /// native lookup is not an error: the record comes back without a native id
    /// and with the cause in `status`.
    pub fn resolve(&self, path: &Path) -> Result<FileRecord> {
        let root = self
            .catalog
            .root_for(path)
            .ok_or_else(|| DupvaultError::NoVolumeForRoot(path.to_path_buf()))?;

        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(DupvaultError::FileNotFound(path.to_path_buf()));
        }

        let (native_file_id, status) = match self.provider.identity_of(path) {
            Ok(id) => (Some(id), None),
            Err(e) => {
                log::warn!("Native identity unavailable for {}: {}", path.display(), e);
                (None, Some(format!("native id unavailable: {}", e)))
            }
        };

        Ok(FileRecord {
            id: 0,
            volume_id: root.volume.serial.clone(),
            base_path: root.base_path.to_string(),
            abs_path: Some(path.to_string_lossy().to_string()),
            native_file_id,
            size_bytes: metadata.len() as i64,
            created_at: metadata.created().ok().map(DateTime::<Utc>::from),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            content_hash: None,
            exists: true,
            state: FileState::New,
            status,
            last_seen: Utc::now(),
        })
    }

    /// Best-effort absolute path for a stored record: the volume's first current
    /// root joined with the base path. `None` when the volume is not mounted.
    pub fn reconstruct_path(&self, volume_id: &str, base_path: &str) -> Option<PathBuf> {
        self.catalog.reconstruct_path(volume_id, base_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_id_text_form() {
        let id = NativeFileId::new("803", 1234);
        assert_eq!(id.to_string(), "803@1234");
        assert_eq!(NativeFileId::parse("803@1234"), Some(id));
    }

    #[test]
    fn test_native_id_volume_may_contain_at() {
        let id = NativeFileId::parse("user@host@99").unwrap();
        assert_eq!(id.volume(), "user@host");
        assert_eq!(id.index(), 99);
    }

    #[test]
    fn test_native_id_rejects_malformed() {
        assert!(NativeFileId::parse("no-separator").is_none());
        assert!(NativeFileId::parse("@12").is_none());
        assert!(NativeFileId::parse("vol@abc").is_none());
    }

    #[test]
    fn test_native_id_serializes_as_string() {
        let id = NativeFileId::new("vol", 5);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"vol@5\"");
        let back: NativeFileId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_identity_survives_rename() {
        let dir = tempfile::tempdir().unwrap();
        let before = dir.path().join("before.txt");
        let after = dir.path().join("after.txt");
        std::fs::write(&before, b"content").unwrap();

        let provider = UnixIdentityProvider;
        let original = provider.identity_of(&before).unwrap();
        std::fs::rename(&before, &after).unwrap();
        assert_eq!(provider.identity_of(&after).unwrap(), original);
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_identity_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = UnixIdentityProvider.identity_of(&dir.path().join("absent"));
        assert!(matches!(result, Err(DupvaultError::NativeIdentity { .. })));
    }
}

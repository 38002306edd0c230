#![allow(dead_code)]

use dupvault_lib::{
    Database, DupvaultError, FileRecord, FileReport, IdentityProvider, MountedVolume,
    NativeFileId, Result, ScanOptions, ScanOrchestrator, ScanSummary, SqliteDatabase,
    UnixIdentityProvider, VolumeCatalog, VolumeSource,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TEST_SERIAL: &str = "test-volume";

/// Reports a fixed set of volumes.
pub struct StaticVolumeSource {
    pub volumes: Vec<MountedVolume>,
}

impl StaticVolumeSource {
    pub fn single(serial: &str, root: &Path) -> Self {
        Self {
            volumes: vec![MountedVolume {
                serial: serial.to_string(),
                label: "TESTDISK".to_string(),
                fs_type: Some("ext4".to_string()),
                roots: vec![root.to_string_lossy().to_string()],
                free_bytes: Some(1 << 30),
                total_bytes: Some(1 << 31),
            }],
        }
    }

    pub fn empty() -> Self {
        Self {
            volumes: Vec::new(),
        }
    }
}

impl VolumeSource for StaticVolumeSource {
    fn mounted_volumes(&self) -> Result<Vec<MountedVolume>> {
        Ok(self.volumes.clone())
    }
}

/// Identity provider that always fails, as on filesystems without stable ids.
pub struct NoNativeIdentity;

impl IdentityProvider for NoNativeIdentity {
    fn identity_of(&self, path: &Path) -> Result<NativeFileId> {
        Err(DupvaultError::NativeIdentity {
            path: path.to_path_buf(),
            message: "not supported".to_string(),
        })
    }
}

/// A temporary directory registered as one mounted volume, with the store
/// kept inside it and scan data under `data/`.
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub db: SqliteDatabase,
    pub catalog: VolumeCatalog,
}

impl TestFixture {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let root = temp_dir.path().canonicalize()?;
        let db_path = root.join("test.db");

        let mut db = SqliteDatabase::open(&db_path)?;
        db.initialize()?;

        let mut catalog = VolumeCatalog::new();
        catalog.refresh(&mut db, &StaticVolumeSource::single(TEST_SERIAL, &root))?;

        Ok(Self {
            temp_dir,
            root,
            db_path,
            db,
            catalog,
        })
    }

    pub fn data(&self, rel: &str) -> PathBuf {
        self.root.join("data").join(rel)
    }

    pub fn quarantine(&self) -> PathBuf {
        self.root.join("quarantine")
    }

    pub fn write_file(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.data(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn options(&self) -> ScanOptions {
        ScanOptions {
            quarantine_root: Some(self.quarantine()),
            ..ScanOptions::default()
        }
    }

    pub fn scan(
        &mut self,
        roots: &[PathBuf],
        options: ScanOptions,
    ) -> Result<(ScanSummary, Vec<FileReport>)> {
        self.scan_with(&UnixIdentityProvider, roots, options)
    }

    pub fn scan_with(
        &mut self,
        provider: &dyn IdentityProvider,
        roots: &[PathBuf],
        options: ScanOptions,
    ) -> Result<(ScanSummary, Vec<FileReport>)> {
        let mut reports = Vec::new();
        let summary = {
            let mut orchestrator = ScanOrchestrator::new(&mut self.db, &self.catalog, provider, options)
                .with_reporter(|report| reports.push(report.clone()));
            orchestrator.run(roots)?
        };
        Ok((summary, reports))
    }

    pub fn clean(
        &mut self,
        root: &Path,
        options: ScanOptions,
    ) -> Result<(ScanSummary, Vec<FileReport>)> {
        let provider = UnixIdentityProvider;
        let mut reports = Vec::new();
        let summary = {
            let mut orchestrator =
                ScanOrchestrator::new(&mut self.db, &self.catalog, &provider, options)
                    .with_reporter(|report| reports.push(report.clone()));
            orchestrator.clean(root)?
        };
        Ok((summary, reports))
    }

    /// Active record for a path relative to `data/`.
    pub fn record(&self, rel: &str) -> Option<FileRecord> {
        self.db
            .find_file(TEST_SERIAL, &format!("data/{}", rel))
            .unwrap()
    }

    pub fn active_records(&self) -> Vec<FileRecord> {
        self.db.list_files_by_volume(TEST_SERIAL).unwrap()
    }
}

/// `data/`-relative path of a report, for comparing passes over different fixtures.
pub fn relative(fixture: &TestFixture, path: &Path) -> String {
    path.strip_prefix(fixture.root.join("data"))
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

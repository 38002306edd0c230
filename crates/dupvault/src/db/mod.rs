pub mod files;
pub mod history;
pub mod schema;
pub mod volumes;

use crate::error::{DupvaultError, Result};
use crate::identity::NativeFileId;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeRecord {
    pub id: i64,
    pub serial: String,
    pub label: String,
    pub fs_type: Option<String>,
    /// Current mount roots, refreshed every run. Each root ends with a separator.
    pub roots: Vec<String>,
    pub free_bytes: Option<i64>,
    pub total_bytes: Option<i64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One logical file, keyed by `(volume_id, base_path)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub volume_id: String,
    pub base_path: String,
    /// Absolute path this record was observed at during the current session. Not persisted.
    #[serde(skip)]
    pub abs_path: Option<String>,
    pub native_file_id: Option<NativeFileId>,
    pub size_bytes: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub content_hash: Option<String>,
    pub exists: bool,
    pub state: FileState,
    pub status: Option<String>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileState {
    New,
    Cached,
    Stale,
    Missing,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::New => "new",
            FileState::Cached => "cached",
            FileState::Stale => "stale",
            FileState::Missing => "missing",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(FileState::New),
            "cached" => Ok(FileState::Cached),
            "stale" => Ok(FileState::Stale),
            "missing" => Ok(FileState::Missing),
            _ => Err(DupvaultError::Config(format!("Invalid file state: {}", s))),
        }
    }
}

/// Frozen copy of a [`FileRecord`] taken when its file was confirmed missing.
/// `file.id` is the id the record had in the active table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub file: FileRecord,
    pub archived_at: DateTime<Utc>,
}

pub trait Database {
    fn initialize(&mut self) -> Result<()>;

    fn get_volume(&self, serial: &str) -> Result<Option<VolumeRecord>>;
    fn list_volumes(&self) -> Result<Vec<VolumeRecord>>;
    fn add_volume(&mut self, volume: &VolumeRecord) -> Result<i64>;
    fn update_volume(&mut self, volume: &VolumeRecord) -> Result<()>;

    fn find_file(&self, volume_id: &str, base_path: &str) -> Result<Option<FileRecord>>;
    fn find_files_by_native_id(
        &self,
        volume_id: &str,
        native_id: &NativeFileId,
    ) -> Result<Vec<FileRecord>>;
    fn find_files_by_hash(&self, hash: &str) -> Result<Vec<FileRecord>>;
    fn list_files_by_volume(&self, volume_id: &str) -> Result<Vec<FileRecord>>;
    fn add_file(&mut self, file: &FileRecord) -> Result<i64>;
    fn update_file(&mut self, file: &FileRecord) -> Result<()>;

    /// Copies `file` into history and removes it from the active table.
    /// Returns `false` when history already held this record.
    fn archive_file(&mut self, file: &FileRecord) -> Result<bool>;
    fn list_history(&self, limit: Option<u32>) -> Result<Vec<HistoryRecord>>;
}

pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl Database for SqliteDatabase {
    fn initialize(&mut self) -> Result<()> {
        schema::initialize_schema(&self.conn)
    }

    fn get_volume(&self, serial: &str) -> Result<Option<VolumeRecord>> {
        volumes::get_volume(&self.conn, serial)
    }

    fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        volumes::list_volumes(&self.conn)
    }

    fn add_volume(&mut self, volume: &VolumeRecord) -> Result<i64> {
        volumes::add_volume(&self.conn, volume)
    }

    fn update_volume(&mut self, volume: &VolumeRecord) -> Result<()> {
        volumes::update_volume(&self.conn, volume)
    }

    fn find_file(&self, volume_id: &str, base_path: &str) -> Result<Option<FileRecord>> {
        files::find_file(&self.conn, volume_id, base_path)
    }

    fn find_files_by_native_id(
        &self,
        volume_id: &str,
        native_id: &NativeFileId,
    ) -> Result<Vec<FileRecord>> {
        files::find_files_by_native_id(&self.conn, volume_id, native_id)
    }

    fn find_files_by_hash(&self, hash: &str) -> Result<Vec<FileRecord>> {
        files::find_files_by_hash(&self.conn, hash)
    }

    fn list_files_by_volume(&self, volume_id: &str) -> Result<Vec<FileRecord>> {
        files::list_files_by_volume(&self.conn, volume_id)
    }

    fn add_file(&mut self, file: &FileRecord) -> Result<i64> {
        files::add_file(&self.conn, file)
    }

    fn update_file(&mut self, file: &FileRecord) -> Result<()> {
        files::update_file(&self.conn, file)
    }

    fn archive_file(&mut self, file: &FileRecord) -> Result<bool> {
        history::archive_file(&mut self.conn, file)
    }

    fn list_history(&self, limit: Option<u32>) -> Result<Vec<HistoryRecord>> {
        history::list_history(&self.conn, limit)
    }
}

pub(crate) fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| {
            DateTime::parse_from_rfc3339(&s).ok().or_else(|| {
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).fixed_offset())
            })
        })
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> SqliteDatabase {
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_file_state_round_trip() {
        for state in [FileState::New, FileState::Cached, FileState::Stale, FileState::Missing] {
            assert_eq!(FileState::from_str(state.as_str()).unwrap(), state);
        }
        assert!(FileState::from_str("archived").is_err());
    }

    #[test]
    fn test_parse_timestamp_accepts_sqlite_default() {
        let parsed = parse_timestamp(Some("2024-03-01 10:20:30".to_string())).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T10:20:30+00:00");
        assert!(parse_timestamp(None).is_none());
        assert!(parse_timestamp(Some("garbage".to_string())).is_none());
    }

    #[test]
    fn test_volume_crud_through_trait() {
        let mut db = create_test_db();

        let volume = VolumeRecord {
            id: 0,
            serial: "ABCD-1234".to_string(),
            label: "Books".to_string(),
            fs_type: Some("ntfs".to_string()),
            roots: vec!["/mnt/books/".to_string()],
            free_bytes: Some(10),
            total_bytes: Some(100),
            first_seen: Utc::now(),
            last_seen: Some(Utc::now()),
        };

        let id = db.add_volume(&volume).unwrap();
        assert!(id > 0);

        let stored = db.get_volume("ABCD-1234").unwrap().unwrap();
        assert_eq!(stored.label, "Books");
        assert_eq!(stored.roots, vec!["/mnt/books/".to_string()]);
        assert_eq!(db.list_volumes().unwrap().len(), 1);
    }
}

use crate::db::{Database, FileState};
use crate::error::Result;
use crate::volume::VolumeCatalog;
use std::path::Path;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileStats {
    pub checked: usize,
    pub present: usize,
    pub archived: usize,
    /// Missing records whose history row already existed.
    pub already_archived: usize,
    pub skipped_volumes: usize,
}

/// Archives active records of `volume_ids` whose file is gone.
///
/// Only the listed volumes are examined; a volume without a current root is
/// skipped, since an unmounted volume says nothing about its files. Each
/// archive is a single transaction, so an interrupted pass leaves every
/// record either active or archived.
pub fn reconcile<D: Database + ?Sized>(
    db: &mut D,
    catalog: &VolumeCatalog,
    volume_ids: &[String],
) -> Result<ReconcileStats> {
    let mut stats = ReconcileStats::default();

    for volume_id in volume_ids {
        if catalog.roots_of(volume_id).is_empty() {
            log::warn!("Skipping reconciliation of unmounted volume {}", volume_id);
            stats.skipped_volumes += 1;
            continue;
        }

        for mut record in db.list_files_by_volume(volume_id)? {
            stats.checked += 1;

            let present = catalog
                .reconstruct_path(volume_id, &record.base_path)
                .map(|path| is_present(&path))
                .unwrap_or(false);

            if present {
                stats.present += 1;
                continue;
            }

            record.exists = false;
            record.state = FileState::Missing;

            if db.archive_file(&record)? {
                log::info!("Archived missing file {}:{}", volume_id, record.base_path);
                stats.archived += 1;
            } else {
                log::debug!(
                    "History already holds {}:{}, removed active record",
                    volume_id,
                    record.base_path
                );
                stats.already_archived += 1;
            }
        }
    }

    Ok(stats)
}

fn is_present(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FileRecord, SqliteDatabase, VolumeRecord};
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_db() -> SqliteDatabase {
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn volume(serial: &str, roots: Vec<String>) -> VolumeRecord {
        VolumeRecord {
            id: 0,
            serial: serial.to_string(),
            label: serial.to_string(),
            fs_type: None,
            roots,
            free_bytes: None,
            total_bytes: None,
            first_seen: Utc::now(),
            last_seen: None,
        }
    }

    fn add(db: &mut SqliteDatabase, volume_id: &str, base_path: &str) -> i64 {
        db.add_file(&FileRecord {
            id: 0,
            volume_id: volume_id.to_string(),
            base_path: base_path.to_string(),
            abs_path: None,
            native_file_id: None,
            size_bytes: 3,
            created_at: None,
            modified_at: None,
            content_hash: Some("h".to_string()),
            exists: true,
            state: FileState::Cached,
            status: None,
            last_seen: Utc::now(),
        })
        .unwrap()
    }

    fn root_of(dir: &TempDir) -> String {
        format!("{}/", dir.path().display())
    }

    #[test]
    fn test_missing_file_is_archived_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.txt"), b"abc").unwrap();

        let mut db = create_test_db();
        add(&mut db, "vol", "keep.txt");
        let gone_id = add(&mut db, "vol", "gone.txt");

        let catalog = VolumeCatalog::from_volumes(vec![volume("vol", vec![root_of(&dir)])]);
        let stats = reconcile(&mut db, &catalog, &["vol".to_string()]).unwrap();

        assert_eq!(stats.checked, 2);
        assert_eq!(stats.present, 1);
        assert_eq!(stats.archived, 1);

        let history = db.list_history(None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].file.id, gone_id);
        assert!(db.find_file("vol", "gone.txt").unwrap().is_none());
        assert!(db.find_file("vol", "keep.txt").unwrap().is_some());

        let again = reconcile(&mut db, &catalog, &["vol".to_string()]).unwrap();
        assert_eq!(again.archived, 0);
        assert_eq!(db.list_history(None).unwrap().len(), 1);
    }

    #[test]
    fn test_unscanned_volume_untouched() {
        let dir = TempDir::new().unwrap();
        let mut db = create_test_db();
        add(&mut db, "scanned", "a.txt");
        add(&mut db, "other", "b.txt");

        let catalog = VolumeCatalog::from_volumes(vec![
            volume("scanned", vec![root_of(&dir)]),
            volume("other", vec![root_of(&dir)]),
        ]);
        reconcile(&mut db, &catalog, &["scanned".to_string()]).unwrap();

        assert!(db.find_file("scanned", "a.txt").unwrap().is_none());
        assert!(db.find_file("other", "b.txt").unwrap().is_some());
    }

    #[test]
    fn test_unmounted_volume_skipped() {
        let mut db = create_test_db();
        add(&mut db, "usb", "a.txt");

        let catalog = VolumeCatalog::new();
        let stats = reconcile(&mut db, &catalog, &["usb".to_string()]).unwrap();

        assert_eq!(stats.skipped_volumes, 1);
        assert!(db.find_file("usb", "a.txt").unwrap().is_some());
    }
}

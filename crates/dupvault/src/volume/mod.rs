pub mod mountinfo;

pub use mountinfo::MountInfoSource;

use crate::db::{Database, VolumeRecord};
use crate::error::Result;
use chrono::Utc;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Labels that mark firmware or system partitions.
const SYSTEM_LABELS: &[&str] = &["EFI", "System Reserved", "SYSTEM"];

/// A volume as reported by the operating system for this run.
#[derive(Debug, Clone, PartialEq)]
pub struct MountedVolume {
    pub serial: String,
    pub label: String,
    pub fs_type: Option<String>,
    pub roots: Vec<String>,
    pub free_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

pub trait VolumeSource {
    fn mounted_volumes(&self) -> Result<Vec<MountedVolume>>;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RefreshReport {
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    /// Serials whose stored label differed from the mounted one.
    pub relabelled: Vec<String>,
    pub excluded: usize,
    pub unmounted: Vec<String>,
}

/// The root a path was matched against and the remainder below it.
#[derive(Debug, Clone, PartialEq)]
pub struct RootMatch<'a> {
    pub volume: &'a VolumeRecord,
    pub root: &'a str,
    pub base_path: String,
}

/// Mounted, non-system volumes known for the current run.
#[derive(Debug, Default, Clone)]
pub struct VolumeCatalog {
    volumes: Vec<VolumeRecord>,
}

impl VolumeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_volumes(volumes: Vec<VolumeRecord>) -> Self {
        Self { volumes }
    }

    /// Re-reads mounted volumes and syncs them into the store.
    ///
    /// New serials are inserted. Known serials get their roots, label and
    /// space figures replaced; a label change is reported but is not an error.
    /// Stored volumes that are no longer mounted lose their roots.
    pub fn refresh<D: Database + ?Sized>(
        &mut self,
        db: &mut D,
        source: &dyn VolumeSource,
    ) -> Result<RefreshReport> {
        let now = Utc::now();
        let mut report = RefreshReport::default();
        let mut volumes: Vec<VolumeRecord> = Vec::new();

        for mounted in source.mounted_volumes()? {
            if is_system_label(&mounted.label) {
                log::debug!(
                    "Excluding system volume {} ({:?})",
                    mounted.serial,
                    mounted.label
                );
                report.excluded += 1;
                continue;
            }

            if volumes.iter().any(|v| v.serial == mounted.serial) {
                log::warn!("Volume {} reported twice, keeping first", mounted.serial);
                continue;
            }

            let mut record = VolumeRecord {
                id: 0,
                serial: mounted.serial.clone(),
                label: mounted.label.clone(),
                fs_type: mounted.fs_type.clone(),
                roots: mounted.roots.iter().map(|r| normalize_root(r)).collect(),
                free_bytes: mounted.free_bytes.map(|b| b as i64),
                total_bytes: mounted.total_bytes.map(|b| b as i64),
                first_seen: now,
                last_seen: Some(now),
            };

            match db.get_volume(&mounted.serial)? {
                Some(existing) => {
                    if existing.label != mounted.label {
                        log::warn!(
                            "Volume {} label changed from {:?} to {:?} (reformatted or relabelled)",
                            mounted.serial,
                            existing.label,
                            mounted.label
                        );
                        report.relabelled.push(mounted.serial.clone());
                    }
                    record.id = existing.id;
                    record.first_seen = existing.first_seen;
                    db.update_volume(&record)?;
                    report.updated.push(mounted.serial.clone());
                }
                None => {
                    log::info!("New volume {} ({})", mounted.serial, mounted.label);
                    record.id = db.add_volume(&record)?;
                    report.inserted.push(mounted.serial.clone());
                }
            }

            volumes.push(record);
        }

        for mut stored in db.list_volumes()? {
            if stored.roots.is_empty() || volumes.iter().any(|v| v.serial == stored.serial) {
                continue;
            }
            log::info!("Volume {} ({}) is not mounted", stored.serial, stored.label);
            stored.roots.clear();
            db.update_volume(&stored)?;
            report.unmounted.push(stored.serial);
        }

        self.volumes = volumes;
        Ok(report)
    }

    pub fn volumes(&self) -> &[VolumeRecord] {
        &self.volumes
    }

    pub fn get(&self, serial: &str) -> Option<&VolumeRecord> {
        self.volumes.iter().find(|v| v.serial == serial)
    }

    /// Current roots of a volume, empty when it is not mounted.
    pub fn roots_of(&self, serial: &str) -> &[String] {
        self.get(serial).map(|v| v.roots.as_slice()).unwrap_or(&[])
    }

    /// Finds the mount root that is the longest case-insensitive prefix of
    /// `path`, matching whole components only. Nested mounts resolve to the
    /// innermost volume.
    pub fn root_for(&self, path: &Path) -> Option<RootMatch<'_>> {
        let path_str = path.to_string_lossy();
        let mut best: Option<RootMatch<'_>> = None;

        for volume in &self.volumes {
            for root in &volume.roots {
                let Some(rest) = strip_root(&path_str, root) else {
                    continue;
                };
                let longer = best.as_ref().map_or(true, |b| root.len() > b.root.len());
                if longer {
                    best = Some(RootMatch {
                        volume,
                        root,
                        base_path: rest.to_string(),
                    });
                }
            }
        }

        best
    }

    pub fn reconstruct_path(&self, serial: &str, base_path: &str) -> Option<PathBuf> {
        self.roots_of(serial)
            .first()
            .map(|root| PathBuf::from(format!("{}{}", root, base_path)))
    }
}

pub fn is_system_label(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || SYSTEM_LABELS.iter().any(|s| s.eq_ignore_ascii_case(label))
}

/// Ensures a root ends with exactly one separator.
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim_end_matches(MAIN_SEPARATOR);
    format!("{}{}", trimmed, MAIN_SEPARATOR)
}

/// Strips `root` (ending with a separator) from `path`, ignoring case.
/// The root directory itself matches with an empty remainder.
fn strip_root<'p>(path: &'p str, root: &str) -> Option<&'p str> {
    if let Some(rest) = strip_prefix_ignore_case(path, root) {
        return Some(rest);
    }
    let bare = root.trim_end_matches(MAIN_SEPARATOR);
    match strip_prefix_ignore_case(path, bare) {
        Some("") if !bare.is_empty() => Some(""),
        _ => None,
    }
}

fn strip_prefix_ignore_case<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let mut chars = path.char_indices();
    for expected in prefix.chars() {
        let (_, c) = chars.next()?;
        if c != expected && !c.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let rest = chars.next().map_or(path.len(), |(i, _)| i);
    Some(&path[rest..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;
    use proptest::prelude::*;

    struct StaticSource(Vec<MountedVolume>);

    impl VolumeSource for StaticSource {
        fn mounted_volumes(&self) -> Result<Vec<MountedVolume>> {
            Ok(self.0.clone())
        }
    }

    fn mounted(serial: &str, label: &str, roots: &[&str]) -> MountedVolume {
        MountedVolume {
            serial: serial.to_string(),
            label: label.to_string(),
            fs_type: Some("ext4".to_string()),
            roots: roots.iter().map(|r| r.to_string()).collect(),
            free_bytes: Some(1),
            total_bytes: Some(2),
        }
    }

    fn record(serial: &str, roots: &[&str]) -> VolumeRecord {
        VolumeRecord {
            id: 0,
            serial: serial.to_string(),
            label: serial.to_string(),
            fs_type: None,
            roots: roots.iter().map(|r| normalize_root(r)).collect(),
            free_bytes: None,
            total_bytes: None,
            first_seen: Utc::now(),
            last_seen: None,
        }
    }

    fn create_test_db() -> SqliteDatabase {
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_system_labels() {
        assert!(is_system_label("EFI"));
        assert!(is_system_label("system reserved"));
        assert!(is_system_label(""));
        assert!(is_system_label("   "));
        assert!(!is_system_label("Photos"));
    }

    #[test]
    fn test_refresh_inserts_and_excludes() {
        let mut db = create_test_db();
        let source = StaticSource(vec![
            mounted("uuid-data", "data", &["/mnt/data"]),
            mounted("uuid-efi", "EFI", &["/boot/efi"]),
        ]);

        let mut catalog = VolumeCatalog::new();
        let report = catalog.refresh(&mut db, &source).unwrap();

        assert_eq!(report.inserted, vec!["uuid-data".to_string()]);
        assert_eq!(report.excluded, 1);
        assert_eq!(catalog.volumes().len(), 1);
        assert_eq!(catalog.roots_of("uuid-data"), &["/mnt/data/".to_string()]);
        assert!(db.get_volume("uuid-efi").unwrap().is_none());
    }

    #[test]
    fn test_refresh_replaces_roots_and_flags_relabel() {
        let mut db = create_test_db();
        let mut catalog = VolumeCatalog::new();
        catalog
            .refresh(&mut db, &StaticSource(vec![mounted("uuid-1", "old", &["/mnt/a", "/mnt/b"])]))
            .unwrap();

        let report = catalog
            .refresh(&mut db, &StaticSource(vec![mounted("uuid-1", "new", &["/media/c"])]))
            .unwrap();

        assert_eq!(report.updated, vec!["uuid-1".to_string()]);
        assert_eq!(report.relabelled, vec!["uuid-1".to_string()]);

        let stored = db.get_volume("uuid-1").unwrap().unwrap();
        assert_eq!(stored.roots, vec!["/media/c/".to_string()]);
        assert_eq!(stored.label, "new");
    }

    #[test]
    fn test_refresh_clears_roots_of_unmounted_volume() {
        let mut db = create_test_db();
        let mut catalog = VolumeCatalog::new();
        catalog
            .refresh(&mut db, &StaticSource(vec![mounted("uuid-1", "usb", &["/media/usb"])]))
            .unwrap();

        let report = catalog.refresh(&mut db, &StaticSource(vec![])).unwrap();
        assert_eq!(report.unmounted, vec!["uuid-1".to_string()]);
        assert!(db.get_volume("uuid-1").unwrap().unwrap().roots.is_empty());
        assert!(catalog.roots_of("uuid-1").is_empty());
    }

    #[test]
    fn test_root_for_prefers_nested_mount() {
        let catalog = VolumeCatalog::from_volumes(vec![
            record("outer", &["/data"]),
            record("inner", &["/data/archive"]),
        ]);

        let m = catalog.root_for(Path::new("/data/archive/2020/a.jpg")).unwrap();
        assert_eq!(m.volume.serial, "inner");
        assert_eq!(m.base_path, "2020/a.jpg");

        let m = catalog.root_for(Path::new("/data/other/b.jpg")).unwrap();
        assert_eq!(m.volume.serial, "outer");
        assert_eq!(m.base_path, "other/b.jpg");
    }

    #[test]
    fn test_root_for_ignores_case_and_partial_components() {
        let catalog = VolumeCatalog::from_volumes(vec![record("v", &["/Mnt/Photos"])]);

        let m = catalog.root_for(Path::new("/mnt/photos/Trip/IMG.jpg")).unwrap();
        assert_eq!(m.base_path, "Trip/IMG.jpg");
        assert!(catalog.root_for(Path::new("/mnt/photos2/x.jpg")).is_none());
        assert!(catalog.root_for(Path::new("/elsewhere/x.jpg")).is_none());
        assert_eq!(catalog.root_for(Path::new("/mnt/photos")).unwrap().base_path, "");
    }

    #[test]
    fn test_reconstruct_uses_first_root() {
        let catalog = VolumeCatalog::from_volumes(vec![record("v", &["/media/a", "/srv/a"])]);
        assert_eq!(
            catalog.reconstruct_path("v", "docs/x.txt"),
            Some(PathBuf::from("/media/a/docs/x.txt"))
        );
        assert_eq!(catalog.reconstruct_path("absent", "docs/x.txt"), None);
    }

    proptest! {
        #[test]
        fn prop_longest_root_wins(
            segments in proptest::collection::vec("[a-z]{1,6}", 1..5),
            split in 0usize..5,
            file in "[a-z]{1,8}\\.txt",
        ) {
            let split = split.min(segments.len());
            let outer = format!("/{}", segments[..split].join("/"));
            let inner = format!("/{}", segments.join("/"));
            let catalog = VolumeCatalog::from_volumes(vec![
                record("outer", &[outer.as_str()]),
                record("inner", &[inner.as_str()]),
            ]);

            let path = format!("{}/{}", inner, file);
            let m = catalog.root_for(Path::new(&path)).unwrap();
            prop_assert_eq!(m.root.len(), normalize_root(&inner).len());
            prop_assert_eq!(m.base_path, file);
        }
    }
}

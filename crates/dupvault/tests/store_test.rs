#![cfg(unix)]

mod common;

use common::{StaticVolumeSource, TestFixture, TEST_SERIAL};
use dupvault_lib::db::{files, history};
use dupvault_lib::{reconcile, Database, SqliteDatabase, VolumeCatalog};

#[test]
fn test_store_in_missing_directory_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let result = SqliteDatabase::open(dir.path().join("absent").join("store.db"));
    assert!(result.is_err());
}

#[test]
fn test_records_survive_reopen() {
    let mut fixture = TestFixture::new().unwrap();
    fixture.write_file("A/kept.txt", b"durable");
    let roots = vec![fixture.data("A")];
    fixture.scan(&roots, fixture.options()).unwrap();

    let reopened = SqliteDatabase::open(&fixture.db_path).unwrap();
    let record = reopened
        .find_file(TEST_SERIAL, "data/A/kept.txt")
        .unwrap()
        .unwrap();
    assert!(record.content_hash.is_some());
    assert!(record.abs_path.is_none());
    assert_eq!(files::count_files(reopened.conn()).unwrap(), 1);
}

#[test]
fn test_unmounted_volume_is_not_reconciled() {
    let mut fixture = TestFixture::new().unwrap();
    fixture.write_file("A/offline.txt", b"on a detached disk");
    let roots = vec![fixture.data("A")];
    fixture.scan(&roots, fixture.options()).unwrap();

    let mut catalog = VolumeCatalog::new();
    let report = catalog
        .refresh(&mut fixture.db, &StaticVolumeSource::empty())
        .unwrap();
    assert_eq!(report.unmounted, vec![TEST_SERIAL.to_string()]);

    let stats = reconcile(&mut fixture.db, &catalog, &[TEST_SERIAL.to_string()]).unwrap();
    assert_eq!(stats.skipped_volumes, 1);
    assert_eq!(stats.archived, 0);
    assert_eq!(fixture.active_records().len(), 1);
    assert_eq!(history::count_history(fixture.db.conn()).unwrap(), 0);

    let stored = fixture.db.get_volume(TEST_SERIAL).unwrap().unwrap();
    assert!(stored.roots.is_empty());
}

#[test]
fn test_remounted_volume_keeps_its_records() {
    let mut fixture = TestFixture::new().unwrap();
    fixture.write_file("A/portable.txt", b"moves between machines");
    let roots = vec![fixture.data("A")];
    fixture.scan(&roots, fixture.options()).unwrap();
    let before = fixture.record("A/portable.txt").unwrap();

    // Same volume, now seen through a different mount point.
    let alias = tempfile::tempdir().unwrap();
    let mount = alias.path().canonicalize().unwrap().join("mnt");
    std::os::unix::fs::symlink(&fixture.root, &mount).unwrap();

    let mut catalog = VolumeCatalog::new();
    catalog
        .refresh(&mut fixture.db, &StaticVolumeSource::single(TEST_SERIAL, &mount))
        .unwrap();

    let path = catalog
        .reconstruct_path(TEST_SERIAL, &before.base_path)
        .unwrap();
    assert_eq!(path, mount.join("data").join("A").join("portable.txt"));
    assert!(path.exists());

    let stats = reconcile(&mut fixture.db, &catalog, &[TEST_SERIAL.to_string()]).unwrap();
    assert_eq!(stats.present, 1);
    assert_eq!(stats.archived, 0);
}

#[test]
fn test_duplicate_stats_count_surplus_copies() {
    let mut fixture = TestFixture::new().unwrap();
    fixture.write_file("A/one.txt", b"triplet");
    fixture.write_file("A/two.txt", b"triplet");
    fixture.write_file("A/three.txt", b"triplet");
    fixture.write_file("A/solo.txt", b"solo");

    let options = dupvault_lib::ScanOptions {
        relocate: false,
        ..fixture.options()
    };
    let roots = vec![fixture.data("A")];
    fixture.scan(&roots, options).unwrap();

    let (groups, surplus) = files::duplicate_stats(fixture.db.conn()).unwrap();
    assert_eq!(groups, 1);
    assert_eq!(surplus, 2);
}

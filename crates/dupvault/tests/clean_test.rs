#![cfg(unix)]

mod common;

use common::TestFixture;
use dupvault_lib::{FileOutcome, Relocated};

fn seeded_fixture() -> TestFixture {
    let mut fixture = TestFixture::new().unwrap();
    fixture.write_file("library/photo.jpg", b"holiday pixels");
    fixture.write_file("library/notes.txt", b"kept notes");

    let roots = vec![fixture.data("library")];
    fixture.scan(&roots, fixture.options()).unwrap();
    fixture
}

#[test]
fn test_clean_relocates_content_stored_elsewhere() {
    let mut fixture = seeded_fixture();
    let copy = fixture.write_file("inbox/photo-copy.jpg", b"holiday pixels");
    let fresh = fixture.write_file("inbox/new.jpg", b"never seen before");

    let inbox = fixture.data("inbox");
    let (summary, reports) = fixture.clean(&inbox, fixture.options()).unwrap();

    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.relocated, 1);
    assert!(!copy.exists());
    assert!(fresh.exists());
    assert!(fixture
        .quarantine()
        .join("inbox")
        .join("photo-copy.jpg")
        .exists());

    let report = reports.iter().find(|r| r.path == copy).unwrap();
    match &report.outcome {
        FileOutcome::Duplicate {
            canonical,
            relocation,
            ..
        } => {
            assert_eq!(
                canonical,
                &fixture.data("library/photo.jpg").to_string_lossy().to_string()
            );
            assert!(matches!(relocation, Relocated::Moved(_)));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_clean_keeps_duplicates_within_the_root() {
    let mut fixture = seeded_fixture();
    let first = fixture.write_file("inbox/a.txt", b"twin inside inbox");
    let second = fixture.write_file("inbox/b.txt", b"twin inside inbox");

    let inbox = fixture.data("inbox");
    let (summary, _) = fixture.clean(&inbox, fixture.options()).unwrap();

    assert_eq!(summary.duplicates, 0);
    assert!(first.exists());
    assert!(second.exists());
}

#[test]
fn test_clean_requires_the_other_copy_to_be_present() {
    let mut fixture = seeded_fixture();
    std::fs::remove_file(fixture.data("library/photo.jpg")).unwrap();
    let copy = fixture.write_file("inbox/photo-copy.jpg", b"holiday pixels");

    // The library record still claims the file exists.
    assert!(fixture.record("library/photo.jpg").unwrap().exists);

    let inbox = fixture.data("inbox");
    let (summary, _) = fixture.clean(&inbox, fixture.options()).unwrap();

    assert_eq!(summary.relocated, 0);
    assert!(copy.exists());
}

#[test]
fn test_clean_reconciliation_keeps_present_records() {
    let mut fixture = seeded_fixture();
    fixture.write_file("inbox/unique.txt", b"unique");

    let inbox = fixture.data("inbox");
    let (summary, _) = fixture.clean(&inbox, fixture.options()).unwrap();

    let stats = summary.reconcile.unwrap();
    assert_eq!(stats.archived, 0);
    assert!(fixture.record("library/notes.txt").is_some());
    assert!(fixture.record("inbox/unique.txt").is_some());
}

//! Tests for StorageManager
//!
//! These tests verify:
//! - First flush creates segment 0 and its manifest entry
//! - Appends stay in the active segment until it reaches the threshold
//! - Rotation seals the old segment and never touches it again
//! - Manifest/directory parity after many rotations
//! - Reverse-chronological lookup across segments
//! - A failed manifest update leaves disk and manifest as they were

use std::fs;
use std::path::Path;

use logkv::config::Config;
use logkv::record::Record;
use logkv::storage::segment::{list_segment_files, read_segment};
use logkv::storage::{FlushOutcome, Manifest, StorageManager};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_manager(dir: &Path, threshold: u64) -> StorageManager {
    let config = Config::builder()
        .data_dir(dir)
        .rotation_threshold_bytes(threshold)
        .build();
    StorageManager::open(&config).unwrap()
}

fn record(key: &str, value: serde_json::Value) -> Record {
    Record::add(key, value, "client-1", "admin")
}

fn batch(prefix: &str, count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| record(&format!("{}{}", prefix, i), json!(i)))
        .collect()
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_empty_flush_does_no_io() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 2000);

    assert_eq!(manager.flush(&[]).unwrap(), FlushOutcome::Empty);
    assert_eq!(manager.segment_count(), 0);
    assert!(list_segment_files(manager.log_dir(), "datalog")
        .unwrap()
        .is_empty());
}

#[test]
fn test_first_flush_creates_segment_zero() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 2000);

    let outcome = manager.flush(&batch("k", 3)).unwrap();

    assert_eq!(
        outcome,
        FlushOutcome::Created {
            version: 0,
            records: 3
        }
    );
    let active = manager.active_segment().unwrap();
    assert_eq!(active.file_name, "datalog0.log");
    assert!(active.active);

    let contents = read_segment(&manager.segment_path("datalog0.log")).unwrap();
    let keys: Vec<&str> = contents.records.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["k0", "k1", "k2"]);
}

#[test]
fn test_appends_below_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 2000);

    manager.flush(&batch("a", 1)).unwrap();
    let outcome = manager.flush(&batch("b", 1)).unwrap();

    assert_eq!(
        outcome,
        FlushOutcome::Appended {
            version: 0,
            records: 1
        }
    );
    assert_eq!(manager.segment_count(), 1);
    let contents = read_segment(&manager.segment_path("datalog0.log")).unwrap();
    assert_eq!(contents.records.len(), 2);
}

#[test]
fn test_rotation_threshold_behaviour() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 2000);

    // One flush large enough to push segment 0 past 2000 bytes
    manager.flush(&batch("big", 30)).unwrap();
    let size = fs::metadata(manager.segment_path("datalog0.log"))
        .unwrap()
        .len();
    assert!(size >= 2000, "segment only {} bytes", size);

    let outcome = manager.flush(&batch("next", 2)).unwrap();
    assert_eq!(
        outcome,
        FlushOutcome::Rotated {
            sealed: 0,
            version: 1,
            records: 2
        }
    );

    // The new segment holds exactly the rotated batch
    let contents = read_segment(&manager.segment_path("datalog1.log")).unwrap();
    assert_eq!(contents.records.len(), 2);

    let entries = manager.manifest_entries();
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].active);
    assert!(entries[1].active);
}

#[test]
fn test_sealed_segment_is_immutable() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 1);

    manager.flush(&batch("first", 2)).unwrap();
    manager.flush(&batch("second", 2)).unwrap();
    let sealed = fs::read(manager.segment_path("datalog0.log")).unwrap();

    for round in 0..5 {
        manager.flush(&batch(&format!("r{}_", round), 3)).unwrap();
    }

    assert_eq!(fs::read(manager.segment_path("datalog0.log")).unwrap(), sealed);
}

#[test]
fn test_manifest_directory_parity_after_rotations() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 1);

    let rotations = 6;
    for i in 0..=rotations {
        manager.flush(&batch(&format!("b{}_", i), 1)).unwrap();
    }

    let files = list_segment_files(manager.log_dir(), "datalog").unwrap();
    assert_eq!(files.len(), rotations + 1);
    assert_eq!(manager.segment_count(), files.len());

    // The persisted manifest agrees with the in-memory one
    let manifest_path = StorageManager::manifest_path_in(&temp_dir.path().join("resource"));
    let persisted = Manifest::load(&manifest_path).unwrap();
    assert_eq!(persisted, manager.manifest_entries());
    assert_eq!(persisted.iter().filter(|d| d.active).count(), 1);
    assert_eq!(persisted.last().unwrap().version, rotations as u64);
}

#[test]
fn test_reopen_after_rotations() {
    let temp_dir = TempDir::new().unwrap();
    {
        let manager = setup_manager(temp_dir.path(), 1);
        for i in 0..3 {
            manager.flush(&batch(&format!("b{}_", i), 1)).unwrap();
        }
    }

    let manager = setup_manager(temp_dir.path(), 1);
    assert_eq!(manager.segment_count(), 3);

    let outcome = manager.flush(&batch("after", 1)).unwrap();
    assert!(matches!(outcome, FlushOutcome::Rotated { version: 3, .. }));
}

// =============================================================================
// Failure Tests
// =============================================================================

/// Make the manifest's temp path a directory so the next persist fails
fn block_manifest(dir: &Path) -> std::path::PathBuf {
    let tmp = dir.join("resource").join("file_resource.log.tmp");
    fs::create_dir(&tmp).unwrap();
    tmp
}

#[test]
fn test_failed_create_leaves_no_segment() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 2000);
    let records = batch("k", 3);

    let blocked = block_manifest(temp_dir.path());
    assert!(manager.flush(&records).is_err());
    assert_eq!(manager.segment_count(), 0);
    assert!(!manager.segment_path("datalog0.log").exists());

    // Retrying the same batch writes it exactly once
    fs::remove_dir(&blocked).unwrap();
    assert!(matches!(
        manager.flush(&records).unwrap(),
        FlushOutcome::Created { version: 0, records: 3 }
    ));
    let contents = read_segment(&manager.segment_path("datalog0.log")).unwrap();
    assert_eq!(contents.records, records);

    let manifest_path = temp_dir.path().join("resource").join("file_resource.log");
    assert_eq!(Manifest::load(&manifest_path).unwrap().len(), 1);

    drop(manager);
    let reopened = setup_manager(temp_dir.path(), 2000);
    assert_eq!(reopened.segment_count(), 1);
}

#[test]
fn test_failed_rotation_keeps_old_active_segment() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 1);
    manager.flush(&batch("a", 1)).unwrap();
    let records = batch("b", 2);

    let blocked = block_manifest(temp_dir.path());
    assert!(manager.flush(&records).is_err());
    assert_eq!(manager.segment_count(), 1);
    assert_eq!(manager.active_segment().unwrap().version, 0);
    assert!(!manager.segment_path("datalog1.log").exists());

    fs::remove_dir(&blocked).unwrap();
    assert!(matches!(
        manager.flush(&records).unwrap(),
        FlushOutcome::Rotated { sealed: 0, version: 1, records: 2 }
    ));
    assert_eq!(
        read_segment(&manager.segment_path("datalog0.log"))
            .unwrap()
            .records
            .len(),
        1
    );
    assert_eq!(
        read_segment(&manager.segment_path("datalog1.log"))
            .unwrap()
            .records,
        records
    );

    drop(manager);
    let reopened = setup_manager(temp_dir.path(), 1);
    assert_eq!(reopened.segment_count(), 2);
}

#[test]
fn test_unlisted_segment_file_is_overwritten() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 2000);

    // Left behind by a flush whose manifest update never landed
    let stale = batch("stale", 2);
    logkv::storage::segment::write_segment(&manager.segment_path("datalog0.log"), &stale).unwrap();

    let records = batch("k", 1);
    assert!(matches!(
        manager.flush(&records).unwrap(),
        FlushOutcome::Created { version: 0, records: 1 }
    ));
    let contents = read_segment(&manager.segment_path("datalog0.log")).unwrap();
    assert_eq!(contents.records, records);
    assert_eq!(manager.segment_count(), 1);
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_find_prefers_newest_segment() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 1);

    manager.flush(&[record("k", json!("old"))]).unwrap();
    manager.flush(&[record("other", json!(0))]).unwrap();
    manager.flush(&[record("k", json!("new"))]).unwrap();

    let found = manager.find("k").unwrap().unwrap();
    assert_eq!(found.value, json!("new"));
    assert_eq!(manager.find("other").unwrap().unwrap().value, json!(0));
    assert!(manager.find("missing").unwrap().is_none());
}

#[test]
fn test_find_within_segment_uses_latest_created() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 2000);

    let first = record("k", json!(1));
    let second = record("k", json!(2));
    manager.flush(&[first, second]).unwrap();

    assert_eq!(manager.find("k").unwrap().unwrap().value, json!(2));
}

#[test]
fn test_find_skips_malformed_lines() {
    let temp_dir = TempDir::new().unwrap();
    let manager = setup_manager(temp_dir.path(), 2000);

    manager.flush(&[record("k", json!("ok"))]).unwrap();
    let path = manager.segment_path("datalog0.log");
    let mut data = fs::read_to_string(&path).unwrap();
    data.insert_str(0, "garbage line\n");
    fs::write(&path, data).unwrap();

    assert_eq!(manager.find("k").unwrap().unwrap().value, json!("ok"));
}

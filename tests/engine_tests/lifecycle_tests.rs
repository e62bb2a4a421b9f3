//! Tests for the engine lifecycle
//!
//! These tests verify:
//! - Running after open, Stopped after drain, no way back
//! - Drain persists the filter and runs a final flush
//! - Writes acknowledged while draining are flushed and in the snapshot
//! - Background timers flush on their own and stop on drain
//! - Startup failures leave nothing running

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use logkv::config::Config;
use logkv::engine::Engine;
use logkv::error::LogKvError;
use logkv::filter::MembershipFilter;
use logkv::lifecycle::LifecycleState;
use logkv::storage::segment::{list_segment_files, read_segment};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// =============================================================================
// State Machine Tests
// =============================================================================

#[test]
fn test_open_drain_states() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();

    assert_eq!(engine.state(), LifecycleState::Running);
    engine.drain().unwrap();
    assert_eq!(engine.state(), LifecycleState::Stopped);
}

#[test]
fn test_drain_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();

    engine.drain().unwrap();
    engine.drain().unwrap();
    assert_eq!(engine.state(), LifecycleState::Stopped);
}

#[test]
fn test_writes_rejected_after_stop() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();
    engine.drain().unwrap();

    let err = engine.put("k", json!(1), "c").unwrap_err();
    assert!(matches!(err, LogKvError::Lifecycle(_)));
}

#[test]
fn test_invalid_config_fails_startup() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .filter(1000, 1.5)
        .build();

    let Err(err) = Engine::open(config) else {
        panic!("engine opened with an invalid filter rate");
    };
    assert!(matches!(err, LogKvError::Config(_)));
    assert!(err.is_fatal());
}

// =============================================================================
// Drain Tests
// =============================================================================

#[test]
fn test_drain_flushes_pending_records() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();

    engine.put("a", json!(1), "c").unwrap();
    engine.put("b", json!(2), "c").unwrap();
    assert_eq!(engine.pending_len(), (2, 0));

    engine.drain().unwrap();

    assert_eq!(engine.pending_len(), (0, 0));
    assert_eq!(engine.segment_count(), 1);
    let data = fs::read_to_string(engine.log_dir().join("datalog0.log")).unwrap();
    assert_eq!(data.lines().count(), 2);
}

#[test]
fn test_drain_persists_filter_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();

    engine.put("snap", json!(true), "c").unwrap();
    engine.drain().unwrap();

    let data = fs::read(engine.filter_path()).unwrap();
    let filter = MembershipFilter::from_json(&data).unwrap();
    assert!(filter.might_contain("snap"));
    assert_eq!(filter.item_count(), 1);
}

#[test]
fn test_writes_during_drain_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().data_dir(temp_dir.path()).build();
    let engine = Arc::new(Engine::open(config.clone()).unwrap());

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let mut accepted = Vec::new();
            for i in 0..200_000 {
                let key = format!("k{}", i);
                if engine.put(&key, json!(i), "w").is_err() {
                    break;
                }
                accepted.push(key);
            }
            accepted
        })
    };

    assert!(wait_until(Duration::from_secs(5), || {
        engine.pending_len().0 > 100
    }));
    engine.drain().unwrap();
    let accepted = writer.join().unwrap();
    assert_eq!(engine.pending_len(), (0, 0));

    // Every acknowledged key is on disk and in the filter snapshot
    let mut on_disk = HashSet::new();
    for name in list_segment_files(engine.log_dir(), "datalog").unwrap() {
        for record in read_segment(&engine.log_dir().join(name)).unwrap().records {
            on_disk.insert(record.key);
        }
    }
    let snapshot = MembershipFilter::from_json(&fs::read(engine.filter_path()).unwrap()).unwrap();
    for key in &accepted {
        assert!(on_disk.contains(key), "{} acknowledged but not flushed", key);
        assert!(snapshot.might_contain(key), "{} missing from filter snapshot", key);
    }
    assert_eq!(on_disk.len(), accepted.len());

    let reopened = Engine::open(config).unwrap();
    let last = accepted.last().unwrap();
    assert!(reopened.find_by_key(last).unwrap().is_some());
}

#[test]
fn test_drain_with_empty_buffer_creates_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();

    engine.drain().unwrap();

    assert_eq!(engine.segment_count(), 0);
    assert!(engine.filter_path().exists());
}

// =============================================================================
// Background Task Tests
// =============================================================================

#[test]
fn test_flush_timer_drains_buffer() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .flush_interval_ms(20)
        .build();
    let engine = Arc::new(Engine::open(config).unwrap());
    engine.start_background_tasks().unwrap();

    engine.put("timed", json!(1), "c").unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        engine.pending_len() == (0, 0) && engine.segment_count() == 1
    }));

    engine.drain().unwrap();
    assert_eq!(engine.state(), LifecycleState::Stopped);
}

#[test]
fn test_compaction_timer_runs() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .rotation_threshold_bytes(1)
        .flush_interval_ms(60_000)
        .compaction_interval_ms(20)
        .build();
    let engine = Arc::new(Engine::open(config).unwrap());

    engine.put("a", json!(1), "c").unwrap();
    engine.put("a", json!(2), "c").unwrap();
    engine.flush().unwrap();
    engine.put("b", json!(1), "c").unwrap();
    engine.flush().unwrap();

    engine.start_background_tasks().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        engine.stats().compactions >= 1
    }));
    let data = fs::read_to_string(engine.log_dir().join("datalog0.log")).unwrap();
    assert_eq!(data.lines().count(), 1);

    engine.drain().unwrap();
}

#[test]
fn test_timers_stop_after_drain() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .flush_interval_ms(10)
        .build();
    let engine = Arc::new(Engine::open(config).unwrap());
    engine.start_background_tasks().unwrap();

    engine.drain().unwrap();

    // Writes are refused and no timer can restart
    assert!(engine.start_background_tasks().is_err());
    assert!(engine.put("late", json!(1), "c").is_err());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.segment_count(), 0);
}

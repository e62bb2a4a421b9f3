//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Verify the manifest and load the membership filter on startup
//! - Accept writes into the ingest buffer, cache and filter
//! - Flush the buffer into segments on a timer
//! - Serve lookups: cache → pending buffer → filter → segment scan
//! - Compact sealed segments on a separate timer
//! - Drain and persist on shutdown

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::audit::{AuditLog, ConnectionEvent, ConnectionEventKind};
use crate::buffer::IngestBuffer;
use crate::cache::{CacheStats, LookupCache};
use crate::config::Config;
use crate::error::{LogKvError, Result};
use crate::filter::MembershipFilter;
use crate::lifecycle::{BackgroundTask, Context, Lifecycle, LifecycleState, Scheduler};
use crate::protocol::{QueryKind, QueryRequest};
use crate::record::Record;
use crate::storage::{
    CompactionResult, FlushOutcome, SegmentDescriptor, StorageManager, FILTER_FILE_NAME,
};

/// How often `drain` re-checks for an in-flight flush
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Counters exposed for observability
#[derive(Debug, Default)]
struct Counters {
    flushes: AtomicU64,
    rotations: AtomicU64,
    compactions: AtomicU64,
    filter_negatives: AtomicU64,
    segment_scans: AtomicU64,
}

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub flushes: u64,
    pub rotations: u64,
    pub compactions: u64,
    /// Lookups answered "absent" by the filter without disk access
    pub filter_negatives: u64,
    /// Lookups that fell through to a segment scan
    pub segment_scans: u64,
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes** (`submit`): serialized by the filter write lock so that the
///   buffer, cache and filter observe one order per key. Never blocked by a
///   flush: the buffer switches to its shadow queue instead.
///
/// - **Flush**: gated by the buffer's `flushing` flag (overlapping calls are
///   no-ops) and by `maintenance`, which it shares with compaction.
///
/// - **Compaction**: `try_lock` on `maintenance`; skipped while a flush runs,
///   and a flush waits for a running compaction to finish.
///
/// - **Reads** (`find_by_key`): lock-free of writers except for short cache,
///   buffer and filter locks; the segment scan holds the manifest read lock.
pub struct Engine {
    /// Engine configuration
    config: Config,

    lifecycle: Lifecycle,

    /// Records accepted but not yet written to a segment
    buffer: IngestBuffer,

    /// Most recent record per key (bounded)
    cache: LookupCache,

    /// Every key ever accepted
    filter: RwLock<MembershipFilter>,

    /// Segments and manifest
    storage: StorageManager,

    /// Connect/disconnect history
    audit: AuditLog,

    /// Exclusion between flush and compaction
    maintenance: Mutex<()>,

    /// Flush/compaction timers, present while running
    scheduler: Mutex<Option<Scheduler>>,

    filter_path: PathBuf,

    counters: Counters,
}

impl Engine {
    /// Open an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, create directories
    /// 2. Recover the manifest and check it against the segment files (fatal on mismatch)
    /// 3. Load the membership filter snapshot, or start empty
    /// 4. Ready to serve requests (timers start with `start_background_tasks`)
    pub fn open(config: Config) -> Result<Self> {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleState::Starting)?;

        let opened = Self::recover(&config);
        let (storage, filter) = match opened {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!(error = %e, "Engine startup failed");
                lifecycle.transition(LifecycleState::Stopped)?;
                return Err(e);
            }
        };

        let filter_path = config.resource_dir().join(FILTER_FILE_NAME);
        let engine = Self {
            cache: LookupCache::new(config.cache_capacity),
            audit: AuditLog::new(config.audit_log_capacity),
            buffer: IngestBuffer::new(),
            filter: RwLock::new(filter),
            storage,
            maintenance: Mutex::new(()),
            scheduler: Mutex::new(None),
            filter_path,
            counters: Counters::default(),
            lifecycle,
            config,
        };

        engine.lifecycle.transition(LifecycleState::Running)?;
        tracing::info!(
            data_dir = %engine.config.data_dir.display(),
            segments = engine.storage.segment_count(),
            "Engine ready"
        );
        Ok(engine)
    }

    fn recover(config: &Config) -> Result<(StorageManager, MembershipFilter)> {
        config.validate()?;

        let storage = StorageManager::open(config)?;
        let filter = MembershipFilter::load_or_new(
            &config.resource_dir().join(FILTER_FILE_NAME),
            config.filter_capacity,
            config.filter_fp_rate,
        )?;
        Ok((storage, filter))
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.data_dir = path.to_path_buf();
        Self::open(config)
    }

    /// Start the flush and compaction timers
    pub fn start_background_tasks(self: &Arc<Self>) -> Result<()> {
        if self.lifecycle.state() != LifecycleState::Running {
            return Err(LogKvError::Lifecycle(format!(
                "cannot start timers while {}",
                self.lifecycle.state()
            )));
        }

        let mut slot = self.scheduler.lock();
        if slot.is_some() {
            return Ok(());
        }

        let scheduler = Scheduler::new();
        scheduler.register(FlushTask {
            engine: Arc::downgrade(self),
            interval: self.config.flush_interval(),
        })?;
        scheduler.register(CompactionTask {
            engine: Arc::downgrade(self),
            interval: self.config.compaction_interval(),
        })?;
        *slot = Some(scheduler);

        tracing::info!(
            flush_interval_ms = self.config.flush_interval_ms,
            compaction_interval_ms = self.config.compaction_interval_ms,
            "Background tasks started"
        );
        Ok(())
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Accept a record
    ///
    /// The record is visible to `find_by_key` as soon as this returns.
    pub fn submit(&self, record: Record) -> Result<()> {
        // Checked under the filter lock: drain closes intake by taking it
        let mut filter = self.filter.write();
        if !self.lifecycle.accepts_writes() {
            return Err(LogKvError::Lifecycle(format!(
                "writes rejected while {}",
                self.lifecycle.state()
            )));
        }

        filter.add(&record.key);
        self.cache.insert(record.clone());
        self.buffer.submit(record);
        Ok(())
    }

    /// Create and accept an `add` record for `key`
    pub fn put(&self, key: &str, value: Value, client_id: &str) -> Result<Record> {
        let record = Record::add(key, value, client_id, self.config.account_name.as_str());
        self.submit(record.clone())?;
        Ok(record)
    }

    /// Apply a client `query` request
    ///
    /// `add` with a key ingests a record and returns it. A missing key or any
    /// other type is accepted and ignored.
    pub fn ingest(&self, request: QueryRequest, client_id: &str) -> Result<Option<Record>> {
        let Some(key) = request.key else {
            tracing::debug!(client = client_id, "Ignoring query without key");
            return Ok(None);
        };

        match request.kind {
            QueryKind::Add => self.put(&key, request.payload, client_id).map(Some),
            QueryKind::Other(kind) => {
                tracing::debug!(client = client_id, kind = %kind, "Ignoring unsupported query type");
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Resolve the latest record for a key
    ///
    /// Search order:
    /// 1. Lookup cache
    /// 2. Buffered records not yet flushed
    /// 3. Membership filter: "definitely absent" ends the search
    /// 4. Segments, newest → oldest
    pub fn find_by_key(&self, key: &str) -> Result<Option<Record>> {
        if let Some(record) = self.cache.get(key) {
            return Ok(Some(record));
        }

        // Needed once the cache has evicted a key that is still unflushed
        if let Some(record) = self.buffer.find_pending(key) {
            self.cache.populate(record.clone());
            return Ok(Some(record));
        }

        if !self.filter.read().might_contain(key) {
            self.counters.filter_negatives.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.counters.segment_scans.fetch_add(1, Ordering::Relaxed);
        let found = self.storage.find(key)?;
        if let Some(record) = &found {
            self.cache.populate(record.clone());
        }
        Ok(found)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Write buffered records to the active segment
    ///
    /// Returns `FlushOutcome::Skipped` immediately if a flush is already in
    /// flight. On error the buffered records are kept for the next attempt.
    pub fn flush(&self) -> Result<FlushOutcome> {
        let Some(guard) = self.buffer.begin_flush() else {
            return Ok(FlushOutcome::Skipped);
        };
        let _maintenance = self.maintenance.lock();

        let outcome = self.storage.flush(guard.records())?;
        guard.commit();

        match outcome {
            FlushOutcome::Empty | FlushOutcome::Skipped => {}
            FlushOutcome::Rotated { .. } => {
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                self.counters.rotations.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(outcome)
    }

    /// Compact every sealed segment
    ///
    /// Skipped (empty result) while a flush is running.
    pub fn compact(&self) -> Result<Vec<CompactionResult>> {
        if self.buffer.is_flushing() {
            tracing::debug!("Flush in progress, skipping compaction");
            return Ok(Vec::new());
        }
        let Some(_maintenance) = self.maintenance.try_lock() else {
            tracing::debug!("Maintenance busy, skipping compaction");
            return Ok(Vec::new());
        };

        let results = self.storage.compact()?;
        let rewritten = results.iter().filter(|r| r.rewritten).count() as u64;
        self.counters.compactions.fetch_add(rewritten, Ordering::Relaxed);
        Ok(results)
    }

    /// Write the membership filter snapshot
    pub fn persist_filter(&self) -> Result<()> {
        self.filter.read().persist(&self.filter_path)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Drain and stop
    ///
    /// 1. Enter `Draining`, cancel timers
    /// 2. Persist the membership filter (best effort)
    /// 3. Wait for an in-flight flush
    /// 4. Close intake, flush until both queues are empty (best effort)
    /// 5. Persist the filter again so it covers writes accepted while draining
    /// 6. `Stopped`
    ///
    /// Writes are accepted until step 4; every write acknowledged before then
    /// is on disk and in the snapshot once `drain` returns. Calling `drain`
    /// again after it started is a no-op.
    pub fn drain(&self) -> Result<()> {
        match self.lifecycle.state() {
            LifecycleState::Draining | LifecycleState::Stopped => return Ok(()),
            _ => self.lifecycle.transition(LifecycleState::Draining)?,
        }

        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = &scheduler {
            scheduler.signal_shutdown();
        }

        if let Err(e) = self.persist_filter() {
            tracing::warn!(error = %e, "Failed to persist membership filter during shutdown");
        }

        while self.buffer.is_flushing() {
            thread::sleep(DRAIN_POLL_INTERVAL);
        }
        if let Some(scheduler) = scheduler {
            scheduler.shutdown();
        }

        // Holding the write lock blocks `submit` until the state is Stopped
        let filter = self.filter.write();
        self.flush_remaining();

        if let Err(e) = filter.persist(&self.filter_path) {
            tracing::warn!(error = %e, "Failed to persist membership filter after final flush");
        }
        self.lifecycle.transition(LifecycleState::Stopped)?;
        drop(filter);

        tracing::info!("Engine stopped");
        Ok(())
    }

    /// Flush until both queues are empty or a flush fails
    fn flush_remaining(&self) {
        loop {
            if self.buffer.pending_len() == (0, 0) && !self.buffer.is_flushing() {
                return;
            }
            match self.flush() {
                Ok(FlushOutcome::Skipped) => thread::sleep(DRAIN_POLL_INTERVAL),
                Ok(outcome) => tracing::info!(?outcome, "Final flush complete"),
                Err(e) => {
                    tracing::warn!(error = %e, "Final flush failed during shutdown");
                    return;
                }
            }
        }
    }

    // =========================================================================
    // Connection Audit
    // =========================================================================

    /// Record a client connect/disconnect
    pub fn record_connection(&self, client_id: &str, kind: ConnectionEventKind) {
        self.audit.record(client_id, kind);
    }

    pub fn connection_events(&self) -> Vec<ConnectionEvent> {
        self.audit.events()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the segment directory path
    pub fn log_dir(&self) -> &Path {
        self.storage.log_dir()
    }

    /// Get the filter snapshot path
    pub fn filter_path(&self) -> &Path {
        &self.filter_path
    }

    /// Get the number of segments
    pub fn segment_count(&self) -> usize {
        self.storage.segment_count()
    }

    /// Copy of the manifest entries, oldest → newest
    pub fn manifest_entries(&self) -> Vec<SegmentDescriptor> {
        self.storage.manifest_entries()
    }

    pub fn active_segment(&self) -> Option<SegmentDescriptor> {
        self.storage.active_segment()
    }

    /// (primary, shadow) buffered record counts
    pub fn pending_len(&self) -> (usize, usize) {
        self.buffer.pending_len()
    }

    pub fn is_flushing(&self) -> bool {
        self.buffer.is_flushing()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cache hits recorded against one key
    pub fn cache_hits(&self, key: &str) -> u64 {
        self.cache.hit_count(key)
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            rotations: self.counters.rotations.load(Ordering::Relaxed),
            compactions: self.counters.compactions.load(Ordering::Relaxed),
            filter_negatives: self.counters.filter_negatives.load(Ordering::Relaxed),
            segment_scans: self.counters.segment_scans.load(Ordering::Relaxed),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

// =============================================================================
// Timers
// =============================================================================

struct FlushTask {
    engine: Weak<Engine>,
    interval: Duration,
}

impl BackgroundTask for FlushTask {
    fn name(&self) -> &'static str {
        "flush"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn execute(&self, ctx: &Context) -> Result<()> {
        let Some(engine) = self.engine.upgrade() else {
            return Ok(());
        };
        let outcome = engine.flush()?;
        if !matches!(outcome, FlushOutcome::Empty | FlushOutcome::Skipped) {
            tracing::debug!(task = ctx.task_name, run_id = ctx.run_id, ?outcome, "Flushed");
        }
        Ok(())
    }
}

struct CompactionTask {
    engine: Weak<Engine>,
    interval: Duration,
}

impl BackgroundTask for CompactionTask {
    fn name(&self) -> &'static str {
        "compaction"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn execute(&self, ctx: &Context) -> Result<()> {
        let Some(engine) = self.engine.upgrade() else {
            return Ok(());
        };
        let results = engine.compact()?;
        let rewritten = results.iter().filter(|r| r.rewritten).count();
        tracing::debug!(
            task = ctx.task_name,
            run_id = ctx.run_id,
            segments = results.len(),
            rewritten,
            "Compaction pass finished"
        );
        Ok(())
    }
}

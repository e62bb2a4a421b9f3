//! Storage Manager
//!
//! Owns the segment directory and the manifest, and coordinates flushes,
//! lookups and compaction over them.
//!
//! ## Responsibilities
//! - Recover and verify the manifest on startup
//! - Write flushed batches into the active segment, rotating when it is full
//! - Search segments newest → oldest for reads
//! - Compact sealed segments

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::Result;
use crate::record::Record;

use super::compactor::{compact_segment, CompactionResult};
use super::fsutil;
use super::manifest::{Manifest, SegmentDescriptor};
use super::segment::{append_segment, find_in_segment, write_segment};

/// What a flush did on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Empty batch, no I/O
    Empty,
    /// Another flush was already in flight
    Skipped,
    /// The latest segment did not exist yet and was created
    Created { version: u64, records: usize },
    /// The active segment was full; a new one was created
    Rotated { sealed: u64, version: u64, records: usize },
    /// Records were appended to the active segment
    Appended { version: u64, records: usize },
}

/// Manages segments and the manifest
///
/// ## Concurrency:
/// - `manifest`: RwLock. Flush takes the write lock for the whole file
///   mutation; lookups hold the read lock while scanning, so a scan never
///   observes a half-written rotation. Compaction takes the read lock once
///   per segment; its rewrites replace files by atomic rename.
/// - All methods use `&self`.
pub struct StorageManager {
    /// Directory where segments are stored
    log_dir: PathBuf,

    /// Segment file prefix
    base_name: String,

    /// Size at which the active segment stops taking appends
    rotation_threshold: u64,

    manifest: RwLock<Manifest>,
}

impl StorageManager {
    /// Open storage for the given config
    ///
    /// On startup:
    /// 1. Create log and resource directories if needed
    /// 2. Recover the manifest and verify it against the segment files
    pub fn open(config: &Config) -> Result<Self> {
        let log_dir = config.log_dir();
        let resource_dir = config.resource_dir();
        fs::create_dir_all(&log_dir)?;
        fs::create_dir_all(&resource_dir)?;

        let manifest = Manifest::recover(
            &Self::manifest_path_in(&resource_dir),
            &log_dir,
            &config.segment_base_name,
        )?;

        Ok(Self {
            log_dir,
            base_name: config.segment_base_name.clone(),
            rotation_threshold: config.rotation_threshold_bytes,
            manifest: RwLock::new(manifest),
        })
    }

    /// Write a batch of records to disk
    ///
    /// 1. Pick the max-version manifest entry (synthetic version 0 if none)
    /// 2. File missing or not listed → (re)create it, add the entry, persist the manifest
    /// 3. File at/over the threshold → create version + 1, seal the rest,
    ///    persist the manifest
    /// 4. Otherwise append to it, manifest untouched
    ///
    /// Manifest changes are staged on a copy and only become current once
    /// persisted. If persisting fails the new segment file is removed, so a
    /// retry of the same batch starts from the same state.
    pub fn flush(&self, records: &[Record]) -> Result<FlushOutcome> {
        if records.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let mut manifest = self.manifest.write();

        let latest = manifest
            .latest()
            .cloned()
            .unwrap_or_else(|| SegmentDescriptor::new(&self.base_name, 0, true));
        let latest_path = self.segment_path(&latest.file_name);

        // An unlisted file is what a failed flush left behind; overwrite it
        if !latest_path.exists() || !manifest.contains_version(latest.version) {
            let version = latest.version;
            let mut staged = manifest.clone();
            if !staged.contains_version(version) {
                staged.add_segment(SegmentDescriptor { active: true, ..latest });
            }

            write_segment(&latest_path, records)?;
            Self::commit_manifest(&mut manifest, staged, &latest_path)?;

            tracing::info!(version, records = records.len(), "Created segment");
            return Ok(FlushOutcome::Created {
                version,
                records: records.len(),
            });
        }

        let size = fsutil::file_size(&latest_path)?;
        if size >= self.rotation_threshold {
            let next = SegmentDescriptor::new(&self.base_name, latest.version + 1, true);
            let next_path = self.segment_path(&next.file_name);
            let version = next.version;
            let mut staged = manifest.clone();
            staged.rotate_to(next);

            write_segment(&next_path, records)?;
            Self::commit_manifest(&mut manifest, staged, &next_path)?;

            tracing::info!(
                sealed = latest.version,
                version,
                sealed_bytes = size,
                "Rotated segment"
            );
            return Ok(FlushOutcome::Rotated {
                sealed: latest.version,
                version,
                records: records.len(),
            });
        }

        let bytes = append_segment(&latest_path, records)?;
        tracing::debug!(
            version = latest.version,
            records = records.len(),
            bytes,
            "Appended to active segment"
        );
        Ok(FlushOutcome::Appended {
            version: latest.version,
            records: records.len(),
        })
    }

    /// Persist `staged` and make it current, or remove `segment` on failure
    fn commit_manifest(current: &mut Manifest, staged: Manifest, segment: &Path) -> Result<()> {
        if let Err(e) = staged.persist() {
            tracing::error!(
                segment = %segment.display(),
                error = %e,
                "Manifest persist failed, discarding new segment"
            );
            if let Err(remove_err) = fs::remove_file(segment) {
                tracing::warn!(
                    segment = %segment.display(),
                    error = %remove_err,
                    "Failed to remove unlisted segment"
                );
            }
            return Err(e);
        }

        *current = staged;
        Ok(())
    }

    /// Find the most recent record for `key` on disk
    ///
    /// Scans segments newest → oldest. Within the first segment that holds
    /// the key, the record with the latest `created_at` wins; older segments
    /// are not consulted.
    pub fn find(&self, key: &str) -> Result<Option<Record>> {
        let manifest = self.manifest.read();

        for descriptor in manifest.entries().iter().rev() {
            let path = self.segment_path(&descriptor.file_name);
            if !path.exists() {
                continue;
            }
            if let Some(record) = find_in_segment(&path, key)? {
                return Ok(Some(record));
            }
        }

        Ok(None)
    }

    /// Compact every segment except the active one
    ///
    /// The sealed set is taken from a snapshot of the manifest. Each rewrite
    /// holds the read lock on its own, so lookups are never blocked and a
    /// rotation can only land between two segments.
    pub fn compact(&self) -> Result<Vec<CompactionResult>> {
        let sealed: Vec<SegmentDescriptor> = {
            let manifest = self.manifest.read();
            if manifest.is_empty() {
                return Ok(Vec::new());
            }
            let active = manifest
                .active()
                .or_else(|| manifest.latest())
                .map(|d| d.version);
            manifest
                .entries()
                .iter()
                .filter(|d| Some(d.version) != active)
                .cloned()
                .collect()
        };

        let mut results = Vec::new();
        for descriptor in sealed {
            let _manifest = self.manifest.read();
            let path = self.segment_path(&descriptor.file_name);
            if !path.exists() {
                continue;
            }
            results.push(compact_segment(&path)?);
        }

        Ok(results)
    }

    /// Copy of the manifest entries, oldest → newest
    pub fn manifest_entries(&self) -> Vec<SegmentDescriptor> {
        self.manifest.read().entries().to_vec()
    }

    /// Currently active segment, if any segment exists yet
    pub fn active_segment(&self) -> Option<SegmentDescriptor> {
        self.manifest.read().active().cloned()
    }

    /// Number of segments known to the manifest
    pub fn segment_count(&self) -> usize {
        self.manifest.read().len()
    }

    /// Get the segment directory path
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Full path of a segment file
    pub fn segment_path(&self, file_name: &str) -> PathBuf {
        self.log_dir.join(file_name)
    }

    /// Manifest file location inside a resource directory
    pub fn manifest_path_in(resource_dir: &Path) -> PathBuf {
        resource_dir.join(super::MANIFEST_FILE_NAME)
    }
}

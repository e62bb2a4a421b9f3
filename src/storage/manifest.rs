//! Manifest
//!
//! Durable, ordered list of segment descriptors, one JSON object per line:
//! ```text
//! {"fileName":"datalog0.log","version":0,"active":false}
//! {"fileName":"datalog1.log","version":1,"active":true}
//! ```
//!
//! The manifest must describe exactly the segment files on disk. Startup
//! compares the two and refuses to continue on a mismatch; nothing is
//! repaired automatically.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LogKvError, Result};

use super::fsutil;
use super::segment::{list_segment_files, segment_file_name};

/// One segment as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDescriptor {
    pub file_name: String,
    pub version: u64,
    pub active: bool,
}

impl SegmentDescriptor {
    pub fn new(base: &str, version: u64, active: bool) -> Self {
        Self {
            file_name: segment_file_name(base, version),
            version,
            active,
        }
    }
}

/// In-memory manifest bound to its file
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    /// Ascending by version
    entries: Vec<SegmentDescriptor>,
}

impl Manifest {
    /// Recover the manifest and check it against the segment directory
    ///
    /// - manifest absent, no segments: fresh install, empty manifest file is created
    /// - manifest absent, segments present: `ManifestMismatch`
    /// - manifest present: entry count must equal segment file count
    pub fn recover(path: &Path, log_dir: &Path, base_name: &str) -> Result<Self> {
        let segment_files = list_segment_files(log_dir, base_name)?;

        if !path.exists() {
            if !segment_files.is_empty() {
                return Err(LogKvError::ManifestMismatch {
                    manifest_entries: 0,
                    segment_files: segment_files.len(),
                });
            }

            fsutil::write(path, b"")?;
            tracing::info!(manifest = %path.display(), "Created empty manifest");
            return Ok(Self {
                path: path.to_path_buf(),
                entries: Vec::new(),
            });
        }

        let mut entries = Self::load(path)?;
        if entries.len() != segment_files.len() {
            return Err(LogKvError::ManifestMismatch {
                manifest_entries: entries.len(),
                segment_files: segment_files.len(),
            });
        }

        entries.sort_by_key(|e| e.version);

        tracing::info!(
            manifest = %path.display(),
            segments = entries.len(),
            "Recovered manifest"
        );

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Parse a manifest file
    pub fn load(path: &Path) -> Result<Vec<SegmentDescriptor>> {
        let data = fs::read_to_string(path)?;
        let mut entries = Vec::new();

        for (idx, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: SegmentDescriptor =
                serde_json::from_str(line).map_err(|e| LogKvError::ManifestCorrupt {
                    line: idx + 1,
                    reason: e.to_string(),
                })?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Rewrite the manifest file from the in-memory entries
    pub fn persist(&self) -> Result<()> {
        let mut data = String::new();
        for entry in &self.entries {
            data.push_str(&serde_json::to_string(entry)?);
            data.push('\n');
        }
        fsutil::write_atomic(&self.path, data.as_bytes())
    }

    /// Entry with the highest version
    pub fn latest(&self) -> Option<&SegmentDescriptor> {
        self.entries.iter().max_by_key(|e| e.version)
    }

    /// The entry flagged active
    pub fn active(&self) -> Option<&SegmentDescriptor> {
        self.entries.iter().rev().find(|e| e.active)
    }

    /// Record a newly created first segment
    pub fn add_segment(&mut self, descriptor: SegmentDescriptor) {
        self.entries.push(descriptor);
        self.entries.sort_by_key(|e| e.version);
    }

    /// Seal every known segment and make `descriptor` the active one
    pub fn rotate_to(&mut self, mut descriptor: SegmentDescriptor) {
        for entry in &mut self.entries {
            entry.active = false;
        }
        descriptor.active = true;
        self.add_segment(descriptor);
    }

    /// Entries ordered oldest → newest
    pub fn entries(&self) -> &[SegmentDescriptor] {
        &self.entries
    }

    /// Whether an entry with `version` is listed
    pub fn contains_version(&self, version: u64) -> bool {
        self.entries.iter().any(|e| e.version == version)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Membership Filter
//!
//! Probabilistic set of every key ever accepted. Lookups consult it before
//! touching disk:
//! - `might_contain(key) == false`: the key was never written, skip the scan
//! - `might_contain(key) == true`: the key may exist, scan segments
//!
//! The filter never yields a false negative for a key added to it. False
//! positives only cost an unnecessary scan.
//!
//! ## Persistence
//! The filter is written as one JSON document on graceful shutdown and read
//! back on startup. A missing snapshot starts an empty filter; it is not
//! rebuilt from segments.

use std::fs;
use std::path::Path;

use bloomfilter::Bloom;
use serde::{Deserialize, Serialize};

use crate::error::{LogKvError, Result};
use crate::storage::fsutil;

/// Snapshot format version
const SNAPSHOT_VERSION: u8 = 1;

/// On-disk form of the filter
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterSnapshot {
    version: u8,
    capacity: usize,
    fp_rate: f64,
    item_count: u64,
    num_bits: u64,
    num_hashes: u32,
    sip_keys: [(u64, u64); 2],
    bitmap: Vec<u8>,
}

/// Bloom filter over record keys
pub struct MembershipFilter {
    bloom: Bloom<[u8]>,
    capacity: usize,
    fp_rate: f64,
    item_count: u64,
}

impl MembershipFilter {
    /// Allocate an empty filter sized for `capacity` keys at `fp_rate`
    pub fn new(capacity: usize, fp_rate: f64) -> Self {
        let bloom = Bloom::new_for_fp_rate(capacity, fp_rate);

        tracing::debug!(
            capacity,
            fp_rate,
            bitmap_bits = bloom.number_of_bits(),
            num_hashes = bloom.number_of_hash_functions(),
            "Created membership filter"
        );

        Self {
            bloom,
            capacity,
            fp_rate,
            item_count: 0,
        }
    }

    /// Load the snapshot at `path`, or allocate a fresh filter
    ///
    /// A snapshot that fails to parse is discarded with a warning; the engine
    /// keeps running with an empty filter.
    pub fn load_or_new(path: &Path, capacity: usize, fp_rate: f64) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No membership filter snapshot, starting empty");
            return Ok(Self::new(capacity, fp_rate));
        }

        let data = fs::read(path)?;
        match Self::from_json(&data) {
            Ok(filter) => {
                tracing::info!(
                    path = %path.display(),
                    items = filter.item_count,
                    "Loaded membership filter snapshot"
                );
                Ok(filter)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Discarding unreadable membership filter snapshot"
                );
                Ok(Self::new(capacity, fp_rate))
            }
        }
    }

    /// Add a key
    pub fn add(&mut self, key: &str) {
        self.bloom.set(key.as_bytes());
        self.item_count += 1;
    }

    /// Check whether a key may have been added
    pub fn might_contain(&self, key: &str) -> bool {
        self.bloom.check(key.as_bytes())
    }

    /// Number of `add` calls (duplicates included)
    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size_bits(&self) -> u64 {
        self.bloom.number_of_bits()
    }

    /// Serialize to the JSON snapshot form
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let snapshot = FilterSnapshot {
            version: SNAPSHOT_VERSION,
            capacity: self.capacity,
            fp_rate: self.fp_rate,
            item_count: self.item_count,
            num_bits: self.bloom.number_of_bits(),
            num_hashes: self.bloom.number_of_hash_functions(),
            sip_keys: self.bloom.sip_keys(),
            bitmap: self.bloom.bitmap(),
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Rebuild a filter from its JSON snapshot
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let snapshot: FilterSnapshot = serde_json::from_slice(data)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LogKvError::Storage(format!(
                "Unsupported membership filter version: {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let expected_len = snapshot.num_bits.div_ceil(8) as usize;
        if snapshot.num_bits == 0 || snapshot.bitmap.len() != expected_len {
            return Err(LogKvError::Storage(format!(
                "Membership filter bitmap is {} bytes, expected {} for {} bits",
                snapshot.bitmap.len(),
                expected_len,
                snapshot.num_bits
            )));
        }
        if snapshot.num_hashes == 0 {
            return Err(LogKvError::Storage(
                "Membership filter has zero hash functions".to_string(),
            ));
        }

        let bloom = Bloom::from_existing(
            &snapshot.bitmap,
            snapshot.num_bits,
            snapshot.num_hashes,
            snapshot.sip_keys,
        );

        Ok(Self {
            bloom,
            capacity: snapshot.capacity,
            fp_rate: snapshot.fp_rate,
            item_count: snapshot.item_count,
        })
    }

    /// Write the snapshot to `path`, replacing any previous one atomically
    pub fn persist(&self, path: &Path) -> Result<()> {
        let bytes = self.to_json()?;
        fsutil::write_atomic(path, &bytes)?;
        tracing::info!(
            path = %path.display(),
            items = self.item_count,
            bytes = bytes.len(),
            "Persisted membership filter"
        );
        Ok(())
    }
}

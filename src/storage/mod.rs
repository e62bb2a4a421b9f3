//! Storage Module
//!
//! Persistent storage layer: append-only segment files plus a manifest.
//!
//! ## Responsibilities
//! - Append flushed records to the active segment
//! - Rotate to a new segment once the active one reaches the threshold
//! - Keep the manifest in lockstep with the segment directory
//! - Scan segments newest → oldest for lookups
//! - Compact sealed segments down to the last record per key
//!
//! ## Layout
//! ```text
//! {data_dir}/
//!   ├── log/
//!   │   ├── datalog0.log      sealed   ┐
//!   │   ├── datalog1.log      sealed   │ newline-delimited JSON records
//!   │   └── datalog2.log      active   ┘
//!   └── resource/
//!       ├── file_resource.log          manifest, one descriptor per line
//!       └── membership_filter.json     filter snapshot
//! ```

pub mod fsutil;
pub mod segment;
mod manifest;
mod compactor;
mod manager;

pub use compactor::{compact_segment, dedup_records, CompactionResult};
pub use manager::{FlushOutcome, StorageManager};
pub use manifest::{Manifest, SegmentDescriptor};
pub use segment::{segment_file_name, SegmentContents};

/// Manifest file name inside the resource directory
pub const MANIFEST_FILE_NAME: &str = "file_resource.log";

/// Membership filter snapshot file name inside the resource directory
pub const FILTER_FILE_NAME: &str = "membership_filter.json";

//! Segment compaction
//!
//! Rewrites a sealed segment so that it holds only the latest record for
//! each key, using the same rule as lookups: max `created_at`, later in the
//! file on a tie. Retained records are ordered by their serialized JSON form.
//! The rewrite goes through a temp file and a rename, so the segment keeps
//! its name and the manifest needs no update.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::record::Record;

use super::fsutil;
use super::segment::read_segment;

/// Outcome of compacting one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    pub file_name: String,
    pub records_before: usize,
    pub records_after: usize,
    /// False when the segment had nothing to drop or could not be read cleanly
    pub rewritten: bool,
}

/// Keep the latest record per key, sorted by serialized form
///
/// Returns the retained records paired with their serialized lines.
pub fn dedup_records(records: Vec<Record>) -> Result<Vec<(String, Record)>> {
    let mut last_by_key: HashMap<String, Record> = HashMap::with_capacity(records.len());
    for record in records {
        match last_by_key.get(&record.key) {
            Some(kept) if kept.created_at > record.created_at => {}
            _ => {
                last_by_key.insert(record.key.clone(), record);
            }
        }
    }

    let mut retained = Vec::with_capacity(last_by_key.len());
    for record in last_by_key.into_values() {
        retained.push((serde_json::to_string(&record)?, record));
    }
    retained.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(retained)
}

/// Compact a single sealed segment in place
pub fn compact_segment(path: &Path) -> Result<CompactionResult> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let contents = read_segment(path)?;
    let records_before = contents.records.len();

    // Rewriting would silently discard the unreadable lines
    if contents.malformed_lines > 0 {
        tracing::warn!(
            segment = %file_name,
            malformed = contents.malformed_lines,
            "Segment has malformed lines, leaving it uncompacted"
        );
        return Ok(CompactionResult {
            file_name,
            records_before,
            records_after: records_before,
            rewritten: false,
        });
    }

    let retained = dedup_records(contents.records)?;
    let records_after = retained.len();

    if records_after == records_before {
        return Ok(CompactionResult {
            file_name,
            records_before,
            records_after,
            rewritten: false,
        });
    }

    let mut data = String::new();
    for (line, _) in &retained {
        data.push_str(line);
        data.push('\n');
    }
    fsutil::write_atomic(path, data.as_bytes())?;

    tracing::info!(
        segment = %file_name,
        records_before,
        records_after,
        "Compacted segment"
    );

    Ok(CompactionResult {
        file_name,
        records_before,
        records_after,
        rewritten: true,
    })
}

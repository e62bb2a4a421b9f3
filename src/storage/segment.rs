//! Segment files
//!
//! A segment is a file of newline-terminated JSON records named
//! `{base}{version}.log`. The active segment is appended to by flushes;
//! every other segment is sealed.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Result;
use crate::record::{encode_batch, Record};

use super::fsutil;

/// Segment file suffix
pub const SEGMENT_SUFFIX: &str = ".log";

/// Generate the file name for a segment version
/// ("datalog", 3) → "datalog3.log"
pub fn segment_file_name(base: &str, version: u64) -> String {
    format!("{}{}{}", base, version, SEGMENT_SUFFIX)
}

/// Whether a directory entry counts as a segment file
///
/// Any `{base}*.log` file counts, parseable version or not, so a stray file
/// with the segment prefix fails the startup parity check instead of being
/// silently ignored.
pub fn is_segment_file(base: &str, file_name: &str) -> bool {
    file_name.starts_with(base) && file_name.ends_with(SEGMENT_SUFFIX)
}

/// List segment file names in a directory, sorted
pub fn list_segment_files(dir: &Path, base: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_segment_file(base, &name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Parsed contents of a segment
#[derive(Debug, Default)]
pub struct SegmentContents {
    /// Records in file order
    pub records: Vec<Record>,
    /// Lines that failed to parse (skipped)
    pub malformed_lines: usize,
}

/// Read every record of a segment, skipping malformed lines
pub fn read_segment(path: &Path) -> Result<SegmentContents> {
    let reader = BufReader::new(File::open(path)?);
    let mut contents = SegmentContents::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match Record::from_line(&line) {
            Ok(record) => contents.records.push(record),
            Err(e) => {
                tracing::warn!(
                    segment = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed segment line"
                );
                contents.malformed_lines += 1;
            }
        }
    }

    Ok(contents)
}

/// Most recent record for `key` in one segment (max `created_at`)
pub fn find_in_segment(path: &Path, key: &str) -> Result<Option<Record>> {
    let contents = read_segment(path)?;
    Ok(contents
        .records
        .into_iter()
        .filter(|r| r.key == key)
        .max_by_key(|r| r.created_at))
}

/// Create (or truncate) a segment holding exactly `records`
pub fn write_segment(path: &Path, records: &[Record]) -> Result<u64> {
    let data = encode_batch(records)?;
    fsutil::write(path, data.as_bytes())?;
    Ok(data.len() as u64)
}

/// Append `records` to an existing segment
pub fn append_segment(path: &Path, records: &[Record]) -> Result<u64> {
    let data = encode_batch(records)?;
    fsutil::append(path, data.as_bytes())?;
    Ok(data.len() as u64)
}

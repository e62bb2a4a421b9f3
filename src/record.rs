//! Record definitions
//!
//! A record is a single logical write. Records are created once at ingest and
//! never mutated; a newer record with the same key supersedes an older one.
//!
//! ## On-disk form
//! One JSON object per line:
//! ```text
//! {"id":"…","key":"user:1","value":{…},"created":"2024-…Z","status":"add","clientId":"…","accountId":"admin"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// Lifecycle marker of a record
///
/// Only `Add` is produced by ingest. `Modify` and `Delete` are parsed when
/// present on disk but carry no extra semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Add,
    Modify,
    Delete,
}

/// A single logical write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique id assigned at ingest
    pub id: Uuid,

    /// Lookup key
    pub key: String,

    /// Opaque payload, never interpreted by the engine
    pub value: Value,

    /// Ingest timestamp; "most recent" tie-breaker
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,

    pub status: RecordStatus,

    /// Connection that submitted the record
    pub client_id: String,

    /// Account the server runs under
    pub account_id: String,
}

impl Record {
    /// Create an `Add` record stamped with a fresh id and the current time
    pub fn add(
        key: impl Into<String>,
        value: Value,
        client_id: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            value,
            created_at: Utc::now(),
            status: RecordStatus::Add,
            client_id: client_id.into(),
            account_id: account_id.into(),
        }
    }

    /// Serialize to a single newline-terminated segment line
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one segment line (trailing newline optional)
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

/// Serialize a batch of records into the bytes appended to a segment
pub fn encode_batch(records: &[Record]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_line()?);
    }
    Ok(out)
}

//! Response definitions
//!
//! Represents responses to clients.

use serde_json::Value;

use crate::error::{LogKvError, Result};
use crate::record::Record;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::NotFound),
            0x02 => Some(Status::Error),
            _ => None,
        }
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (record JSON for FIND, error message for ERROR)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create an OK response carrying a record
    pub fn record(record: &Record) -> Result<Self> {
        Ok(Self::ok(Some(serde_json::to_vec(record)?)))
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Payload as UTF-8 text (empty if none)
    pub fn text(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }

    /// Payload parsed as JSON (`null` if none)
    pub fn json(&self) -> Result<Value> {
        match &self.payload {
            Some(payload) => Ok(serde_json::from_slice(payload)?),
            None => Ok(Value::Null),
        }
    }

    /// Payload parsed as a record
    pub fn into_record(self) -> Result<Record> {
        let payload = self
            .payload
            .ok_or_else(|| LogKvError::Protocol("response carries no record".to_string()))?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

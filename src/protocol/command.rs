//! Command definitions
//!
//! Represents commands from clients.

use serde_json::{json, Map, Value};

use crate::error::{LogKvError, Result};

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Query = 0x01,
    Find = 0x02,
    Stop = 0x03,
    Ping = 0x04,
}

impl CommandType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(CommandType::Query),
            0x02 => Some(CommandType::Find),
            0x03 => Some(CommandType::Stop),
            0x04 => Some(CommandType::Ping),
            _ => None,
        }
    }
}

/// What a `query` asks the server to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Append a record
    Add,
    /// Anything else; accepted and ignored
    Other(String),
}

impl QueryKind {
    pub fn as_str(&self) -> &str {
        match self {
            QueryKind::Add => "add",
            QueryKind::Other(kind) => kind.as_str(),
        }
    }
}

impl From<&str> for QueryKind {
    fn from(kind: &str) -> Self {
        match kind {
            "add" => QueryKind::Add,
            other => QueryKind::Other(other.to_string()),
        }
    }
}

/// Body of a `query` request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// `None` when the client sent no key (or an empty one)
    pub key: Option<String>,
    pub kind: QueryKind,
    pub payload: Value,
}

impl QueryRequest {
    /// An `add` query for `key`
    pub fn add(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: Some(key.into()),
            kind: QueryKind::Add,
            payload,
        }
    }

    /// JSON body sent on the wire
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        if let Some(key) = &self.key {
            body.insert("key".to_string(), Value::String(key.clone()));
        }
        body.insert("type".to_string(), Value::String(self.kind.as_str().to_string()));
        body.insert("payload".to_string(), self.payload.clone());
        Value::Object(body)
    }
}

/// Validate a `query` body
///
/// - body must be a JSON object
/// - `key`: absent, `null` or `""` means "no key"; any other non-string is rejected
/// - `type`: absent or `null` is an ignored query; a non-string is rejected
/// - `payload`: any JSON, `null` when absent
pub fn parse_query(body: &Value) -> Result<QueryRequest> {
    let Value::Object(fields) = body else {
        return Err(LogKvError::InvalidRequest(
            "query body must be a JSON object".to_string(),
        ));
    };

    let key = match fields.get("key") {
        None | Some(Value::Null) => None,
        Some(Value::String(key)) if key.is_empty() => None,
        Some(Value::String(key)) => Some(key.clone()),
        Some(other) => {
            return Err(LogKvError::InvalidRequest(format!(
                "query key must be a string, got {}",
                other
            )))
        }
    };

    let kind = match fields.get("type") {
        None | Some(Value::Null) => QueryKind::Other(String::new()),
        Some(Value::String(kind)) => QueryKind::from(kind.as_str()),
        Some(other) => {
            return Err(LogKvError::InvalidRequest(format!(
                "query type must be a string, got {}",
                other
            )))
        }
    };

    let payload = fields.get("payload").cloned().unwrap_or(Value::Null);

    Ok(QueryRequest { key, kind, payload })
}

/// Validate a `find` body: `{"key": "<non-empty string>"}`
pub fn parse_find(body: &Value) -> Result<String> {
    match body.get("key") {
        Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
        Some(Value::String(_)) => Err(LogKvError::InvalidRequest(
            "find key must not be empty".to_string(),
        )),
        Some(other) if !other.is_null() => Err(LogKvError::InvalidRequest(format!(
            "find key must be a string, got {}",
            other
        ))),
        _ => Err(LogKvError::InvalidRequest("find requires a key".to_string())),
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Submit a query (ingest)
    Query(QueryRequest),

    /// Look up the latest record for a key
    Find { key: String },

    /// Drain and stop the server
    Stop,

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Query(_) => CommandType::Query,
            Command::Find { .. } => CommandType::Find,
            Command::Stop => CommandType::Stop,
            Command::Ping => CommandType::Ping,
        }
    }

    /// JSON body, or `None` for commands without one
    pub fn body(&self) -> Option<Value> {
        match self {
            Command::Query(request) => Some(request.to_body()),
            Command::Find { key } => Some(json!({ "key": key })),
            Command::Stop | Command::Ping => None,
        }
    }
}

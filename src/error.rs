//! Error types for logkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using LogKvError
pub type Result<T> = std::result::Result<T, LogKvError>;

/// Unified error type for logkv operations
#[derive(Debug, Error)]
pub enum LogKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Manifest / Recovery Errors (fatal at startup)
    // -------------------------------------------------------------------------
    #[error(
        "Manifest out of sync with data directory: {manifest_entries} manifest entries, {segment_files} segment files"
    )]
    ManifestMismatch {
        manifest_entries: usize,
        segment_files: usize,
    },

    #[error("Manifest corrupted at line {line}: {reason}")]
    ManifestCorrupt { line: usize, reason: String },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Request / Network Errors
    // -------------------------------------------------------------------------
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),
}

impl LogKvError {
    /// Whether this error must abort startup rather than fail a single request
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LogKvError::ManifestMismatch { .. }
                | LogKvError::ManifestCorrupt { .. }
                | LogKvError::Config(_)
        )
    }
}

//! Configuration for logkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LogKvError, Result};

/// Main configuration for a logkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── log/                          (segment files)
    ///     │   ├── datalog0.log
    ///     │   └── datalog1.log
    ///     └── resource/
    ///         ├── file_resource.log         (manifest)
    ///         └── membership_filter.json    (filter snapshot)
    pub data_dir: PathBuf,

    /// Segment file prefix: files are named `{segment_base_name}{version}.log`
    pub segment_base_name: String,

    /// Once the active segment reaches this many bytes the next flush rotates
    pub rotation_threshold_bytes: u64,

    // -------------------------------------------------------------------------
    // Background Task Configuration
    // -------------------------------------------------------------------------
    /// Period of the flush timer (milliseconds)
    pub flush_interval_ms: u64,

    /// Period of the compaction timer (milliseconds)
    pub compaction_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Lookup Configuration
    // -------------------------------------------------------------------------
    /// Expected number of distinct keys in the membership filter
    pub filter_capacity: usize,

    /// Target false positive rate of the membership filter
    pub filter_fp_rate: f64,

    /// Max entries held by the lookup cache before LRU eviction
    pub cache_capacity: usize,

    /// Max connection events retained in the audit log
    pub audit_log_capacity: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Host to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Account name stamped on every ingested record
    pub account_name: String,

    /// Account credential (accepted, not checked)
    pub credential: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./logkv_data"),
            segment_base_name: "datalog".to_string(),
            rotation_threshold_bytes: 2000,
            flush_interval_ms: 500,
            compaction_interval_ms: 50_000,
            filter_capacity: 100_000,
            filter_fp_rate: 0.01,
            cache_capacity: 10_000,
            audit_log_capacity: 10_000,
            host: "127.0.0.1".to_string(),
            port: 3070,
            account_name: "admin".to_string(),
            credential: String::new(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding segment files
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("log")
    }

    /// Directory holding the manifest and filter snapshot
    pub fn resource_dir(&self) -> PathBuf {
        self.data_dir.join("resource")
    }

    /// `host:port` string for the TCP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn compaction_interval(&self) -> Duration {
        Duration::from_millis(self.compaction_interval_ms)
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        if self.segment_base_name.is_empty() {
            return Err(LogKvError::Config(
                "segment_base_name must not be empty".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(LogKvError::Config(
                "flush_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.compaction_interval_ms == 0 {
            return Err(LogKvError::Config(
                "compaction_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.filter_capacity == 0 {
            return Err(LogKvError::Config(
                "filter_capacity must be greater than zero".to_string(),
            ));
        }
        if !(self.filter_fp_rate > 0.0 && self.filter_fp_rate < 1.0) {
            return Err(LogKvError::Config(format!(
                "filter_fp_rate must be in (0, 1), got {}",
                self.filter_fp_rate
            )));
        }
        if self.cache_capacity == 0 {
            return Err(LogKvError::Config(
                "cache_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment file prefix
    pub fn segment_base_name(mut self, name: impl Into<String>) -> Self {
        self.config.segment_base_name = name.into();
        self
    }

    /// Set the rotation threshold (in bytes)
    pub fn rotation_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.rotation_threshold_bytes = bytes;
        self
    }

    /// Set the flush timer period (in milliseconds)
    pub fn flush_interval_ms(mut self, ms: u64) -> Self {
        self.config.flush_interval_ms = ms;
        self
    }

    /// Set the compaction timer period (in milliseconds)
    pub fn compaction_interval_ms(mut self, ms: u64) -> Self {
        self.config.compaction_interval_ms = ms;
        self
    }

    /// Set the membership filter capacity and false positive rate
    pub fn filter(mut self, capacity: usize, fp_rate: f64) -> Self {
        self.config.filter_capacity = capacity;
        self.config.filter_fp_rate = fp_rate;
        self
    }

    /// Set the lookup cache capacity
    pub fn cache_capacity(mut self, entries: usize) -> Self {
        self.config.cache_capacity = entries;
        self
    }

    /// Set the audit log capacity
    pub fn audit_log_capacity(mut self, events: usize) -> Self {
        self.config.audit_log_capacity = events;
        self
    }

    /// Set the listen host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the listen port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the account name stamped on records
    pub fn account_name(mut self, name: impl Into<String>) -> Self {
        self.config.account_name = name.into();
        self
    }

    /// Set the account credential
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.config.credential = credential.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

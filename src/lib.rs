//! # logkv
//!
//! A log-structured key-value store with:
//! - Buffered ingest that never blocks on disk (primary + shadow queues)
//! - Append-only JSON segment files with size-based rotation
//! - A manifest checked against the data directory on every startup
//! - Bloom-filter-gated lookups with a bounded LRU cache in front
//! - Background compaction of sealed segments
//! - TCP-based client protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │        (Lifecycle, flush + compaction timers)                │
//! └──────┬──────────────┬───────────────┬───────────────────────┘
//!        │ write        │ write/read    │ read
//!        ▼              ▼               ▼
//!   ┌──────────┐  ┌──────────────┐  ┌──────────┐
//!   │  Buffer  │  │ Cache/Filter │  │ Segments │◀── Manifest
//!   └────┬─────┘  └──────────────┘  └──────────┘
//!        │ flush                         ▲
//!        └───────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod buffer;
pub mod cache;
pub mod filter;
pub mod audit;
pub mod storage;
pub mod lifecycle;
pub mod engine;
pub mod network;
pub mod protocol;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LogKvError, Result};
pub use config::Config;
pub use engine::Engine;
pub use record::{Record, RecordStatus};
pub use client::Client;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of logkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

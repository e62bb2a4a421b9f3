//! logkv Server Binary
//!
//! Starts the TCP server for logkv.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use logkv::network::Server;
use logkv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// logkv Server
#[derive(Parser, Debug)]
#[command(name = "logkv-server")]
#[command(about = "Log-structured key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./logkv_data")]
    data_dir: PathBuf,

    /// Listen host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listen port
    #[arg(short, long, default_value_t = 3070)]
    port: u16,

    /// Account name stamped on every record
    #[arg(short, long, default_value = "admin")]
    name: String,

    /// Account credential (accepted, not checked)
    #[arg(long, default_value = "")]
    password: String,

    /// Flush interval in milliseconds
    #[arg(long, default_value_t = 500)]
    flush_interval_ms: u64,

    /// Compaction interval in milliseconds
    #[arg(long, default_value_t = 50_000)]
    compaction_interval_ms: u64,

    /// Segment size that triggers rotation, in bytes
    #[arg(long, default_value_t = 2000)]
    rotation_threshold: u64,

    /// Maximum concurrent connections
    #[arg(short, long, default_value_t = 1024)]
    max_connections: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,logkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("logkv Server v{}", logkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .host(&args.host)
        .port(args.port)
        .account_name(&args.name)
        .credential(&args.password)
        .flush_interval_ms(args.flush_interval_ms)
        .compaction_interval_ms(args.compaction_interval_ms)
        .rotation_threshold_bytes(args.rotation_threshold)
        .max_connections(args.max_connections)
        .build();

    // Open engine: manifest check and filter load happen here
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = engine.start_background_tasks() {
        tracing::error!("Failed to start background tasks: {}", e);
        process::exit(1);
    }

    let mut server = Server::new(config, Arc::clone(&engine));

    // Ctrl+C / SIGTERM stop the accept loop; draining happens below
    let handle = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received termination signal, initiating shutdown...");
        handle.shutdown();
    }) {
        tracing::warn!("Failed to install signal handler: {}", e);
    }

    let result = server.run();

    if let Err(e) = engine.drain() {
        tracing::error!("Shutdown failed: {}", e);
    }

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        process::exit(1);
    }

    tracing::info!("Server stopped");
}

//! logkv CLI Client
//!
//! Command-line interface for interacting with logkv.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use logkv::protocol::parse_query;
use logkv::{Client, Result};
use serde_json::Value;

/// logkv CLI
#[derive(Parser, Debug)]
#[command(name = "logkv-cli")]
#[command(about = "CLI for the logkv key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:3070")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a record
    Add {
        /// The key to write
        key: String,

        /// The value; parsed as JSON, sent as a string otherwise
        value: String,
    },

    /// Find the latest record for a key
    Find {
        /// The key to look up
        key: String,
    },

    /// Send queries from a file, one JSON object per line
    Load {
        /// File of `{"key": ..., "type": ..., "payload": ...}` lines
        file: PathBuf,
    },

    /// Ask the server to drain and stop
    Stop,

    /// Ping the server
    Ping,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut client = Client::connect(args.server.as_str())?;

    match args.command {
        Commands::Add { key, value } => {
            let value = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            client.add(&key, value)?;
            println!("OK");
        }
        Commands::Find { key } => match client.find(&key)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("(not found)"),
        },
        Commands::Load { file } => {
            let contents = fs::read_to_string(&file)?;
            let mut sent = 0usize;
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                let body: Value = serde_json::from_str(line)?;
                client.query(parse_query(&body)?)?;
                sent += 1;
            }
            println!("Sent {} queries", sent);
        }
        Commands::Stop => {
            client.stop()?;
            println!("Server stopping");
        }
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }
    }

    Ok(())
}

//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::audit::ConnectionEventKind;
use crate::engine::Engine;
use crate::error::{LogKvError, Result};
use crate::protocol::{command_from_frame, read_frame, write_response, Command, Response};

use super::server::ShutdownHandle;

/// Reply body for PING
const PONG: &[u8] = b"PONG";

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Reference to the storage engine
    engine: Arc<Engine>,

    /// Used by STOP to end the accept loop
    shutdown: ShutdownHandle,

    /// Id stamped on records and audit events from this connection
    client_id: String,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and assigns the connection a fresh client id
    pub fn new(stream: TcpStream, engine: Arc<Engine>, shutdown: ShutdownHandle) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            engine,
            shutdown,
            client_id: Uuid::new_v4().simple().to_string(),
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Records connect/disconnect in the engine's audit log around the
    /// request loop.
    pub fn handle(&mut self) -> Result<()> {
        self.engine
            .record_connection(&self.client_id, ConnectionEventKind::Connected);
        tracing::debug!(client = %self.client_id, peer = %self.peer_addr, "Client connected");

        let result = self.serve();

        self.engine
            .record_connection(&self.client_id, ConnectionEventKind::Disconnected);
        tracing::debug!(client = %self.client_id, peer = %self.peer_addr, "Client disconnected");
        result
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            let frame = match read_frame(&mut self.reader) {
                Ok(frame) => frame,
                Err(LogKvError::Io(ref e)) if is_disconnect(e.kind()) => return Ok(()),
                Err(LogKvError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    tracing::debug!(peer = %self.peer_addr, "Read timeout");
                    return Ok(());
                }
                Err(e) => {
                    // Bad header: the stream can no longer be framed
                    tracing::warn!(peer = %self.peer_addr, error = %e, "Unreadable frame");
                    let _ = self.send_response(Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            let (response, stop) = match command_from_frame(&frame) {
                Ok(command) => {
                    tracing::trace!(peer = %self.peer_addr, ?command, "Received command");
                    let stop = command == Command::Stop;
                    (self.execute_command(command), stop)
                }
                Err(e) => {
                    tracing::debug!(peer = %self.peer_addr, error = %e, "Rejected request");
                    (Response::error(&e.to_string()), false)
                }
            };

            if let Err(e) = self.send_response(response) {
                if let LogKvError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            peer = %self.peer_addr,
                            error = %e,
                            "Client disconnected before response could be sent"
                        );
                        return Ok(());
                    }
                }
                tracing::warn!(peer = %self.peer_addr, error = %e, "Error writing response");
                return Err(e);
            }

            if stop {
                self.shutdown.shutdown();
                return Ok(());
            }
        }
    }

    /// Execute a command and return a response
    fn execute_command(&self, command: Command) -> Response {
        match command {
            Command::Query(request) => match self.engine.ingest(request, &self.client_id) {
                Ok(_) => Response::ok(None),
                Err(e) => Response::error(&e.to_string()),
            },
            Command::Find { key } => match self.engine.find_by_key(&key) {
                Ok(Some(record)) => {
                    Response::record(&record).unwrap_or_else(|e| Response::error(&e.to_string()))
                }
                Ok(None) => Response::not_found(),
                Err(e) => Response::error(&e.to_string()),
            },
            Command::Stop => {
                tracing::info!(client = %self.client_id, "Stop requested");
                Response::ok(None)
            }
            Command::Ping => Response::ok(Some(PONG.to_vec())),
        }
    }

    /// Send a response to the client
    fn send_response(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

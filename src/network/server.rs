//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{LogKvError, Result};

use super::connection::Connection;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cloneable trigger that ends a server's accept loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// TCP server for logkv
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    listener: Option<TcpListener>,
    shutdown: ShutdownHandle,
    /// Connections currently being served
    active: Arc<AtomicUsize>,
}

/// Decrements the active-connection count when a worker exits
struct ActiveSlot(Arc<AtomicUsize>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    /// Create a new server with the given config and engine
    pub fn new(config: Config, engine: Arc<Engine>) -> Self {
        Self {
            config,
            engine,
            listener: None,
            shutdown: ShutdownHandle::default(),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the listen address; returns the bound address (useful with port 0)
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }

        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .map_err(|e| LogKvError::Network(format!("failed to bind {}: {}", addr, e)))?;
        listener.set_nonblocking(true)?;

        let local = listener.local_addr()?;
        tracing::info!(addr = %local, "Listening");
        self.listener = Some(listener);
        Ok(local)
    }

    /// Start the server (blocking until shut down)
    pub fn run(&mut self) -> Result<()> {
        self.bind()?;
        let Some(listener) = self.listener.take() else {
            return Err(LogKvError::Network("listener not bound".to_string()));
        };

        while !self.shutdown.is_shutdown() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                        tracing::warn!(
                            peer = %addr,
                            max = self.config.max_connections,
                            "Connection limit reached, rejecting"
                        );
                        drop(stream);
                        continue;
                    }
                    // One client's setup failure must not end the accept loop
                    if let Err(e) = self.spawn_connection(stream) {
                        tracing::warn!(peer = %addr, error = %e, "Connection setup failed, dropping");
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    // Persistent errors (e.g. out of file descriptors) would spin
                    tracing::warn!(error = %e, "Accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!(
            active = self.active.load(Ordering::SeqCst),
            "Accept loop stopped"
        );
        Ok(())
    }

    fn spawn_connection(&self, stream: std::net::TcpStream) -> Result<()> {
        // Accepted sockets inherit non-blocking mode on some platforms
        stream.set_nonblocking(false)?;
        let mut connection =
            Connection::new(stream, Arc::clone(&self.engine), self.shutdown.clone())?;
        connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)?;

        self.active.fetch_add(1, Ordering::SeqCst);
        let slot = ActiveSlot(Arc::clone(&self.active));

        thread::Builder::new()
            .name(format!("logkv-conn-{}", connection.client_id()))
            .spawn(move || {
                let _slot = slot;
                if let Err(e) = connection.handle() {
                    tracing::debug!(peer = %connection.peer_addr(), error = %e, "Connection ended with error");
                }
            })?;
        Ok(())
    }

    /// Handle that stops the accept loop from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

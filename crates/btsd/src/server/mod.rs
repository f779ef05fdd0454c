//! Unix socket server for the profile service.
//!
//! The server:
//! - Listens on a Unix socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  ServiceServer  │
//! │                 │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐  LoopHandle::call  ┌─────────────────┐
//! │ConnectionHandler│───────────────────▶│ ProfileManager  │
//! │   (per client)  │                    │  (AG + HF)      │
//! └───────▲─────────┘                    └───────┬─────────┘
//!         │ Frame::Push                          │ listener calls
//!         │                                      ▼
//! ┌───────┴─────────┐                    ┌─────────────────┐
//! │  push writer    │◀───── mpsc ────────│  PushForwarder  │
//! └─────────────────┘                    └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;
mod registrations;

pub use connection::{send_frame, ConnectionError, ConnectionHandler, FrameWriter};
pub use registrations::ConnectionRegistrations;

use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::manager::ProfileManager;

pub use crate::config::DEFAULT_SOCKET_PATH;

/// Unix socket server exposing the profile services.
pub struct ServiceServer {
    /// Path to the Unix socket
    socket_path: PathBuf,

    manager: ProfileManager,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

impl ServiceServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        manager: ProfileManager,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            manager,
            cancel_token,
        }
    }

    /// Creates a server with the default socket path.
    pub fn with_default_path(manager: ProfileManager, cancel_token: CancellationToken) -> Self {
        Self::new(DEFAULT_SOCKET_PATH, manager, cancel_token)
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the server.
    ///
    /// Listens for connections until the cancellation token is triggered.
    /// This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        // Remove existing socket file if present
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;
        }

        // Create parent directory if needed
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ServerError::SocketSetup {
                    path: self.socket_path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;

        info!(
            socket = %self.socket_path.display(),
            "Service server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            // Connection ids double as remote identities.
                            let connection_id = self.manager.remote_ids().next();
                            self.handle_connection(stream, connection_id);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    /// Spawns a handler task for a new client connection.
    ///
    /// The handler gets a child token: the server's shutdown closes it, and
    /// its own close leaves the server running.
    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_id: u64) {
        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            self.manager.clone(),
            self.cancel_token.child_token(),
            connection_id,
        );
        tokio::spawn(handler.run());
    }

    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

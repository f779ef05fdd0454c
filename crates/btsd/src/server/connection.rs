//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs protocol version negotiation
//! - Decodes request frames and runs them against the profile services
//! - Holds the connection's listener registrations
//! - Writes pushes for those listeners from a dedicated writer task
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::sync::Arc;
use std::time::Duration;

use bt_core::ProfileId;
use bt_protocol::{Frame, ProtocolVersion, Push, Reply, Request, MAX_FRAME_SIZE};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::registrations::ConnectionRegistrations;
use crate::forward::PushForwarder;
use crate::manager::ProfileManager;

/// Shared writer handle; responses and pushes interleave whole frames.
pub type FrameWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Read timeout for idle connections that hold no listener (5 minutes).
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,
    writer: FrameWriter,
    manager: ProfileManager,
    registrations: ConnectionRegistrations,
    push_tx: mpsc::UnboundedSender<Push>,
    push_rx: Option<mpsc::UnboundedReceiver<Push>>,
    cancel_token: CancellationToken,
    connection_id: u64,
    client_name: Option<String>,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        manager: ProfileManager,
        cancel_token: CancellationToken,
        connection_id: u64,
    ) -> Self {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            manager,
            registrations: ConnectionRegistrations::new(connection_id),
            push_tx,
            push_rx: Some(push_rx),
            cancel_token,
            connection_id,
            client_name: None,
        }
    }

    /// Runs the connection until the peer leaves or the server shuts down.
    ///
    /// Registrations are released on every exit path.
    pub async fn run(mut self) {
        debug!(connection_id = self.connection_id, "New client connected");

        if let Err(e) = self.handle_handshake().await {
            warn!(
                connection_id = self.connection_id,
                error = %e,
                "Handshake failed"
            );
            return;
        }
        info!(
            connection_id = self.connection_id,
            client = ?self.client_name,
            "Client handshake completed"
        );

        let writer_task = self.push_rx.take().map(|rx| {
            tokio::spawn(write_pushes(
                rx,
                Arc::clone(&self.writer),
                self.cancel_token.clone(),
                self.connection_id,
            ))
        });

        if let Err(e) = self.process_frames().await {
            debug!(
                connection_id = self.connection_id,
                error = %e,
                "Connection closed"
            );
        }

        self.cancel_token.cancel();
        let Self {
            registrations,
            manager,
            connection_id,
            ..
        } = self;
        registrations.release(&manager);
        if let Some(task) = writer_task {
            let _ = task.await;
        }

        info!(connection_id, "Client disconnected");
    }

    /// Expects `Hello`, answers `Welcome` or `Rejected`.
    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let frame = match timeout(READ_TIMEOUT, self.read_frame()).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::Timeout),
        };

        match frame {
            Frame::Hello {
                protocol_version,
                client_name,
            } => {
                if !protocol_version.is_compatible_with(&ProtocolVersion::CURRENT) {
                    warn!(
                        client_version = %protocol_version,
                        server_version = %ProtocolVersion::CURRENT,
                        "Protocol version mismatch"
                    );
                    self.send_frame(&Frame::rejected(&format!(
                        "Protocol version {} not compatible with server version {}",
                        protocol_version,
                        ProtocolVersion::CURRENT
                    )))
                    .await?;
                    return Err(ConnectionError::VersionMismatch {
                        client: protocol_version,
                        server: ProtocolVersion::CURRENT,
                    });
                }

                self.client_name = client_name;
                self.send_frame(&Frame::welcome(self.connection_id)).await
            }
            other => {
                self.send_frame(&Frame::rejected("Expected hello frame for handshake"))
                    .await?;
                Err(ConnectionError::UnexpectedMessage(other.kind().to_string()))
            }
        }
    }

    async fn process_frames(&mut self) -> Result<(), ConnectionError> {
        let cancel_token = self.cancel_token.clone();
        let connection_id = self.connection_id;

        loop {
            let idle_timeout = self.registrations.is_empty();
            let result = tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!(connection_id, "Connection cancelled");
                    return Ok(());
                }
                result = self.read_request_frame(idle_timeout) => result,
            };

            let frame = match result {
                Ok(frame) => frame,
                Err(ConnectionError::Eof) => {
                    debug!(connection_id, "Client sent EOF");
                    return Ok(());
                }
                Err(ConnectionError::ParseError(e)) => {
                    // A garbled line costs only that line.
                    warn!(connection_id, error = %e, "Dropping bad frame");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match frame {
                Frame::Request { id, body } => {
                    let reply = self.handle_request(body).await;
                    self.send_frame(&Frame::Response { id, body: reply }).await?;
                }
                other => {
                    debug!(
                        connection_id = self.connection_id,
                        kind = other.kind(),
                        "Ignoring unexpected frame"
                    );
                }
            }
        }
    }

    /// Reads one frame, bounded by the idle timeout when `idle_timeout`.
    async fn read_request_frame(&mut self, idle_timeout: bool) -> Result<Frame, ConnectionError> {
        if !idle_timeout {
            return self.read_frame().await;
        }
        match timeout(READ_TIMEOUT, self.read_frame()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    async fn handle_request(&mut self, request: Request) -> Reply {
        let profile = request.profile();
        if request.is_register() {
            let forwarder = Arc::new(PushForwarder::new(self.push_tx.clone()));
            let result = self.registrations.register(&self.manager, profile, forwarder);
            if let Ok(cookie) = &result {
                info!(
                    connection_id = self.connection_id,
                    profile = %profile,
                    cookie = %cookie,
                    "Remote listener registered"
                );
            }
            return Reply::from_status(result.map(|_| ()));
        }
        if request.is_unregister() {
            return Reply::from_status(self.registrations.unregister(&self.manager, profile));
        }
        self.manager.execute(request).await
    }

    async fn read_frame(&mut self) -> Result<Frame, ConnectionError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_FRAME_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let frame = Frame::decode(&line).map_err(|e| ConnectionError::ParseError(e.to_string()))?;
        trace!(connection_id = self.connection_id, kind = frame.kind(), "Received frame");
        Ok(frame)
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), ConnectionError> {
        send_frame(&self.writer, frame).await
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Whether the connection holds a listener for `profile`.
    pub fn is_registered(&self, profile: ProfileId) -> bool {
        self.registrations.cookie(profile).is_some()
    }
}

/// Drains the connection's push queue onto the socket.
async fn write_pushes(
    mut rx: mpsc::UnboundedReceiver<Push>,
    writer: FrameWriter,
    cancel_token: CancellationToken,
    connection_id: u64,
) {
    loop {
        let push = tokio::select! {
            _ = cancel_token.cancelled() => break,
            push = rx.recv() => match push {
                Some(push) => push,
                None => break,
            },
        };

        if let Err(e) = send_frame(&writer, &Frame::Push { body: push }).await {
            debug!(connection_id, error = %e, "Failed to write push, stopping writer");
            cancel_token.cancel();
            break;
        }
    }
}

/// Writes one frame under the shared writer lock.
pub async fn send_frame(writer: &FrameWriter, frame: &Frame) -> Result<(), ConnectionError> {
    let line = frame
        .encode()
        .map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    let mut writer = writer.lock().await;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

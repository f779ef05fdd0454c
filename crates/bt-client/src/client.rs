//! Socket RPC client.
//!
//! This module provides the `RpcClient` which handles:
//! - Connection to the service via Unix socket, with bounded retry
//! - The hello/welcome handshake
//! - Request/response correlation by frame id
//! - Fan-out of push frames to subscribers
//!
//! One reader task owns the read half. It completes pending calls by id
//! and forwards pushes to a broadcast channel. When the connection drops,
//! every pending call fails with [`ClientError::ConnectionClosed`].
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bt_protocol::{Frame, ProtocolVersion, Push, Reply, Request, MAX_FRAME_SIZE};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{broadcast, oneshot};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{ClientError, Result};
use crate::transport::{Transport, PUSH_CHANNEL_CAPACITY};

// ============================================================================
// Configuration
// ============================================================================

/// Connection behavior for [`RpcClient`].
///
/// # Example
///
/// ```rust
/// use bt_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     socket_path: std::path::PathBuf::from("/tmp/my-btsd.sock"),
///     retry_initial_delay: Duration::from_millis(20),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path to the Unix socket where the service listens.
    pub socket_path: PathBuf,

    /// Sent in the hello frame; shows up in service logs.
    pub client_name: Option<String>,

    /// Connection attempts after the first one fails.
    pub connect_retries: u32,

    /// Delay before the first retry.
    pub retry_initial_delay: Duration,

    /// Maximum delay between retry attempts.
    pub retry_max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub retry_multiplier: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/btsd.sock"),
            client_name: None,
            connect_retries: 3,
            retry_initial_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(2),
            retry_multiplier: 2.0,
        }
    }
}

// ============================================================================
// Shared connection state
// ============================================================================

type Pending = HashMap<u64, oneshot::Sender<Reply>>;

struct Shared {
    pending: Mutex<Pending>,
    closed: AtomicBool,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the connection closed and fails every outstanding call.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let dropped = {
            let mut pending = self.pending();
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            debug!(dropped, "Failed pending calls on connection loss");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Write side, owned by whoever holds the call lock.
struct CallState {
    writer: BufWriter<OwnedWriteHalf>,
    next_id: u64,
}

// ============================================================================
// RPC Client
// ============================================================================

/// Client end of one socket connection to the service.
///
/// Calls are serialized: one request is in flight per client at a time.
/// The call lock is a guard, so it is released on every exit path.
pub struct RpcClient {
    call_lock: tokio::sync::Mutex<CallState>,
    shared: Arc<Shared>,
    pushes: broadcast::Sender<Push>,
    cancel_token: CancellationToken,
    connection_id: u64,
}

impl RpcClient {
    /// Connects, retrying with exponential backoff, and performs the
    /// handshake.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = connect_with_retry(config).await?;
        Self::handshake(stream, config.client_name.clone()).await
    }

    async fn handshake(stream: UnixStream, client_name: Option<String>) -> Result<Self> {
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);

        write_frame(&mut writer, &Frame::hello(client_name)).await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ClientError::ConnectionClosed);
        }

        let connection_id = match Frame::decode(&line)? {
            Frame::Welcome {
                protocol_version,
                connection_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(ClientError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        service_version: protocol_version.to_string(),
                    });
                }
                info!(
                    connection_id,
                    protocol_version = %protocol_version,
                    "Handshake complete"
                );
                connection_id
            }
            Frame::Rejected { reason, .. } => return Err(ClientError::Rejected(reason)),
            other => {
                return Err(ClientError::Protocol(format!(
                    "Unexpected {} frame during handshake",
                    other.kind()
                )))
            }
        };

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let (pushes, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        let cancel_token = CancellationToken::new();

        tokio::spawn(read_loop(
            reader,
            Arc::clone(&shared),
            pushes.clone(),
            cancel_token.clone(),
        ));

        Ok(Self {
            call_lock: tokio::sync::Mutex::new(CallState { writer, next_id: 0 }),
            shared,
            pushes,
            cancel_token,
            connection_id,
        })
    }

    /// The id the service assigned in its welcome frame.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Sends one request and waits for its response.
    pub async fn request(&self, request: Request) -> Result<Reply> {
        let mut state = self.call_lock.lock().await;

        if self.shared.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }

        state.next_id = state.next_id.wrapping_add(1);
        let id = state.next_id;
        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(id, tx);

        // The reader may have closed between the check and the insert.
        if self.shared.is_closed() {
            self.shared.pending().remove(&id);
            return Err(ClientError::ConnectionClosed);
        }

        trace!(id, op = request.opcode(), "Sending request");
        if let Err(e) = write_frame(&mut state.writer, &Frame::Request { id, body: request }).await {
            self.shared.pending().remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Closes the connection. Outstanding calls fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.cancel_token.cancel();
        self.shared.close();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[async_trait]
impl Transport for RpcClient {
    async fn call(&self, request: Request) -> Result<Reply> {
        self.request(request).await
    }

    fn subscribe(&self) -> broadcast::Receiver<Push> {
        self.pushes.subscribe()
    }

    fn is_connected(&self) -> bool {
        !self.shared.is_closed()
    }
}

async fn connect_with_retry(config: &ClientConfig) -> Result<UnixStream> {
    let mut delay = config.retry_initial_delay;
    let mut attempt = 0u32;
    let mut last_error = String::new();

    loop {
        attempt = attempt.saturating_add(1);

        debug!(
            attempt,
            socket_path = %config.socket_path.display(),
            "Attempting to connect to service"
        );

        if config.socket_path.exists() {
            match UnixStream::connect(&config.socket_path).await {
                Ok(stream) => {
                    debug!(attempt, "Connection successful");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Connection attempt failed");
                    last_error = e.to_string();
                }
            }
        } else if attempt > config.connect_retries {
            return Err(ClientError::ServiceNotRunning {
                path: config.socket_path.clone(),
            });
        }

        if attempt > config.connect_retries {
            return Err(ClientError::Connect {
                attempts: attempt,
                reason: last_error,
            });
        }

        sleep(delay).await;
        let next_delay_ms = (delay.as_millis() as f64 * config.retry_multiplier) as u64;
        delay = Duration::from_millis(next_delay_ms).min(config.retry_max_delay);
    }
}

async fn write_frame(writer: &mut BufWriter<OwnedWriteHalf>, frame: &Frame) -> Result<()> {
    let line = frame.encode()?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Routes incoming frames until the connection ends or is cancelled.
async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    shared: Arc<Shared>,
    pushes: broadcast::Sender<Push>,
    cancel_token: CancellationToken,
) {
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Reader cancelled");
                break;
            }
            read = reader.read_line(&mut line) => read,
        };

        match read {
            Ok(0) => {
                info!("Service closed connection");
                break;
            }
            Ok(_) if line.len() > MAX_FRAME_SIZE => {
                warn!(size = line.len(), "Oversized frame from service, closing");
                break;
            }
            Ok(_) => route_frame(&line, &shared, &pushes),
            Err(e) => {
                warn!(error = %e, "Read from service failed");
                break;
            }
        }
    }

    shared.close();
}

fn route_frame(line: &str, shared: &Shared, pushes: &broadcast::Sender<Push>) {
    match Frame::decode(line) {
        Ok(Frame::Response { id, body }) => match shared.pending().remove(&id) {
            Some(tx) => {
                let _ = tx.send(body);
            }
            None => debug!(id, "Response for unknown call"),
        },
        Ok(Frame::Push { body }) => {
            trace!(code = body.code(), "Push received");
            // No subscribers is fine.
            let _ = pushes.send(body);
        }
        Ok(other) => debug!(kind = other.kind(), "Ignoring unexpected frame"),
        Err(e) => warn!(error = %e, "Failed to decode frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/btsd.sock"));
        assert_eq!(config.connect_retries, 3);
        assert!(config.retry_initial_delay < config.retry_max_delay);
    }

    #[test]
    fn test_close_fails_pending_calls() {
        let shared = Shared {
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        };
        let (tx, mut rx) = oneshot::channel();
        shared.pending().insert(1, tx);

        shared.close();
        assert!(shared.is_closed());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_route_response_and_push() {
        let shared = Shared {
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        };
        let (pushes, mut push_rx) = broadcast::channel(4);
        let (tx, mut rx) = oneshot::channel();
        shared.pending().insert(9, tx);

        let response = Frame::Response {
            id: 9,
            body: Reply::ok(),
        }
        .encode()
        .unwrap();
        route_frame(&response, &shared, &pushes);
        assert_eq!(rx.try_recv().unwrap(), Reply::ok());

        let note = bt_core::HfNotification::RingIndication {
            addr: "00:11:22:33:44:55".parse().unwrap(),
            inband: false,
        };
        let push = Frame::Push {
            body: Push::Hf(note.clone()),
        }
        .encode()
        .unwrap();
        route_frame(&push, &shared, &pushes);
        assert_eq!(push_rx.try_recv().unwrap(), Push::Hf(note));
    }

    #[tokio::test]
    async fn test_missing_socket_is_service_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            socket_path: dir.path().join("absent.sock"),
            connect_retries: 1,
            retry_initial_delay: Duration::from_millis(1),
            ..Default::default()
        };

        let err = RpcClient::connect(&config).await.err().unwrap();
        assert!(matches!(err, ClientError::ServiceNotRunning { .. }));
    }
}

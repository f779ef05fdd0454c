//! The seam between profile proxies and an RPC backend.

use async_trait::async_trait;
use bt_protocol::{Push, Reply, Request};
use tokio::sync::broadcast;

use crate::error::Result;

/// Capacity of the push broadcast channel each transport owns.
pub const PUSH_CHANNEL_CAPACITY: usize = 256;

/// One connection to the profile service.
///
/// `call` carries one request and resolves with exactly its reply. Pushes
/// arrive independently of calls and fan out to every subscriber.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: Request) -> Result<Reply>;

    /// Subscribes to pushes received from now on.
    fn subscribe(&self) -> broadcast::Receiver<Push>;

    /// False once the transport can no longer carry calls.
    fn is_connected(&self) -> bool;
}

//! bt-client - Application library for the Bluetooth profile service
//!
//! This crate provides the application side of the profile host:
//! - `client` - socket RPC client with request correlation and push fan-out
//! - `binder` - binder transport over the service's profile objects
//! - `transport` - the seam both backends implement
//! - `bridge` - local listener fan-out over one remote registration
//! - `proxy` - `HfpAg` / `HfpHf` implementations over any transport
//!
//! # Example
//!
//! ```rust,no_run
//! use bt_client::{BtClient, ClientConfig};
//! use bt_core::HfpHf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BtClient::connect(&ClientConfig::default()).await?;
//! let addr = "00:11:22:33:44:55".parse()?;
//! client.hf().connect(addr).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A lost connection fails calls with an error instead of hanging them

pub mod binder;
pub mod bridge;
pub mod client;
pub mod error;
pub mod proxy;
pub mod transport;

use std::sync::Arc;

pub use binder::BinderTransport;
pub use bridge::{CallbackBridge, PushListener};
pub use client::{ClientConfig, RpcClient};
pub use error::{ClientError, Result};
pub use proxy::{AgProxy, HfProxy};
pub use transport::Transport;

/// Both profile proxies over one shared transport.
pub struct BtClient {
    transport: Arc<dyn Transport>,
    ag: AgProxy,
    hf: HfProxy,
}

impl BtClient {
    /// Connects to the service socket.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let client = RpcClient::connect(config).await?;
        Ok(Self::with_transport(Arc::new(client)))
    }

    /// Builds the proxies over an existing transport. Must be called inside
    /// a tokio runtime.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            ag: AgProxy::new(Arc::clone(&transport)),
            hf: HfProxy::new(Arc::clone(&transport)),
            transport,
        }
    }

    pub fn ag(&self) -> &AgProxy {
        &self.ag
    }

    pub fn hf(&self) -> &HfProxy {
        &self.hf
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}

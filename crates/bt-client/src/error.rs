//! Error types for the client library.
//!
//! [`ClientError`] describes what went wrong on the transport. At the
//! profile API boundary every one of them becomes `BtError::IpcError`.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::path::PathBuf;

use bt_core::BtError;
use bt_protocol::{FrameError, ParcelError, TransactError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The service socket does not exist.
    #[error("Service socket not found at {}; is btsd running?", path.display())]
    ServiceNotRunning { path: PathBuf },

    /// Every connection attempt failed.
    #[error("Failed to connect to service after {attempts} attempts: {reason}")]
    Connect { attempts: u32, reason: String },

    /// The service refused the handshake.
    #[error("Handshake rejected: {0}")]
    Rejected(String),

    /// The service speaks an incompatible protocol version.
    #[error("Protocol version mismatch (client: {client_version}, service: {service_version})")]
    VersionMismatch {
        client_version: String,
        service_version: String,
    },

    /// Unexpected frame or undecodable data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The connection went away while a call was outstanding.
    #[error("Connection to service closed")]
    ConnectionClosed,

    #[error("Binder transaction failed: {0}")]
    Transact(#[from] TransactError),
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

impl From<ParcelError> for ClientError {
    fn from(err: ParcelError) -> Self {
        ClientError::Transact(TransactError::Parcel(err))
    }
}

impl From<ClientError> for BtError {
    fn from(_: ClientError) -> Self {
        BtError::IpcError
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_client_error_is_ipc_error() {
        let errors = vec![
            ClientError::ConnectionClosed,
            ClientError::Rejected("bye".to_string()),
            ClientError::Protocol("garbage".to_string()),
            ClientError::Transact(TransactError::DeadObject),
        ];
        for err in errors {
            assert_eq!(BtError::from(err), BtError::IpcError);
        }
    }

    #[test]
    fn test_service_not_running_names_path() {
        let err = ClientError::ServiceNotRunning {
            path: PathBuf::from("/tmp/missing.sock"),
        };
        assert!(err.to_string().contains("/tmp/missing.sock"));
    }

    #[test]
    fn test_parcel_error_becomes_transact() {
        let err = ClientError::from(ParcelError::Exhausted { position: 2 });
        assert!(matches!(
            err,
            ClientError::Transact(TransactError::Parcel(ParcelError::Exhausted { position: 2 }))
        ));
    }
}

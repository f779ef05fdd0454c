//! bt-core - Shared types for the Bluetooth profile host
//!
//! This crate provides the value types, status taxonomy, listener
//! multiplexer and per-profile API traits shared between the service
//! (btsd) and the application library (bt-client).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod address;
pub mod ag;
pub mod callbacks;
pub mod error;
pub mod hf;
pub mod hfp;
pub mod message;
pub mod state;
pub mod text;

// Re-exports for convenience
pub use address::{AddressParseError, BtAddress};
pub use ag::{AgNotification, HfpAg, HfpAgCallbacks};
pub use callbacks::{CallbackList, Cookie, RemoteAnchor, RemoteIdentity, DEFAULT_MAX_REGISTRATIONS};
pub use error::{status_code, status_result, BtError, BtResult, STATUS_SUCCESS};
pub use hf::{HfNotification, HfpHf, HfpHfCallbacks};
pub use hfp::{
    AgCallState, CallAccept, CallAddressType, CallControl, CallDirection, CallHeld, CallIndicator,
    CallMultiparty, CallSetup, CurrentCall, DeviceStatus, HfCallState, NetworkState, PhoneState,
    RoamingState, VolumeType,
};
pub use message::{Message, ProfileEvent};
pub use state::{AudioState, ConnectionPolicy, ConnectionReason, ProfileConnectionState, ProfileId};
pub use text::bounded_copy;

//! bt-protocol - Wire contract between applications and the profile service
//!
//! This crate provides the request and push vocabularies of each profile,
//! the newline-delimited JSON framing used by the socket backend, and the
//! typed parcels used by the binder backend.

pub mod ag;
pub mod frame;
pub mod hf;
pub mod parcel;
pub mod reply;
pub mod version;

pub use ag::AgRequest;
pub use frame::{Frame, FrameError, Push, Request, MAX_FRAME_SIZE};
pub use hf::HfRequest;
pub use parcel::{Binder, Parcel, ParcelError, ParcelReader, ParcelValue, TransactError};
pub use reply::{Reply, ReplyKind};
pub use version::{ProtocolVersion, VersionError};

//! btsd - Bluetooth profile service
//!
//! This crate provides the service side of the profile host:
//! - `event_loop` - single-threaded task queue every profile runs on
//! - `hsm` - hierarchical state machine skeleton used by device sessions
//! - `session` - per-device sessions and the ordered session registry
//! - `profile` - generic runtime binding a profile to loop, registry and listeners
//! - `profiles` - the HFP audio gateway (AG) and hands-free unit (HF) runtimes
//! - `server` - Unix socket RPC backend
//! - `binder` - parcel/transaction RPC backend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        btsd daemon                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  ServiceServer  │────▶│       ProfileManager        │    │
//! │  │  BinderHost     │     │  AgService      HfService   │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │ post / call       │
//! │           │ pushes                      ▼                   │
//! │           │              ┌─────────────────────────────┐    │
//! │           └──────────────│         EventLoop           │    │
//! │                          │ sessions, timers, listeners │    │
//! │                          └──────────────┬──────────────┘    │
//! │                                         │                   │
//! │                          ┌──────────────▼──────────────┐    │
//! │                          │   AgStack / HfStack driver  │    │
//! │                          └─────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod binder;
pub mod config;
pub mod event_loop;
pub mod forward;
pub mod hsm;
pub mod manager;
pub mod profile;
pub mod profiles;
pub mod server;
pub mod session;

pub use binder::{AgBinderStub, BinderHost, BinderStub, HfBinderStub};
pub use config::{ActiveDeviceMode, ConfigError, ProfileConfig, ServiceConfig};
pub use event_loop::{EventLoop, LoopError, LoopHandle};
pub use manager::{ProfileManager, RemoteIds};
pub use profile::{ProfileRuntime, ProfileService};
pub use server::{ServerError, ServiceServer};

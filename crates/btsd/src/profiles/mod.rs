//! Concrete profile runtimes.

pub mod ag;
pub mod hf;
mod recording;

pub use recording::CallLog;

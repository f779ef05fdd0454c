//! Status taxonomy shared by every profile operation.
//!
//! Success is `Ok(..)`; every failure is a [`BtError`]. Each variant has a
//! stable negated integer code so it can cross the socket and binder
//! boundaries unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned across the profile API boundary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BtError {
    /// Generic state-incompatible rejection.
    #[error("operation failed")]
    Fail,

    /// The profile runtime has not been started.
    #[error("profile not enabled")]
    NotEnabled,

    /// Duplicate registration or a conflicting operation in progress.
    #[error("busy")]
    Busy,

    #[error("invalid parameter")]
    InvalidParameter,

    /// Unknown cookie, or no session for the address.
    #[error("not found")]
    NotFound,

    /// The underlying profile service is not running.
    #[error("profile service not found")]
    ServiceNotFound,

    /// Connection ceiling reached or listener table full.
    #[error("no resources")]
    NoResources,

    /// Marshalling or transport failure.
    #[error("ipc error")]
    IpcError,
}

/// Result type for profile operations.
pub type BtResult<T> = Result<T, BtError>;

/// Status code for success on the wire.
pub const STATUS_SUCCESS: i32 = 0;

impl BtError {
    /// Returns the negated status code for this error.
    pub const fn code(self) -> i32 {
        match self {
            BtError::Fail => -1,
            BtError::NotEnabled => -2,
            BtError::Busy => -4,
            BtError::InvalidParameter => -7,
            BtError::NotFound => -48,
            BtError::ServiceNotFound => -50,
            BtError::NoResources => -51,
            BtError::IpcError => -52,
        }
    }

    /// Decodes a non-zero status code. Unknown codes decode to `Fail`.
    pub fn from_code(code: i32) -> Self {
        match code {
            -2 => BtError::NotEnabled,
            -4 => BtError::Busy,
            -7 => BtError::InvalidParameter,
            -48 => BtError::NotFound,
            -50 => BtError::ServiceNotFound,
            -51 => BtError::NoResources,
            -52 => BtError::IpcError,
            _ => BtError::Fail,
        }
    }
}

/// Encodes a result as a wire status code.
pub fn status_code<T>(result: &BtResult<T>) -> i32 {
    match result {
        Ok(_) => STATUS_SUCCESS,
        Err(e) => e.code(),
    }
}

/// Decodes a wire status code.
pub fn status_result(code: i32) -> BtResult<()> {
    if code == STATUS_SUCCESS {
        Ok(())
    } else {
        Err(BtError::from_code(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [BtError; 8] = [
        BtError::Fail,
        BtError::NotEnabled,
        BtError::Busy,
        BtError::InvalidParameter,
        BtError::NotFound,
        BtError::ServiceNotFound,
        BtError::NoResources,
        BtError::IpcError,
    ];

    #[test]
    fn test_codes_are_negative_and_distinct() {
        let mut seen = std::collections::HashSet::new();
        for e in ALL {
            assert!(e.code() < 0, "{e:?} must map to a negative code");
            assert!(seen.insert(e.code()), "duplicate code for {e:?}");
            assert_eq!(BtError::from_code(e.code()), e);
        }
    }

    #[test]
    fn test_unknown_code_is_fail() {
        assert_eq!(BtError::from_code(-999), BtError::Fail);
        assert_eq!(BtError::from_code(12), BtError::Fail);
    }

    #[test]
    fn test_status_helpers() {
        assert_eq!(status_code(&Ok::<(), BtError>(())), 0);
        assert_eq!(status_code::<()>(&Err(BtError::Busy)), -4);
        assert_eq!(status_result(0), Ok(()));
        assert_eq!(status_result(-51), Err(BtError::NoResources));
    }
}

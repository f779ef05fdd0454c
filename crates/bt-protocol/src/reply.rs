//! Response bodies shared by both RPC backends.

use bt_core::{
    status_result, BtError, BtResult, CallDirection, CallMultiparty, CurrentCall, HfCallState,
    ProfileConnectionState, STATUS_SUCCESS,
};
use serde::{Deserialize, Serialize};

use crate::parcel::{Parcel, ParcelError, ParcelReader};

/// The typed result a request expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Status,
    Bool,
    ConnectionState,
    Calls,
}

/// Result of one request.
///
/// A failed request of any kind is carried as `Status` with a negative
/// code; the typed variants always mean success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Status { status: i32 },
    Bool { value: bool },
    ConnectionState { state: ProfileConnectionState },
    Calls { calls: Vec<CurrentCall> },
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status {
            status: STATUS_SUCCESS,
        }
    }

    pub fn error(err: BtError) -> Self {
        Reply::Status { status: err.code() }
    }

    pub fn from_status(result: BtResult<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::error(e),
        }
    }

    pub fn from_bool(result: BtResult<bool>) -> Self {
        match result {
            Ok(value) => Reply::Bool { value },
            Err(e) => Self::error(e),
        }
    }

    pub fn from_connection_state(result: BtResult<ProfileConnectionState>) -> Self {
        match result {
            Ok(state) => Reply::ConnectionState { state },
            Err(e) => Self::error(e),
        }
    }

    pub fn from_calls(result: BtResult<Vec<CurrentCall>>) -> Self {
        match result {
            Ok(calls) => Reply::Calls { calls },
            Err(e) => Self::error(e),
        }
    }

    /// The status code, `0` for every successful reply.
    pub fn status(&self) -> i32 {
        match self {
            Reply::Status { status } => *status,
            _ => STATUS_SUCCESS,
        }
    }

    pub fn into_status(self) -> BtResult<()> {
        match self {
            Reply::Status { status } => status_result(status),
            _ => Err(BtError::IpcError),
        }
    }

    pub fn into_bool(self) -> BtResult<bool> {
        match self {
            Reply::Bool { value } => Ok(value),
            other => Err(other.unexpected()),
        }
    }

    pub fn into_connection_state(self) -> BtResult<ProfileConnectionState> {
        match self {
            Reply::ConnectionState { state } => Ok(state),
            other => Err(other.unexpected()),
        }
    }

    pub fn into_calls(self) -> BtResult<Vec<CurrentCall>> {
        match self {
            Reply::Calls { calls } => Ok(calls),
            other => Err(other.unexpected()),
        }
    }

    /// Error for a reply of the wrong kind: its own failure code if it is a
    /// failed status, otherwise an IPC error.
    fn unexpected(&self) -> BtError {
        match self {
            Reply::Status { status } if *status != STATUS_SUCCESS => BtError::from_code(*status),
            _ => BtError::IpcError,
        }
    }

    /// Writes the i32 status followed by the typed result.
    pub fn write_parcel(&self, p: &mut Parcel) {
        p.write_i32(self.status());
        match self {
            Reply::Status { .. } => {}
            Reply::Bool { value } => {
                p.write_bool(*value);
            }
            Reply::ConnectionState { state } => {
                p.write_u8(state.as_u8());
            }
            Reply::Calls { calls } => {
                p.write_u32(u32::try_from(calls.len()).unwrap_or(u32::MAX));
                for call in calls {
                    write_call(p, call);
                }
            }
        }
    }

    /// Reads a reply of `kind`. A non-zero status ends the parcel.
    pub fn read_parcel(kind: ReplyKind, r: &mut ParcelReader<'_>) -> Result<Self, ParcelError> {
        let status = r.read_i32()?;
        if status != STATUS_SUCCESS {
            return Ok(Reply::Status { status });
        }

        Ok(match kind {
            ReplyKind::Status => Reply::Status { status },
            ReplyKind::Bool => Reply::Bool {
                value: r.read_bool()?,
            },
            ReplyKind::ConnectionState => Reply::ConnectionState {
                state: r.read_enum("connection_state", ProfileConnectionState::from_u8)?,
            },
            ReplyKind::Calls => {
                let count = r.read_u32()?;
                let mut calls = Vec::new();
                for _ in 0..count {
                    calls.push(read_call(r)?);
                }
                Reply::Calls { calls }
            }
        })
    }
}

pub(crate) fn write_call(p: &mut Parcel, call: &CurrentCall) {
    p.write_u32(call.index)
        .write_u8(call.direction.as_u8())
        .write_u8(call.state.as_u8())
        .write_u8(call.multiparty.as_u8())
        .write_str(&call.number)
        .write_str(&call.name);
}

pub(crate) fn read_call(r: &mut ParcelReader<'_>) -> Result<CurrentCall, ParcelError> {
    Ok(CurrentCall {
        index: r.read_u32()?,
        direction: r.read_enum("call_direction", CallDirection::from_u8)?,
        state: r.read_enum("call_state", HfCallState::from_u8)?,
        multiparty: r.read_enum("call_multiparty", CallMultiparty::from_u8)?,
        number: r.read_string()?,
        name: r.read_string()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_typed_reply_carries_status() {
        let reply = Reply::from_bool(Err(BtError::NotEnabled));
        assert_eq!(reply, Reply::Status { status: -2 });
        assert_eq!(reply.into_bool(), Err(BtError::NotEnabled));
    }

    #[test]
    fn test_wrong_kind_is_ipc_error() {
        assert_eq!(Reply::ok().into_bool(), Err(BtError::IpcError));
        assert_eq!(Reply::Bool { value: true }.into_status(), Err(BtError::IpcError));
    }

    #[test]
    fn test_empty_call_list_parcel() {
        let mut p = Parcel::new();
        Reply::from_calls(Ok(Vec::new())).write_parcel(&mut p);
        let reply = Reply::read_parcel(ReplyKind::Calls, &mut p.reader()).unwrap();
        assert_eq!(reply.into_calls().unwrap(), Vec::new());
    }

    #[test]
    fn test_error_parcel_has_only_status() {
        let mut p = Parcel::new();
        Reply::error(BtError::NoResources).write_parcel(&mut p);
        assert_eq!(p.len(), 1);
        let reply = Reply::read_parcel(ReplyKind::ConnectionState, &mut p.reader()).unwrap();
        assert_eq!(reply.into_connection_state(), Err(BtError::NoResources));
    }
}

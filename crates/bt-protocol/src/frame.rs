//! Socket framing: newline-delimited JSON frames.
//!
//! Every frame carries an explicit discriminator so a client can tell its
//! call's `Response` (matched by `id`) apart from an unsolicited `Push`.

use bt_core::{AgNotification, HfNotification, ProfileId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ag::{self, AgRequest};
use crate::hf::{self, HfRequest};
use crate::reply::{Reply, ReplyKind};
use crate::version::ProtocolVersion;

/// Largest accepted frame, newline included (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// A request addressed to one profile service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    Ag(AgRequest),
    Hf(HfRequest),
}

impl Request {
    pub fn profile(&self) -> ProfileId {
        match self {
            Request::Ag(_) => ProfileId::HfpAg,
            Request::Hf(_) => ProfileId::HfpHf,
        }
    }

    pub fn opcode(&self) -> u32 {
        match self {
            Request::Ag(r) => r.opcode(),
            Request::Hf(r) => r.opcode(),
        }
    }

    pub fn reply_kind(&self) -> ReplyKind {
        match self {
            Request::Ag(r) => r.reply_kind(),
            Request::Hf(r) => r.reply_kind(),
        }
    }

    pub fn is_register(&self) -> bool {
        matches!(
            self,
            Request::Ag(AgRequest::RegisterCallback) | Request::Hf(HfRequest::RegisterCallback)
        )
    }

    pub fn is_unregister(&self) -> bool {
        matches!(
            self,
            Request::Ag(AgRequest::UnregisterCallback) | Request::Hf(HfRequest::UnregisterCallback)
        )
    }
}

/// A notification pushed from the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Push {
    Ag(AgNotification),
    Hf(HfNotification),
}

impl Push {
    pub fn profile(&self) -> ProfileId {
        match self {
            Push::Ag(_) => ProfileId::HfpAg,
            Push::Hf(_) => ProfileId::HfpHf,
        }
    }

    /// The callback transaction code for this notification.
    pub fn code(&self) -> u32 {
        match self {
            Push::Ag(n) => ag::push_code(n),
            Push::Hf(n) => hf::push_code(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First frame sent by a client.
    Hello {
        protocol_version: ProtocolVersion,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_name: Option<String>,
    },

    /// Handshake accepted.
    Welcome {
        protocol_version: ProtocolVersion,
        connection_id: u64,
    },

    /// Handshake refused; the connection is closed after this frame.
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    Request { id: u64, body: Request },

    Response { id: u64, body: Reply },

    Push { body: Push },
}

impl Frame {
    pub fn hello(client_name: Option<String>) -> Self {
        Frame::Hello {
            protocol_version: ProtocolVersion::CURRENT,
            client_name,
        }
    }

    pub fn welcome(connection_id: u64) -> Self {
        Frame::Welcome {
            protocol_version: ProtocolVersion::CURRENT,
            connection_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Frame::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Welcome { .. } => "welcome",
            Frame::Rejected { .. } => "rejected",
            Frame::Request { .. } => "request",
            Frame::Response { .. } => "response",
            Frame::Push { .. } => "push",
        }
    }

    /// Serializes the frame as one line, trailing newline included.
    pub fn encode(&self) -> Result<String, FrameError> {
        let mut line =
            serde_json::to_string(self).map_err(|e| FrameError::Serialize(e.to_string()))?;
        line.push('\n');
        if line.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size: line.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(line)
    }

    /// Parses one line; surrounding whitespace is ignored.
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        if line.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size: line.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        serde_json::from_str(line.trim()).map_err(|e| FrameError::Parse(e.to_string()))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame serialization failed: {0}")]
    Serialize(String),

    #[error("Frame parse error: {0}")]
    Parse(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_core::{AudioState, BtAddress};

    fn addr() -> BtAddress {
        "00:11:22:33:44:55".parse().unwrap()
    }

    #[test]
    fn test_request_frame_shape() {
        let frame = Frame::Request {
            id: 7,
            body: Request::Ag(AgRequest::Connect { addr: addr() }),
        };
        let line = frame.encode().unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"type\":\"request\""));
        assert!(line.contains("\"op\":\"connect\""));
        assert!(line.contains("\"00:11:22:33:44:55\""));
        assert_eq!(Frame::decode(&line).unwrap(), frame);
    }

    #[test]
    fn test_push_and_response_are_distinguishable() {
        let push = Frame::Push {
            body: Push::Ag(AgNotification::AudioState {
                addr: addr(),
                state: AudioState::Connected,
            }),
        };
        let response = Frame::Response {
            id: 3,
            body: Reply::ok(),
        };
        assert_eq!(Frame::decode(&push.encode().unwrap()).unwrap().kind(), "push");
        assert_eq!(
            Frame::decode(&response.encode().unwrap()).unwrap().kind(),
            "response"
        );
    }

    #[test]
    fn test_hello_without_name() {
        let frame = Frame::decode(r#"{"type":"hello","protocol_version":{"major":1,"minor":4}}"#)
            .unwrap();
        assert_eq!(
            frame,
            Frame::Hello {
                protocol_version: ProtocolVersion::new(1, 4),
                client_name: None,
            }
        );
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let frame = Frame::Request {
            id: 1,
            body: Request::Ag(AgRequest::SendAtCommand {
                addr: addr(),
                command: "A".repeat(MAX_FRAME_SIZE),
            }),
        };
        assert!(matches!(frame.encode(), Err(FrameError::TooLarge { .. })));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(Frame::decode("not json"), Err(FrameError::Parse(_))));
    }

    #[test]
    fn test_request_profile_routing() {
        assert_eq!(Request::Hf(HfRequest::RegisterCallback).profile(), ProfileId::HfpHf);
        assert!(Request::Hf(HfRequest::RegisterCallback).is_register());
        assert!(Request::Ag(AgRequest::UnregisterCallback).is_unregister());
    }
}

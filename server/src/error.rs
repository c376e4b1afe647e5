//! Hub error types.
//!
//! Errors fall into three classes that decide how far they reach:
//!
//! 1. **Local**: returned to the caller of a front-end operation; the hub keeps running.
//! 2. **Connection-fatal**: end exactly one connection through its close path.
//! 3. **Programming**: should not happen for well-formed input; fatal to the call, never retried.

use shared::{CodecError, ServerId};
use std::time::Duration;
use thiserror::Error;

/// Coarse grouping that tells callers how far an error reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Local,
    ConnectionFatal,
    Programming,
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("server {0} is not connected")]
    ServerNotConnected(ServerId),

    #[error("server id {0} is already registered by an active connection")]
    DuplicateServerId(ServerId),

    #[error("outbound queue for server {0} is full")]
    OutboundQueueFull(ServerId),

    #[error("server {0} not found")]
    NotFound(ServerId),

    #[error("no registration received within {0:?}")]
    RegistrationTimeout(Duration),

    #[error("unexpected {0} frame")]
    UnexpectedPacket(&'static str),

    #[error("hub is shutting down")]
    ShuttingDown,

    #[error("failed to encode frame: {0}")]
    EncodingFailure(#[source] CodecError),

    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HubError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HubError::ServerNotConnected(_)
            | HubError::DuplicateServerId(_)
            | HubError::OutboundQueueFull(_)
            | HubError::NotFound(_) => ErrorClass::Local,
            HubError::RegistrationTimeout(_)
            | HubError::UnexpectedPacket(_)
            | HubError::ShuttingDown
            | HubError::Codec(_)
            | HubError::Io(_) => ErrorClass::ConnectionFatal,
            HubError::EncodingFailure(_) => ErrorClass::Programming,
        }
    }

    /// True when the error came from a peer sending bytes that do not parse.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, HubError::Codec(e) if e.is_malformed())
    }
}

//! Error types for ESL transport and call-control operations

use thiserror::Error;

/// Result alias used by the transport layer.
pub type EslResult<T> = Result<T, EslError>;

/// Transport and protocol failures on an ESL connection.
///
/// Errors raised while dialing or authenticating form the connect class,
/// errors while waiting for a command reply the send class, and errors
/// surfaced by [`EslEventStream::read_event`](crate::EslEventStream::read_event)
/// the read class. After any of them the connection must be considered dead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EslError {
    /// Socket-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dial or command reply did not complete in time.
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Peer closed the socket or the reader task went away.
    #[error("connection closed")]
    ConnectionClosed,

    /// Command attempted on a connection that already disconnected.
    #[error("not connected")]
    NotConnected,

    /// FreeSWITCH rejected the credential.
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// Framing violation or unexpected message.
    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    /// Header line that could not be parsed.
    #[error("invalid header: {header}")]
    InvalidHeader { header: String },

    /// Events were dropped because the consumer fell behind.
    #[error("event queue full, events dropped")]
    QueueFull,

    /// Reader task observed the end of the session.
    #[error("disconnected: {0}")]
    Disconnected(crate::connection::DisconnectReason),

    /// JSON event body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EslError {
    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        EslError::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn auth_failed(reason: impl Into<String>) -> Self {
        EslError::AuthFailed {
            reason: reason.into(),
        }
    }
}

/// Stage at which a call-control operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Could not dial or authenticate.
    Connect,
    /// Transport failed while sending the command or awaiting its reply.
    Send,
    /// Origination reply carried no call identifier.
    NoCallId,
    /// Status query found no such call.
    NotFound,
}

/// Failure of [`CommandClient::originate`](crate::CommandClient::originate).
#[derive(Debug, Error)]
pub enum OriginateError {
    #[error("failed to connect to FreeSWITCH: {0}")]
    Connect(#[source] EslError),

    #[error("failed to originate call: {0}")]
    Send(#[source] EslError),

    #[error("no call ID returned from FreeSWITCH (response: {body:?})")]
    NoCallId { body: String },
}

impl OriginateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            OriginateError::Connect(_) => FailureKind::Connect,
            OriginateError::Send(_) => FailureKind::Send,
            OriginateError::NoCallId { .. } => FailureKind::NoCallId,
        }
    }
}

/// Failure of [`CommandClient::call_status`](crate::CommandClient::call_status).
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to connect to FreeSWITCH: {0}")]
    Connect(#[source] EslError),

    #[error("failed to send ESL command: {0}")]
    Send(#[source] EslError),

    #[error("no call found with uuid: {uuid}")]
    NotFound { uuid: String },
}

impl StatusError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StatusError::Connect(_) => FailureKind::Connect,
            StatusError::Send(_) => FailureKind::Send,
            StatusError::NotFound { .. } => FailureKind::NotFound,
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

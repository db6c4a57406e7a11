//! Client error types

use netconf_proto::{Element, ProtocolError, RpcErrorInfo};
use netconf_transport::TransportError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Session-related errors
#[derive(Error, Debug)]
pub enum NetconfError {
    /// Transport could not be opened
    #[error("Connection failed: {0}")]
    Transport(#[from] TransportError),

    /// No server hello within the deadline
    #[error("No server hello within {0:?}")]
    HelloTimeout(Duration),

    /// Client and server share no base capability
    #[error("No common base capability (server offered {0:?})")]
    IncompatibleCapabilities(Vec<String>),

    /// No reply within the per-call deadline
    #[error("RPC {message_id} timed out after {timeout:?}")]
    RpcTimeout { message_id: u64, timeout: Duration },

    /// Server reported an `<rpc-error>`
    #[error("{0}")]
    Rpc(RpcErrorReply),

    /// Wire or XML protocol violation
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session closed by the caller
    #[error("Session closed")]
    SessionClosed,

    /// Session lost to an unrecoverable error
    #[error("Session failed: {0}")]
    SessionFailed(String),

    /// Operation attempted outside `Established`
    #[error("Operation requires an established session (state: {0})")]
    InvalidState(String),

    /// Schema unknown to the server
    #[error("Schema not found: {0}")]
    NotFound(String),

    /// No notification within the deadline
    #[error("No notification within {0:?}")]
    Timeout(Duration),

    /// Notification stream ended
    #[error("Notification channel closed")]
    ChannelClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure category, for callers that branch on what went wrong rather than on details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectError,
    ConnectTimeout,
    AuthError,
    HostKeyRejected,
    HelloTimeout,
    IncompatibleCapabilities,
    RpcTimeout,
    RpcError,
    MalformedFrame,
    TransportClosed,
    SessionFailed,
    SessionClosed,
    InvalidState,
    DuplicateQueryKey,
    ParseError,
    NotFound,
    Timeout,
    ChannelClosed,
    Config,
    Io,
}

impl NetconfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetconfError::Transport(e) => match e {
                TransportError::Connect { .. } | TransportError::Ssh(_) => ErrorKind::ConnectError,
                TransportError::ConnectTimeout { .. } => ErrorKind::ConnectTimeout,
                TransportError::Auth { .. } => ErrorKind::AuthError,
                TransportError::HostKeyRejected { .. } => ErrorKind::HostKeyRejected,
                TransportError::Config(_) => ErrorKind::Config,
                TransportError::Closed => ErrorKind::TransportClosed,
                TransportError::Io(_) => ErrorKind::Io,
            },
            NetconfError::HelloTimeout(_) => ErrorKind::HelloTimeout,
            NetconfError::IncompatibleCapabilities(_) => ErrorKind::IncompatibleCapabilities,
            NetconfError::RpcTimeout { .. } => ErrorKind::RpcTimeout,
            NetconfError::Rpc(_) => ErrorKind::RpcError,
            NetconfError::Protocol(e) => match e {
                ProtocolError::MalformedFrame(_) | ProtocolError::MessageTooLarge { .. } => {
                    ErrorKind::MalformedFrame
                }
                ProtocolError::DuplicateQueryKey { .. } => ErrorKind::DuplicateQueryKey,
                ProtocolError::Io(_) => ErrorKind::Io,
                ProtocolError::Xml(_) | ProtocolError::InvalidFormat(_) | ProtocolError::Parse(_) => {
                    ErrorKind::ParseError
                }
            },
            NetconfError::SessionClosed => ErrorKind::SessionClosed,
            NetconfError::SessionFailed(_) => ErrorKind::SessionFailed,
            NetconfError::InvalidState(_) => ErrorKind::InvalidState,
            NetconfError::NotFound(_) => ErrorKind::NotFound,
            NetconfError::Timeout(_) => ErrorKind::Timeout,
            NetconfError::ChannelClosed => ErrorKind::ChannelClosed,
            NetconfError::Config(_) => ErrorKind::Config,
            NetconfError::Io(_) => ErrorKind::Io,
        }
    }
}

/// An `<rpc-reply>` that carried at least one `<rpc-error>` of severity `error`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcErrorReply {
    /// The reply exactly as received
    pub reply: Element,
}

impl RpcErrorReply {
    pub fn new(reply: Element) -> Self {
        Self { reply }
    }

    pub fn errors(&self) -> Vec<RpcErrorInfo> {
        self.reply
            .children_named("rpc-error")
            .map(RpcErrorInfo::from_element)
            .collect()
    }

    /// True when any entry carries the given `<error-tag>`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.errors()
            .iter()
            .any(|e| e.error_tag.as_deref() == Some(tag))
    }
}

impl fmt::Display for RpcErrorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Server returned rpc-error")?;
        for error in self.errors() {
            write!(
                f,
                " [{}/{}]",
                error.error_tag.as_deref().unwrap_or("unknown"),
                error.error_severity.as_deref().unwrap_or("error")
            )?;
            if let Some(message) = &error.error_message {
                write!(f, " {}", message)?;
            }
        }
        Ok(())
    }
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, NetconfError>;

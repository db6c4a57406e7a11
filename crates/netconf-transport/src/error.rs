//! Transport error types

use std::time::Duration;
use thiserror::Error;

/// Transport-related errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket or name resolution failure
    #[error("Connection to {peer} failed: {reason}")]
    Connect { peer: String, reason: String },

    /// No connection within the configured timeout
    #[error("Connection to {peer} timed out after {timeout:?}")]
    ConnectTimeout { peer: String, timeout: Duration },

    /// Credentials rejected by the server
    #[error("Authentication failed for user '{username}': {reason}")]
    Auth { username: String, reason: String },

    /// Server host key not trusted
    #[error("Host key for {peer} rejected")]
    HostKeyRejected { peer: String },

    /// SSH channel or subsystem failure after connecting
    #[error("SSH error: {0}")]
    Ssh(String),

    /// Invalid transport parameters (e.g. unreadable key file)
    #[error("Transport configuration error: {0}")]
    Config(String),

    /// Peer closed the stream
    #[error("Transport closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

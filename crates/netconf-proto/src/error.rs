//! Protocol error types

use thiserror::Error;

/// Protocol-related errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Framing violation (bad chunk header, truncated frame, stream desync)
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Message too large
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// XML could not be parsed
    #[error("XML error: {0}")]
    Xml(String),

    /// Invalid message format (well-formed XML, wrong shape)
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    /// Capability URI query repeats a key
    #[error("Duplicate query key '{key}' in capability {uri}")]
    DuplicateQueryKey { uri: String, key: String },

    /// Capability URI or filter expression could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for ProtocolError {
    fn from(err: quick_xml::Error) -> Self {
        ProtocolError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ProtocolError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ProtocolError::Xml(err.to_string())
    }
}

impl From<std::str::Utf8Error> for ProtocolError {
    fn from(err: std::str::Utf8Error) -> Self {
        ProtocolError::Xml(format!("invalid UTF-8: {}", err))
    }
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

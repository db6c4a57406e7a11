//! NETCONF Transport - byte-stream channels to network devices
//!
//! This crate opens the single authenticated stream a NETCONF session runs
//! over: SSH with the `netconf` subsystem, plain TCP for lab setups, or an
//! in-memory pipe for tests.

pub mod error;
pub mod ssh;
pub mod tcp;
pub mod transport;

pub use error::{Result, TransportError};
pub use ssh::SshTransport;
pub use tcp::TcpTransport;
pub use transport::{
    BoxedReader, BoxedWriter, Channel, ChannelCloser, ChannelHandle, Credentials, MockTransport,
    Target, Transport, DEFAULT_PORT,
};

/// Transport selection for configuration files and command lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// SSH with the `netconf` subsystem
    #[default]
    Ssh,
    /// Plain TCP
    Tcp,
}

impl std::str::FromStr for TransportKind {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ssh" => Ok(TransportKind::Ssh),
            "tcp" => Ok(TransportKind::Tcp),
            other => Err(TransportError::Config(format!(
                "unknown transport {:?} (expected ssh or tcp)",
                other
            ))),
        }
    }
}

impl TransportKind {
    /// Construct the transport
    pub fn build(&self) -> Box<dyn Transport> {
        match self {
            TransportKind::Ssh => Box::new(SshTransport::new()),
            TransportKind::Tcp => Box::new(TcpTransport::new()),
        }
    }
}

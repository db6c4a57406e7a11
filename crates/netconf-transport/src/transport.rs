//! Transport abstraction
//!
//! A [`Transport`] opens one authenticated byte stream to a device and hands
//! it out as a [`Channel`]. Framing lives a layer above; a channel only moves
//! bytes.

use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;
use tracing::debug;

/// Read side of a channel
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write side of a channel
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Default NETCONF-over-SSH port
pub const DEFAULT_PORT: u16 = 830;

const READ_BUF_SIZE: usize = 8 * 1024;

/// Login credentials
#[derive(Clone)]
pub enum Credentials {
    /// No authentication (plain TCP, mock channels)
    None,

    /// Password authentication
    Password { username: String, password: String },

    /// Public key authentication from a private key file
    KeyFile {
        username: String,
        path: std::path::PathBuf,
        passphrase: Option<String>,
    },
}

impl Credentials {
    pub fn username(&self) -> Option<&str> {
        match self {
            Credentials::None => None,
            Credentials::Password { username, .. } | Credentials::KeyFile { username, .. } => {
                Some(username)
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::KeyFile { username, path, .. } => f
                .debug_struct("KeyFile")
                .field("username", username)
                .field("path", path)
                .finish(),
        }
    }
}

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,

    /// Require the server host key to be in `known_hosts`
    pub verify_host_key: bool,

    /// Bound on socket connect plus authentication
    pub timeout: Duration,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: Credentials::None,
            verify_host_key: false,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_host_key_verification(mut self, verify: bool) -> Self {
        self.verify_host_key = verify;
        self
    }

    /// `host:port`
    pub fn peer(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Transport trait
///
/// Implementations provide byte streams over different media (SSH, TCP, in-memory)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a channel to the target
    async fn open(&self, target: &Target) -> Result<Channel>;

    /// Get the transport name
    fn name(&self) -> &str;
}

/// Releases resources tied to a channel beyond its byte stream
#[async_trait]
pub trait ChannelCloser: Send + Sync {
    async fn close(&mut self) -> Result<()>;
}

/// One open byte stream to a device
pub struct Channel {
    name: String,
    peer: String,
    reader: BoxedReader,
    writer: BoxedWriter,
    closer: Option<Box<dyn ChannelCloser>>,
}

impl Channel {
    pub fn new(
        name: impl Into<String>,
        peer: impl Into<String>,
        reader: BoxedReader,
        writer: BoxedWriter,
    ) -> Self {
        Self {
            name: name.into(),
            peer: peer.into(),
            reader,
            writer,
            closer: None,
        }
    }

    /// Wrap a bidirectional stream
    pub fn from_stream<S>(name: impl Into<String>, peer: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(name, peer, Box::new(reader), Box::new(writer))
    }

    /// Attach a closer run by [`Channel::close`] / [`ChannelHandle::close`]
    pub fn with_closer(mut self, closer: Box<dyn ChannelCloser>) -> Self {
        self.closer = Some(closer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write all bytes and flush
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read whatever is available; fails with [`TransportError::Closed`] at end of stream
    pub async fn read(&mut self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);
        let n = self.reader.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        Ok(buf.freeze())
    }

    /// Shut down the stream and release the connection
    pub async fn close(self) -> Result<()> {
        let (_reader, mut writer, mut handle) = self.into_parts();
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "Writer shutdown failed");
        }
        handle.close().await
    }

    /// Split into independently owned halves plus a close handle
    pub fn into_parts(self) -> (BoxedReader, BoxedWriter, ChannelHandle) {
        let handle = ChannelHandle {
            name: self.name,
            peer: self.peer,
            closer: self.closer,
        };
        (self.reader, self.writer, handle)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("peer", &self.peer)
            .finish()
    }
}

/// What remains of a channel after its halves are handed out
pub struct ChannelHandle {
    name: String,
    peer: String,
    closer: Option<Box<dyn ChannelCloser>>,
}

impl ChannelHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Release the connection; later calls are no-ops
    pub async fn close(&mut self) -> Result<()> {
        match self.closer.take() {
            Some(mut closer) => closer.close().await,
            None => Ok(()),
        }
    }
}

// Mock transport for local testing
/// In-memory transport backed by a duplex pipe.
/// The far end is handed to the test, which plays the device.
pub struct MockTransport {
    outcome: Mutex<Option<Result<Channel>>>,
}

impl MockTransport {
    /// Create a transport whose first `open` yields a channel wired to the returned stream
    pub fn create_pair() -> (Self, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let channel = Channel::from_stream("mock", "mock-device", client);
        let transport = Self {
            outcome: Mutex::new(Some(Ok(channel))),
        };
        (transport, server)
    }

    /// Create a transport whose `open` fails with the given error
    pub fn failing(error: TransportError) -> Self {
        Self {
            outcome: Mutex::new(Some(Err(error))),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, target: &Target) -> Result<Channel> {
        debug!(peer = %target.peer(), "Opening mock channel");
        self.outcome
            .lock()
            .await
            .take()
            .unwrap_or_else(|| {
                Err(TransportError::Connect {
                    peer: target.peer(),
                    reason: "mock channel already used".to_string(),
                })
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

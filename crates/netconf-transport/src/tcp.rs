//! Plain TCP transport
//!
//! Unencrypted and unauthenticated. Meant for lab devices and simulators
//! that expose NETCONF directly on a TCP port.

use crate::{Channel, Result, Target, Transport, TransportError};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// TCP transport
#[derive(Debug, Default, Clone)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, target: &Target) -> Result<Channel> {
        let peer = target.peer();
        info!(peer = %peer, "Connecting over TCP");

        if !matches!(target.credentials, crate::Credentials::None) {
            warn!(peer = %peer, "Credentials are ignored by the TCP transport");
        }

        let stream = tokio::time::timeout(
            target.timeout,
            TcpStream::connect((target.host.as_str(), target.port)),
        )
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            peer: peer.clone(),
            timeout: target.timeout,
        })?
        .map_err(|e| TransportError::Connect {
            peer: peer.clone(),
            reason: e.to_string(),
        })?;

        stream.set_nodelay(true)?;
        Ok(Channel::from_stream("tcp", peer, stream))
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

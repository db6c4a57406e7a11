//! SSH transport (RFC 6242)
//!
//! Opens an SSH session, authenticates, and starts the `netconf` subsystem on
//! a session channel. The channel stream becomes the NETCONF byte stream.

use crate::{Channel, ChannelCloser, Credentials, Result, Target, Transport, TransportError};
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// SSH subsystem name for NETCONF
pub const NETCONF_SUBSYSTEM: &str = "netconf";

/// SSH transport
pub struct SshTransport {
    config: Arc<client::Config>,
}

impl SshTransport {
    pub fn new() -> Self {
        Self {
            config: Arc::new(client::Config::default()),
        }
    }

    /// Use a custom russh client configuration
    pub fn with_config(config: client::Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn connect(&self, target: &Target) -> Result<Channel> {
        let peer = target.peer();
        let rejected = Arc::new(AtomicBool::new(false));
        let verifier = HostKeyVerifier {
            host: target.host.clone(),
            port: target.port,
            verify: target.verify_host_key,
            rejected: Arc::clone(&rejected),
        };

        let mut handle = client::connect(
            Arc::clone(&self.config),
            (target.host.as_str(), target.port),
            verifier,
        )
        .await
        .map_err(|e| {
            if rejected.load(Ordering::SeqCst) {
                TransportError::HostKeyRejected { peer: peer.clone() }
            } else {
                TransportError::Connect {
                    peer: peer.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        debug!(peer = %peer, "SSH handshake complete, authenticating");
        authenticate(&mut handle, &target.credentials).await?;

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::Ssh(format!("failed to open session channel: {}", e)))?;
        channel
            .request_subsystem(true, NETCONF_SUBSYSTEM)
            .await
            .map_err(|e| TransportError::Ssh(format!("netconf subsystem refused: {}", e)))?;

        info!(peer = %peer, "NETCONF subsystem started");

        Ok(Channel::from_stream("ssh", peer, channel.into_stream())
            .with_closer(Box::new(SshCloser {
                handle: Some(handle),
            })))
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open(&self, target: &Target) -> Result<Channel> {
        info!(peer = %target.peer(), "Connecting over SSH");

        match tokio::time::timeout(target.timeout, self.connect(target)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectTimeout {
                peer: target.peer(),
                timeout: target.timeout,
            }),
        }
    }

    fn name(&self) -> &str {
        "ssh"
    }
}

async fn authenticate(handle: &mut Handle<HostKeyVerifier>, credentials: &Credentials) -> Result<()> {
    let (username, accepted) = match credentials {
        Credentials::None => {
            return Err(TransportError::Config(
                "SSH transport requires credentials".to_string(),
            ));
        }
        Credentials::Password { username, password } => {
            let accepted = handle
                .authenticate_password(username.as_str(), password.as_str())
                .await
                .map_err(|e| auth_error(username, e))?;
            (username, accepted)
        }
        Credentials::KeyFile {
            username,
            path,
            passphrase,
        } => {
            let key = russh_keys::load_secret_key(path, passphrase.as_deref()).map_err(|e| {
                TransportError::Config(format!("cannot load key {}: {}", path.display(), e))
            })?;
            let accepted = handle
                .authenticate_publickey(username.as_str(), Arc::new(key))
                .await
                .map_err(|e| auth_error(username, e))?;
            (username, accepted)
        }
    };

    if !accepted {
        return Err(TransportError::Auth {
            username: username.clone(),
            reason: "credentials rejected".to_string(),
        });
    }
    Ok(())
}

fn auth_error(username: &str, err: russh::Error) -> TransportError {
    TransportError::Auth {
        username: username.to_string(),
        reason: err.to_string(),
    }
}

/// Accepts any host key unless verification is enabled, in which case the
/// key must be listed in the user's `known_hosts`.
struct HostKeyVerifier {
    host: String,
    port: u16,
    verify: bool,
    rejected: Arc<AtomicBool>,
}

#[async_trait]
impl client::Handler for HostKeyVerifier {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if !self.verify {
            return Ok(true);
        }

        let known = match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(known) => known,
            Err(e) => {
                warn!(host = %self.host, error = %e, "Host key check failed");
                false
            }
        };
        if !known {
            warn!(host = %self.host, port = self.port, "Host key not in known_hosts");
            self.rejected.store(true, Ordering::SeqCst);
        }
        Ok(known)
    }
}

struct SshCloser {
    handle: Option<Handle<HostKeyVerifier>>,
}

#[async_trait]
impl ChannelCloser for SshCloser {
    async fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| TransportError::Ssh(e.to_string()))?;
        }
        Ok(())
    }
}

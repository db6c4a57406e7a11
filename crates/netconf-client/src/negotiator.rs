//! Capability negotiation
//!
//! Both sides send `<hello>` in end-of-message framing. Once the server hello
//! is read the framing for the rest of the session is chosen: chunked when
//! both sides offer base:1.1, end-of-message when only base:1.0 is shared.

use crate::{DeviceProfile, NetconfError, Result};
use futures::{SinkExt, StreamExt};
use netconf_proto::capability::{BASE_1_0, BASE_1_1};
use netconf_proto::{Capability, Framing, Hello, Message, NetconfCodec, ProtocolError, SessionId};
use netconf_transport::TransportError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout_at, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

/// Outcome of a successful hello exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub session_id: SessionId,

    /// Server capabilities as advertised
    pub capabilities: Vec<String>,

    pub framing: Framing,
}

/// Exchange hellos and switch both codecs to the selected framing
pub async fn negotiate<R, W>(
    reader: &mut FramedRead<R, NetconfCodec>,
    writer: &mut FramedWrite<W, NetconfCodec>,
    profile: DeviceProfile,
    hello_timeout: Duration,
) -> Result<Negotiated>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let client_capabilities = profile.client_capabilities();
    let hello = Hello {
        capabilities: client_capabilities.clone(),
        session_id: None,
    };
    debug!(profile = %profile, capabilities = client_capabilities.len(), "Sending client hello");
    let deadline = Instant::now() + hello_timeout;
    match timeout_at(deadline, writer.send(hello.to_element())).await {
        Err(_) => return Err(NetconfError::HelloTimeout(hello_timeout)),
        Ok(sent) => sent?,
    }

    let server_hello = match timeout_at(deadline, reader.next()).await {
        Err(_) => return Err(NetconfError::HelloTimeout(hello_timeout)),
        Ok(None) => return Err(TransportError::Closed.into()),
        Ok(Some(frame)) => match Message::parse(&frame?)? {
            Message::Hello(hello) => hello,
            other => {
                return Err(ProtocolError::InvalidFormat(format!(
                    "expected <hello>, received <{}>",
                    other.message_type()
                ))
                .into())
            }
        },
    };

    let session_id = server_hello.session_id.ok_or_else(|| {
        ProtocolError::InvalidFormat("server hello without <session-id>".to_string())
    })?;
    let framing = select_framing(&client_capabilities, &server_hello.capabilities, profile)?;

    reader.decoder_mut().set_framing(framing);
    writer.encoder_mut().set_framing(framing);

    info!(
        session_id,
        framing = ?framing,
        capabilities = server_hello.capabilities.len(),
        "Hello exchange complete"
    );

    Ok(Negotiated {
        session_id,
        capabilities: server_hello.capabilities,
        framing,
    })
}

/// Pick the highest base version both sides offer
pub fn select_framing(
    client: &[String],
    server: &[String],
    profile: DeviceProfile,
) -> Result<Framing> {
    let both = |base: &str| offers(client, base) && offers(server, base);

    if both(BASE_1_1) && !profile.params().force_base_1_0 {
        Ok(Framing::Chunked)
    } else if both(BASE_1_0) {
        Ok(Framing::EndOfMessage)
    } else {
        Err(NetconfError::IncompatibleCapabilities(server.to_vec()))
    }
}

fn offers(capabilities: &[String], base: &str) -> bool {
    capabilities
        .iter()
        .any(|c| Capability::parse(c).is_ok_and(|c| c.base_uri() == base))
}

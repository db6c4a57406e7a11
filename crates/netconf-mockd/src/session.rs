//! One simulated device session

use crate::datastore::{select, DeviceData};
use crate::{Result, ServerError};
use chrono::{DateTime, FixedOffset, Utc};
use futures::{SinkExt, StreamExt};
use netconf_proto::capability::{BASE_1_0, BASE_1_1};
use netconf_proto::messages::MONITORING_NAMESPACE;
use netconf_proto::operations::{notification, reply_data, reply_error, reply_ok};
use netconf_proto::{Element, Framing, Hello, Message, NetconfCodec, Rpc, RpcErrorInfo, SessionId};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Server side of one NETCONF session
pub struct DeviceSession<S> {
    id: SessionId,
    framed: Framed<S, NetconfCodec>,
    data: Arc<DeviceData>,
    capabilities: Arc<Vec<String>>,
    events: broadcast::Receiver<Element>,
    events_open: bool,
    subscribed: bool,
}

impl<S> DeviceSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        id: SessionId,
        stream: S,
        data: Arc<DeviceData>,
        capabilities: Arc<Vec<String>>,
        events: broadcast::Receiver<Element>,
    ) -> Self {
        Self {
            id,
            framed: Framed::new(stream, NetconfCodec::new()),
            data,
            capabilities,
            events,
            events_open: true,
            subscribed: false,
        }
    }

    /// Serve until the client closes the session or disconnects
    pub async fn run(mut self) -> Result<()> {
        self.exchange_hello().await?;

        loop {
            tokio::select! {
                frame = self.framed.next() => match frame {
                    Some(Ok(bytes)) => {
                        if self.handle_frame(&bytes).await? == Flow::Close {
                            info!(session_id = self.id, "Session closed by client");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = self.id, error = %e, "Framing error, dropping session");
                        return Err(e.into());
                    }
                    None => {
                        info!(session_id = self.id, "Client disconnected");
                        break;
                    }
                },
                event = self.events.recv(), if self.events_open => match event {
                    Ok(event) => {
                        if self.subscribed {
                            self.send_notification(event).await?;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(session_id = self.id, missed, "Dropped injected notifications");
                    }
                    Err(RecvError::Closed) => self.events_open = false,
                },
            }
        }
        Ok(())
    }

    async fn exchange_hello(&mut self) -> Result<()> {
        let hello = Hello {
            capabilities: self.capabilities.to_vec(),
            session_id: Some(self.id),
        };
        self.framed.send(hello.to_element()).await?;

        let frame = match self.framed.next().await {
            Some(frame) => frame?,
            None => return Err(ServerError::Session("client left before hello".to_string())),
        };
        let client = match Message::parse(&frame)? {
            Message::Hello(hello) => hello,
            other => {
                return Err(ServerError::Session(format!(
                    "expected hello, received {}",
                    other.message_type()
                )))
            }
        };
        if client.session_id.is_some() {
            return Err(ServerError::Session("client hello carries a session-id".to_string()));
        }

        let offered = |base: &str| {
            self.capabilities.iter().any(|c| c == base) && client.capabilities.iter().any(|c| c == base)
        };
        if offered(BASE_1_1) {
            self.framed.codec_mut().set_framing(Framing::Chunked);
        } else if !offered(BASE_1_0) {
            return Err(ServerError::Session("no common base capability".to_string()));
        }

        info!(
            session_id = self.id,
            framing = ?self.framed.codec().framing(),
            "Hello exchange complete"
        );
        Ok(())
    }

    async fn handle_frame(&mut self, frame: &[u8]) -> Result<Flow> {
        let rpc = match Message::parse(frame) {
            Ok(Message::Rpc(rpc)) => rpc,
            Ok(other) => {
                warn!(session_id = self.id, message_type = other.message_type(), "Ignoring non-rpc message");
                return Ok(Flow::Continue);
            }
            Err(e) => {
                warn!(session_id = self.id, error = %e, "Malformed rpc");
                let error = rpc_error("rpc", "malformed-message", None);
                self.framed.send(reply_error(None, &error)).await?;
                return Ok(Flow::Continue);
            }
        };

        let Some(message_id) = rpc.message_id.clone() else {
            let error = rpc_error("rpc", "missing-attribute", Some("message-id is required"));
            self.framed.send(reply_error(None, &error)).await?;
            return Ok(Flow::Continue);
        };

        let operation = rpc.operation().map(|op| op.local_name().to_string());
        debug!(session_id = self.id, message_id = %message_id, operation = ?operation, "Handling rpc");

        match operation.as_deref() {
            Some("create-subscription") => self.subscribe(&message_id).await,
            Some("close-session") => {
                self.framed.send(reply_ok(&message_id)).await?;
                Ok(Flow::Close)
            }
            _ => {
                let reply = self.reply(&message_id, &rpc);
                self.framed.send(reply).await?;
                Ok(Flow::Continue)
            }
        }
    }

    fn reply(&self, message_id: &str, rpc: &Rpc) -> Element {
        let Some(operation) = rpc.operation() else {
            let error = rpc_error("rpc", "missing-element", Some("rpc has no operation"));
            return reply_error(Some(message_id), &error);
        };

        match operation.local_name() {
            "get" => {
                let content = self.data.datastore("running").unwrap_or_default();
                reply_data(message_id, select(content, operation.child("filter")))
            }
            "get-config" => {
                let source = operation
                    .child("source")
                    .and_then(|s| s.children.first())
                    .map(|s| s.local_name().to_string())
                    .unwrap_or_default();
                match self.data.datastore(&source) {
                    Some(content) => reply_data(message_id, select(content, operation.child("filter"))),
                    None => {
                        let message = format!("datastore {:?} does not exist", source);
                        reply_error(Some(message_id), &rpc_error("protocol", "invalid-value", Some(&message)))
                    }
                }
            }
            "get-schema" => {
                let identifier = operation.child_text("identifier").unwrap_or_default();
                match self.data.schema(identifier) {
                    Some(text) => reply_data(
                        message_id,
                        Element::new("data")
                            .with_namespace(MONITORING_NAMESPACE)
                            .with_text(text),
                    ),
                    None => {
                        let message = format!("no schema named {:?}", identifier);
                        reply_error(Some(message_id), &rpc_error("application", "invalid-value", Some(&message)))
                    }
                }
            }
            other => {
                debug!(session_id = self.id, operation = other, "Unsupported operation");
                reply_error(
                    Some(message_id),
                    &rpc_error("protocol", "operation-not-supported", None),
                )
            }
        }
    }

    async fn subscribe(&mut self, message_id: &str) -> Result<Flow> {
        if self.subscribed {
            let error = rpc_error("protocol", "operation-failed", Some("subscription already active"));
            self.framed.send(reply_error(Some(message_id), &error)).await?;
            return Ok(Flow::Continue);
        }

        self.subscribed = true;
        self.framed.send(reply_ok(message_id)).await?;
        info!(session_id = self.id, "Subscription active");

        let replay = self.data.replay().to_vec();
        for event in replay {
            self.send_notification(event).await?;
        }
        Ok(Flow::Continue)
    }

    async fn send_notification(&mut self, event: Element) -> Result<()> {
        let event_time: DateTime<FixedOffset> = Utc::now().into();
        debug!(session_id = self.id, event = %event.local_name(), "Sending notification");
        self.framed.send(notification(event_time, event)).await?;
        Ok(())
    }
}

fn rpc_error(error_type: &str, tag: &str, message: Option<&str>) -> RpcErrorInfo {
    RpcErrorInfo {
        error_type: Some(error_type.to_string()),
        error_tag: Some(tag.to_string()),
        error_severity: Some("error".to_string()),
        error_message: message.map(str::to_string),
        ..Default::default()
    }
}

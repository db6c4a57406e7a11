//! Session manager
//!
//! A [`Session`] owns one channel for its whole life. The reader half goes to
//! the notification dispatcher's background task; the writer half sits behind
//! a lock so concurrent callers never interleave frames. Each RPC registers
//! with the correlator before it is written and then waits on its own reply.

use crate::config::ClientConfig;
use crate::correlator::{Correlator, Termination};
use crate::dispatcher::NotificationDispatcher;
use crate::negotiator::negotiate;
use crate::{DeviceProfile, NetconfError, Result, RpcErrorReply};
use futures::SinkExt;
use netconf_proto::capability::NOTIFICATION_1_0;
use netconf_proto::operations;
use netconf_proto::{
    Capability, Datastore, Element, Filter, Framing, NetconfCodec, Notification, ProtocolError,
    RpcReply, SessionId, SubscriptionOptions,
};
use netconf_transport::{BoxedWriter, Channel, ChannelHandle, Target, Transport};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{timeout_at, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Bound on each teardown step of [`Session::close`]
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Negotiating,
    Established,
    Closing,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Negotiating => "negotiating",
            SessionState::Established => "established",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-session tuning
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub profile: DeviceProfile,
    pub hello_timeout: Duration,

    /// Default deadline for each RPC
    pub rpc_timeout: Duration,

    /// Notifications held before new ones are dropped
    pub notification_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            profile: DeviceProfile::Default,
            hello_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(30),
            notification_capacity: 1024,
        }
    }
}

/// An established NETCONF session
pub struct Session {
    session_id: SessionId,
    peer: String,
    framing: Framing,
    profile: DeviceProfile,
    rpc_timeout: Duration,
    raw_capabilities: Vec<String>,
    capabilities: BTreeSet<Capability>,
    state: Arc<RwLock<SessionState>>,
    correlator: Arc<Correlator>,
    writer: Mutex<FramedWrite<BoxedWriter, NetconfCodec>>,
    dispatcher: NotificationDispatcher,
    channel: Mutex<ChannelHandle>,
    close_started: AtomicBool,
}

impl Session {
    /// Open a channel over `transport` and negotiate a session on it
    pub async fn connect(
        transport: &dyn Transport,
        target: &Target,
        options: SessionOptions,
    ) -> Result<Self> {
        info!(
            peer = %target.peer(),
            transport = transport.name(),
            profile = %options.profile,
            "Connecting"
        );
        let channel = transport.open(target).await?;
        Self::establish(channel, options).await
    }

    /// Connect using a loaded client configuration
    pub async fn connect_with_config(config: &ClientConfig) -> Result<Self> {
        let transport = config.transport.build();
        let target = config.target();
        Self::connect(transport.as_ref(), &target, config.session_options()).await
    }

    /// Negotiate a session on an already open channel
    pub async fn establish(channel: Channel, options: SessionOptions) -> Result<Self> {
        let state = Arc::new(RwLock::new(SessionState::Disconnected));
        let peer = channel.peer().to_string();
        let (reader, writer, mut handle) = channel.into_parts();
        let mut reader = FramedRead::new(reader, NetconfCodec::new());
        let mut writer = FramedWrite::new(writer, NetconfCodec::new());

        transition(&state, SessionState::Negotiating).await;
        let negotiated =
            match negotiate(&mut reader, &mut writer, options.profile, options.hello_timeout).await
            {
                Ok(negotiated) => negotiated,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Negotiation failed");
                    transition(&state, SessionState::Failed).await;
                    if let Err(close_err) = handle.close().await {
                        debug!(error = %close_err, "Channel close after failed negotiation");
                    }
                    return Err(e);
                }
            };

        let capabilities = parse_capabilities(&negotiated.capabilities);
        let correlator = Arc::new(Correlator::new());

        transition(&state, SessionState::Established).await;
        let dispatcher = NotificationDispatcher::start(
            reader,
            Arc::clone(&correlator),
            Arc::clone(&state),
            options.notification_capacity,
        );

        info!(peer = %peer, session_id = negotiated.session_id, "Session established");

        Ok(Self {
            session_id: negotiated.session_id,
            peer,
            framing: negotiated.framing,
            profile: options.profile,
            rpc_timeout: options.rpc_timeout,
            raw_capabilities: negotiated.capabilities,
            capabilities,
            state,
            correlator,
            writer: Mutex::new(writer),
            dispatcher,
            channel: Mutex::new(handle),
            close_started: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Server capabilities that parsed as URIs
    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    /// Server capabilities exactly as advertised
    pub fn raw_capabilities(&self) -> &[String] {
        &self.raw_capabilities
    }

    /// True when the server advertised `uri`, ignoring query parameters
    pub fn supports(&self, uri: &str) -> bool {
        self.capabilities.iter().any(|c| c.base_uri() == uri)
    }

    /// YANG module names announced through `module=` capability parameters
    pub fn schema_modules(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .filter_map(|c| c.module())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Send any operation with the session's default timeout
    pub async fn dispatch(&self, operation: Element) -> Result<RpcReply> {
        self.dispatch_with_timeout(operation, self.rpc_timeout).await
    }

    /// Send any operation and wait for its reply.
    ///
    /// A reply carrying an `<rpc-error>` of severity `error` becomes
    /// [`NetconfError::Rpc`]; warnings alone are logged and the reply returned.
    pub async fn dispatch_with_timeout(
        &self,
        operation: Element,
        timeout: Duration,
    ) -> Result<RpcReply> {
        self.ensure_established().await?;
        self.call(operation, timeout).await
    }

    /// `<get-config>`; returns the `<data>` element
    pub async fn get_config(&self, source: Datastore, filter: Option<&Filter>) -> Result<Element> {
        let reply = self.dispatch(operations::get_config(source, filter)?).await?;
        Ok(into_data(reply))
    }

    /// `<get>`; returns the `<data>` element
    pub async fn get(&self, filter: Option<&Filter>) -> Result<Element> {
        let reply = self.dispatch(operations::get(filter)?).await?;
        Ok(into_data(reply))
    }

    /// Fetch one YANG module as text
    pub async fn get_schema(&self, module: &str) -> Result<String> {
        let reply = match self.dispatch(operations::get_schema(module, None, None)).await {
            Ok(reply) => reply,
            Err(NetconfError::Rpc(error)) if error.has_tag("invalid-value") => {
                return Err(NetconfError::NotFound(module.to_string()));
            }
            Err(e) => return Err(e),
        };

        match reply.data().map(Element::text_content) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(NetconfError::NotFound(module.to_string())),
        }
    }

    /// Subscribe to the default `NETCONF` stream
    pub async fn create_subscription(&self) -> Result<()> {
        self.create_subscription_with(&SubscriptionOptions::default())
            .await
    }

    pub async fn create_subscription_with(&self, options: &SubscriptionOptions) -> Result<()> {
        if !self.supports(NOTIFICATION_1_0) {
            warn!(session_id = self.session_id, "Server does not advertise notification support");
        }
        self.dispatch(operations::create_subscription(options)?)
            .await?;
        info!(session_id = self.session_id, stream = ?options.stream, "Subscription created");
        Ok(())
    }

    /// Wait for the next notification
    pub async fn take_notification(&self, timeout: Duration) -> Result<Notification> {
        if matches!(
            self.state().await,
            SessionState::Closing | SessionState::Closed
        ) {
            return Err(NetconfError::ChannelClosed);
        }
        self.dispatcher.take(timeout).await
    }

    /// Close the session. Later calls return immediately.
    pub async fn close(&self) -> Result<()> {
        if self.close_started.swap(true, Ordering::SeqCst) {
            debug!(session_id = self.session_id, "Session already closed");
            return Ok(());
        }

        let previous = {
            let mut state = self.state.write().await;
            let previous = *state;
            if previous == SessionState::Established {
                *state = SessionState::Closing;
            }
            previous
        };
        info!(session_id = self.session_id, state = %previous, "Closing session");

        // Waiting callers are released before anything touches the wire.
        let failed = self.correlator.terminate(Termination::Closed);
        if failed > 0 {
            debug!(session_id = self.session_id, pending = failed, "Failed pending requests");
        }
        self.dispatcher.stop();

        if previous == SessionState::Established {
            self.send_close_session().await;
        }

        let shutdown = async { self.writer.lock().await.get_mut().shutdown().await };
        match tokio::time::timeout(CLOSE_TIMEOUT, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Writer shutdown failed"),
            Err(_) => debug!(session_id = self.session_id, "Writer shutdown timed out"),
        }
        let release = async { self.channel.lock().await.close().await };
        match tokio::time::timeout(CLOSE_TIMEOUT, release).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(peer = %self.peer, error = %e, "Transport close failed"),
            Err(_) => warn!(peer = %self.peer, "Transport close timed out"),
        }

        let mut state = self.state.write().await;
        if *state != SessionState::Failed {
            *state = SessionState::Closed;
        }
        info!(session_id = self.session_id, "Session closed");
        Ok(())
    }

    async fn ensure_established(&self) -> Result<()> {
        match self.state().await {
            SessionState::Established => Ok(()),
            other => Err(NetconfError::InvalidState(other.to_string())),
        }
    }

    async fn call(&self, operation: Element, timeout: Duration) -> Result<RpcReply> {
        let deadline = Instant::now() + timeout;
        let pending = self.correlator.register()?;
        let id = pending.id();
        let name = operation.local_name().to_string();
        let rpc = operations::rpc_envelope(&id.to_string(), operation, self.profile.params().namespaces);
        let expired = || NetconfError::RpcTimeout {
            message_id: id,
            timeout,
        };

        let Ok(mut writer) = timeout_at(deadline, self.writer.lock()).await else {
            warn!(message_id = id, operation = %name, "Writer busy past the deadline");
            return Err(expired());
        };
        debug!(message_id = id, operation = %name, "Sending RPC");
        let sent = timeout_at(deadline, writer.send(rpc)).await;
        drop(writer);
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(ProtocolError::Io(e))) => return Err(self.fail(format!("write failed: {}", e)).await),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                // A partly written frame leaves the stream out of sync.
                self.fail(format!("write of message {} stalled", id)).await;
                return Err(expired());
            }
        }

        let reply = pending.wait_until(deadline, timeout).await?;
        let errors = reply.errors();
        if errors.iter().any(|e| !e.is_warning()) {
            debug!(message_id = id, operation = %name, errors = errors.len(), "RPC failed");
            return Err(NetconfError::Rpc(RpcErrorReply::new(reply.body)));
        }
        for warning in &errors {
            warn!(
                message_id = id,
                tag = ?warning.error_tag,
                message = ?warning.error_message,
                "Server warning"
            );
        }

        debug!(message_id = id, operation = %name, "RPC complete");
        Ok(reply)
    }

    /// Best-effort `<close-session>`; the reply is not awaited
    async fn send_close_session(&self) {
        let id = self.correlator.allocate_id();
        let rpc = operations::rpc_envelope(
            &id.to_string(),
            operations::close_session(),
            self.profile.params().namespaces,
        );
        let send = async { self.writer.lock().await.send(rpc).await };
        match tokio::time::timeout(CLOSE_TIMEOUT, send).await {
            Ok(Ok(())) => debug!(session_id = self.session_id, message_id = id, "close-session sent"),
            Ok(Err(e)) => debug!(session_id = self.session_id, error = %e, "close-session not sent"),
            Err(_) => debug!(session_id = self.session_id, "close-session write timed out"),
        }
    }

    async fn fail(&self, reason: String) -> NetconfError {
        {
            let mut state = self.state.write().await;
            if matches!(*state, SessionState::Established | SessionState::Closing) {
                warn!(session_id = self.session_id, reason = %reason, "Session failed");
                *state = SessionState::Failed;
            }
        }
        self.correlator.terminate(Termination::Failed(reason.clone()));
        NetconfError::SessionFailed(reason)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("peer", &self.peer)
            .field("framing", &self.framing)
            .field("profile", &self.profile)
            .finish()
    }
}

async fn transition(state: &RwLock<SessionState>, next: SessionState) {
    let mut state = state.write().await;
    debug!(from = %*state, to = %next, "Session state change");
    *state = next;
}

fn parse_capabilities(raw: &[String]) -> BTreeSet<Capability> {
    raw.iter()
        .filter_map(|uri| match Capability::parse(uri) {
            Ok(capability) => Some(capability),
            Err(e) => {
                warn!(capability = %uri, error = %e, "Skipping unparsable capability");
                None
            }
        })
        .collect()
}

fn into_data(reply: RpcReply) -> Element {
    reply
        .body
        .children
        .into_iter()
        .find(|c| c.local_name() == "data")
        .unwrap_or_else(|| Element::new("data"))
}

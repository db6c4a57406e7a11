//! Simulated device server

use crate::datastore::DeviceData;
use crate::session::DeviceSession;
use crate::{config::ServerConfig, Result, ServerError};
use netconf_proto::{Element, SessionId};
use netconf_transport::MockTransport;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Injected notifications held per session before the oldest are dropped
const EVENT_BACKLOG: usize = 256;

/// The simulated device
pub struct Server {
    /// Server configuration
    config: Arc<ServerConfig>,

    data: Arc<DeviceData>,
    capabilities: Arc<Vec<String>>,
    next_session_id: AtomicU32,

    /// Sessions currently running
    active: Arc<AtomicUsize>,

    events: broadcast::Sender<Element>,
}

impl Server {
    /// Create a new server
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let data = DeviceData::from_config(&config)?;
        let (events, _) = broadcast::channel(EVENT_BACKLOG);

        Ok(Self {
            capabilities: Arc::new(config.advertised_capabilities()),
            next_session_id: AtomicU32::new(config.session_id_start),
            config: Arc::new(config),
            data: Arc::new(data),
            active: Arc::new(AtomicUsize::new(0)),
            events,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle for injecting notifications into subscribed sessions
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            events: self.events.clone(),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Serve one session on an already connected stream
    pub fn serve_stream<S>(&self, stream: S) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let id: SessionId = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = DeviceSession::new(
            id,
            stream,
            Arc::clone(&self.data),
            Arc::clone(&self.capabilities),
            self.events.subscribe(),
        );

        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::SeqCst);
        info!(session_id = id, "Session started");

        tokio::spawn(async move {
            if let Err(e) = session.run().await {
                warn!(session_id = id, error = %e, "Session ended with error");
            }
            active.fetch_sub(1, Ordering::SeqCst);
            debug!(session_id = id, "Session finished");
        })
    }

    /// A transport whose single channel is served by this device in memory
    pub fn mock_transport(&self) -> MockTransport {
        let (transport, stream) = MockTransport::create_pair();
        self.serve_stream(stream);
        transport
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.listen).await.map_err(|e| {
            ServerError::Config(format!("cannot listen on {}: {}", self.config.listen, e))
        })?;
        info!(addr = %listener.local_addr()?, "Listening");
        Ok(listener)
    }

    /// Accept connections until the listener fails
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            if self.active_sessions() >= self.config.max_sessions {
                warn!(peer = %peer, max = self.config.max_sessions, "Session limit reached, refusing connection");
                continue;
            }
            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "set_nodelay failed");
            }
            debug!(peer = %peer, "Accepted connection");
            self.serve_stream(stream);
        }
    }

    /// Run the server until Ctrl+C
    pub async fn run(self) -> Result<()> {
        info!("Server starting...");
        let listener = self.bind().await?;

        tokio::select! {
            result = self.serve(listener) => {
                if let Err(e) = &result {
                    error!("Accept loop error: {}", e);
                }
                result?;
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(err) => {
                        error!("Error waiting for shutdown signal: {}", err);
                        return Err(ServerError::Io(err));
                    }
                }
            }
        }

        info!(active = self.active_sessions(), "Server shutdown complete");
        Ok(())
    }
}

/// Injects notifications into every subscribed session
#[derive(Clone)]
pub struct ServerHandle {
    events: broadcast::Sender<Element>,
}

impl ServerHandle {
    /// Queue an event element; returns the number of sessions that will see it
    pub fn inject(&self, event: Element) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Same as [`ServerHandle::inject`] with the event given as XML
    pub fn inject_xml(&self, xml: &str) -> Result<usize> {
        Ok(self.inject(Element::parse(xml)?))
    }
}

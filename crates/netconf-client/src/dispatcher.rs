//! Notification dispatcher
//!
//! A single background task owns the read half of the channel. Every decoded
//! message is classified: replies go to the correlator, notifications go to a
//! bounded queue. Neither path waits on the other; a full queue drops the
//! incoming notification instead of stalling replies.

use crate::correlator::{Correlator, Termination};
use crate::session::SessionState;
use crate::{NetconfError, Result};
use futures::StreamExt;
use netconf_proto::{Message, NetconfCodec, Notification};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

/// Reader task plus the consumer end of the notification queue
pub struct NotificationDispatcher {
    queue: Mutex<mpsc::Receiver<Notification>>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// Spawn the reader task
    pub fn start<R>(
        reader: FramedRead<R, NetconfCodec>,
        correlator: Arc<Correlator>,
        state: Arc<RwLock<SessionState>>,
        capacity: usize,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(read_loop(reader, correlator, state, tx));

        Self {
            queue: Mutex::new(rx),
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// Next queued notification, in arrival order.
    ///
    /// Fails with `ChannelClosed` once the reader has stopped and the queue is
    /// drained.
    pub async fn take(&self, timeout: Duration) -> Result<Notification> {
        let next = async { self.queue.lock().await.recv().await };
        match tokio::time::timeout(timeout, next).await {
            Ok(Some(notification)) => Ok(notification),
            Ok(None) => Err(NetconfError::ChannelClosed),
            Err(_) => Err(NetconfError::Timeout(timeout)),
        }
    }

    /// Stop the reader task; queued notifications stay readable
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn read_loop<R>(
    mut reader: FramedRead<R, NetconfCodec>,
    correlator: Arc<Correlator>,
    state: Arc<RwLock<SessionState>>,
    tx: mpsc::Sender<Notification>,
) where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        match reader.next().await {
            Some(Ok(frame)) => route(&frame, &correlator, &tx),
            Some(Err(e)) => break format!("unrecoverable framing error: {}", e),
            None => break "transport closed by peer".to_string(),
        }
    };

    let mut state = state.write().await;
    match *state {
        SessionState::Negotiating | SessionState::Established => {
            warn!(reason = %reason, "Session failed");
            *state = SessionState::Failed;
            drop(state);
            correlator.terminate(Termination::Failed(reason));
        }
        current => {
            debug!(reason = %reason, state = ?current, "Reader stopped");
            drop(state);
            correlator.terminate(Termination::Closed);
        }
    }
    info!("Notification dispatcher stopped");
}

fn route(frame: &[u8], correlator: &Correlator, tx: &mpsc::Sender<Notification>) {
    match Message::parse(frame) {
        Ok(Message::RpcReply(reply)) => {
            correlator.resolve(reply);
        }
        Ok(Message::Notification(notification)) => match tx.try_send(notification) {
            Ok(()) => debug!("Queued notification"),
            Err(TrySendError::Full(dropped)) => {
                warn!(event_type = %dropped.event_type, "Notification queue full, dropping notification");
            }
            Err(TrySendError::Closed(_)) => debug!("Notification consumer gone"),
        },
        Ok(other) => warn!(message_type = other.message_type(), "Ignoring unexpected message"),
        Err(e) => warn!(error = %e, len = frame.len(), "Dropping malformed message"),
    }
}

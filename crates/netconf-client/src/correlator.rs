//! RPC correlator
//!
//! Hands out message identifiers and matches replies to the callers waiting
//! on them. Callers register before writing their request; the reader task
//! resolves entries as replies arrive, in whatever order the server sends
//! them.

use crate::{NetconfError, Result};
use netconf_proto::RpcReply;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

type Waiter = oneshot::Sender<Result<RpcReply>>;

/// Why the correlator stopped accepting requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The caller closed the session
    Closed,

    /// The connection was lost
    Failed(String),
}

impl Termination {
    fn to_error(&self) -> NetconfError {
        match self {
            Termination::Closed => NetconfError::SessionClosed,
            Termination::Failed(reason) => NetconfError::SessionFailed(reason.clone()),
        }
    }
}

#[derive(Default)]
struct PendingTable {
    waiters: HashMap<u64, Waiter>,
    terminated: Option<Termination>,
}

/// Pending request table plus identifier allocation
pub struct Correlator {
    next_id: AtomicU64,
    table: Arc<Mutex<PendingTable>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            table: Arc::new(Mutex::new(PendingTable::default())),
        }
    }

    /// Allocate an identifier and register a waiter for it
    pub fn register(&self) -> Result<PendingRequest> {
        let mut table = self.table.lock();
        if let Some(termination) = &table.terminated {
            return Err(termination.to_error());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        table.waiters.insert(id, tx);
        debug!(message_id = id, pending = table.waiters.len(), "Registered pending request");

        Ok(PendingRequest {
            id,
            rx,
            table: Arc::clone(&self.table),
        })
    }

    /// Allocate an identifier for a request nobody waits on
    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Deliver a reply to its waiter.
    ///
    /// Returns false when no request is waiting on the reply's identifier;
    /// the reply is then discarded.
    pub fn resolve(&self, reply: RpcReply) -> bool {
        let Some(id) = reply
            .message_id
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        else {
            warn!(message_id = ?reply.message_id, "Discarding reply without a usable message-id");
            return false;
        };

        let waiter = self.table.lock().waiters.remove(&id);
        match waiter {
            Some(waiter) => {
                if waiter.send(Ok(reply)).is_err() {
                    debug!(message_id = id, "Caller stopped waiting before reply arrived");
                }
                true
            }
            None => {
                warn!(message_id = id, "Discarding reply with unknown message-id");
                false
            }
        }
    }

    /// Fail every waiting request and refuse new ones.
    ///
    /// Only the first termination counts; later calls find nothing pending.
    pub fn terminate(&self, termination: Termination) -> usize {
        let mut table = self.table.lock();
        let termination = table.terminated.get_or_insert(termination).clone();

        let waiters: Vec<_> = table.waiters.drain().collect();
        let count = waiters.len();
        for (id, waiter) in waiters {
            debug!(message_id = id, "Failing pending request");
            let _ = waiter.send(Err(termination.to_error()));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.table.lock().waiters.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.table.lock().terminated.is_some()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// One registered request; dropping it withdraws the registration
pub struct PendingRequest {
    id: u64,
    rx: oneshot::Receiver<Result<RpcReply>>,
    table: Arc<Mutex<PendingTable>>,
}

impl PendingRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the reply, a session-level failure, or the timeout
    pub async fn wait(self, timeout: Duration) -> Result<RpcReply> {
        self.wait_until(Instant::now() + timeout, timeout).await
    }

    /// Like [`PendingRequest::wait`], against a deadline fixed earlier.
    /// `timeout` is the whole budget and is what an expiry reports.
    pub async fn wait_until(mut self, deadline: Instant, timeout: Duration) -> Result<RpcReply> {
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NetconfError::SessionClosed),
            Err(_) => {
                warn!(message_id = self.id, timeout_ms = timeout.as_millis() as u64, "RPC timed out");
                Err(NetconfError::RpcTimeout {
                    message_id: self.id,
                    timeout,
                })
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if self.table.lock().waiters.remove(&self.id).is_some() {
            debug!(message_id = self.id, "Removed pending request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use netconf_proto::Element;

    fn reply(id: &str, marker: &str) -> RpcReply {
        RpcReply::from_element(
            Element::new("rpc-reply")
                .with_attr("message-id", id)
                .with_child(Element::new("data").with_text(marker)),
        )
    }

    #[test]
    fn test_ids_are_monotonic_from_one() {
        let correlator = Correlator::new();
        let a = correlator.register().unwrap();
        let b = correlator.register().unwrap();
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        drop(a);
        let c = correlator.register().unwrap();
        assert_eq!(c.id(), 3);
    }

    #[tokio::test]
    async fn test_out_of_order_resolution() {
        let correlator = Correlator::new();
        let first = correlator.register().unwrap();
        let second = correlator.register().unwrap();

        assert!(correlator.resolve(reply("2", "second")));
        assert!(correlator.resolve(reply("1", "first")));

        let timeout = Duration::from_secs(1);
        let first = first.wait(timeout).await.unwrap();
        let second = second.wait(timeout).await.unwrap();
        assert_eq!(first.data().unwrap().text.as_deref(), Some("first"));
        assert_eq!(second.data().unwrap().text.as_deref(), Some("second"));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let correlator = Correlator::new();
        let pending = correlator.register().unwrap();
        assert_eq!(correlator.pending_count(), 1);

        let err = pending.wait(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RpcTimeout);
        assert_eq!(correlator.pending_count(), 0);

        // A late reply is discarded, not delivered twice
        assert!(!correlator.resolve(reply("1", "late")));
    }

    #[test]
    fn test_unknown_and_missing_ids_are_discarded() {
        let correlator = Correlator::new();
        let _pending = correlator.register().unwrap();

        assert!(!correlator.resolve(reply("99", "stray")));
        assert!(!correlator.resolve(RpcReply::from_element(Element::new("rpc-reply"))));
        assert_eq!(correlator.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_terminate_fails_waiters_once() {
        let correlator = Correlator::new();
        let pending = correlator.register().unwrap();

        assert_eq!(correlator.terminate(Termination::Closed), 1);
        assert_eq!(correlator.terminate(Termination::Failed("eof".into())), 0);

        let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);

        let err = correlator.register().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
        assert!(correlator.is_terminated());
    }

    #[tokio::test]
    async fn test_failure_termination() {
        let correlator = Correlator::new();
        let pending = correlator.register().unwrap();
        correlator.terminate(Termination::Failed("connection reset".into()));

        let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionFailed);
    }

    #[tokio::test]
    async fn test_wait_until_reports_whole_budget() {
        let correlator = Correlator::new();
        let budget = Duration::from_millis(30);
        let deadline = Instant::now() + budget;
        let pending = correlator.register().unwrap();

        match pending.wait_until(deadline, budget).await {
            Err(NetconfError::RpcTimeout { message_id, timeout }) => {
                assert_eq!(message_id, 1);
                assert_eq!(timeout, budget);
            }
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_allocate_id_after_termination() {
        let correlator = Correlator::new();
        let _pending = correlator.register().unwrap();
        correlator.terminate(Termination::Closed);

        assert!(correlator.register().is_err());
        assert_eq!(correlator.allocate_id(), 2);
        assert_eq!(correlator.pending_count(), 0);
    }
}

//! Request correlation: id allocation and routing of inbound frames to
//! their pending requests.
//!
//! The table is keyed by request id. Issuing callers insert concurrently;
//! the single inbound routing task resolves and removes. Entries are
//! independent, so a concurrent map is enough and unrelated requests never
//! serialize on each other.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{GraphQLError, Result};
use crate::response::{GraphQLResponse, GraphQLResponseError};

/// Slot for a subscription's terminal failure. Set before the sender is
/// dropped so the stream can surface the error after draining its buffer.
pub(crate) type FailSlot = Arc<Mutex<Option<GraphQLError>>>;

/// One outstanding request.
enum PendingRequest {
    /// Query or mutation: exactly one terminal response.
    Single(oneshot::Sender<Result<GraphQLResponse<Value>>>),
    /// Subscription: zero or more `next` frames before a terminal frame.
    Streaming {
        tx: mpsc::Sender<GraphQLResponse<Value>>,
        fail: FailSlot,
    },
}

/// What the routing task should do after a `next` frame was handled.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Routed {
    /// Delivered, or dropped as a stale id.
    Delivered,
    /// A streaming consumer fell behind; its entry was dropped and the
    /// server should be told to stop via `complete`.
    Overflowed,
}

pub(crate) struct RequestCorrelator {
    /// Source of request ids; never reused while the connection lives.
    next_id: AtomicU64,
    table: DashMap<String, PendingRequest>,
    /// Per-subscription buffer before a slow consumer is cancelled.
    buffer: usize,
    /// Set once by [`terminate_all`](Self::terminate_all); registrations
    /// that race past the drain observe it and fail instead of leaking.
    terminated: Mutex<Option<GraphQLError>>,
}

impl RequestCorrelator {
    pub fn new(buffer: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            table: DashMap::new(),
            buffer,
            terminated: Mutex::new(None),
        }
    }

    fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Register a single-response request. The entry exists before the
    /// `subscribe` frame goes out, so an immediate response cannot be lost.
    pub fn register_single(
        &self,
    ) -> Result<(String, oneshot::Receiver<Result<GraphQLResponse<Value>>>)> {
        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.table.insert(id.clone(), PendingRequest::Single(tx));
        self.check_terminated(&id)?;
        Ok((id, rx))
    }

    /// Register a streaming request with a bounded buffer.
    pub fn register_streaming(
        &self,
    ) -> Result<(String, mpsc::Receiver<GraphQLResponse<Value>>, FailSlot)> {
        let id = self.allocate_id();
        let (tx, rx) = mpsc::channel(self.buffer);
        let fail: FailSlot = Arc::new(Mutex::new(None));
        self.table.insert(
            id.clone(),
            PendingRequest::Streaming {
                tx,
                fail: fail.clone(),
            },
        );
        self.check_terminated(&id)?;
        Ok((id, rx, fail))
    }

    /// Registration races with connection teardown: if the table was
    /// already drained, the new entry would never be resolved. The lock
    /// orders this check against `terminate_all`.
    fn check_terminated(&self, id: &str) -> Result<()> {
        if let Some(cause) = &*self.terminated.lock() {
            self.table.remove(id);
            return Err(cause.replicate());
        }
        Ok(())
    }

    /// Remove a pending request without resolving it (cancellation).
    /// Returns whether the id was still registered.
    pub fn remove(&self, id: &str) -> bool {
        self.table.remove(id).is_some()
    }

    /// Route a `next` frame. Unknown ids are dropped: the server may keep
    /// sending briefly after a local cancellation.
    pub fn resolve_next(&self, id: &str, payload: GraphQLResponse<Value>) -> Routed {
        let Some(entry) = self.table.get(id) else {
            debug!(id, "Dropping next frame for unknown request");
            return Routed::Delivered;
        };
        if let PendingRequest::Streaming { tx, fail } = &*entry {
            match tx.try_send(payload) {
                Ok(()) => Routed::Delivered,
                Err(TrySendError::Full(_)) => {
                    *fail.lock() = Some(GraphQLError::Overflow { id: id.to_string() });
                    drop(entry);
                    self.table.remove(id);
                    warn!(id, "Subscription consumer fell behind, cancelling");
                    Routed::Overflowed
                }
                Err(TrySendError::Closed(_)) => {
                    // Receiver went away without cancelling; drop the entry
                    // like any other stale id.
                    drop(entry);
                    self.table.remove(id);
                    debug!(id, "Dropping next frame for abandoned subscription");
                    Routed::Delivered
                }
            }
        } else {
            drop(entry);
            if let Some((_, PendingRequest::Single(tx))) = self.table.remove(id) {
                let _ = tx.send(Ok(payload));
            }
            Routed::Delivered
        }
    }

    /// Route an `error` frame: terminal request-level errors.
    pub fn resolve_error(&self, id: &str, errors: Vec<GraphQLResponseError>) {
        match self.table.remove(id) {
            Some((_, PendingRequest::Single(tx))) => {
                // Request errors are data at this boundary, not failures;
                // callers convert via `GraphQLResponse::into_result`.
                let _ = tx.send(Ok(GraphQLResponse {
                    data: None,
                    errors: Some(errors),
                    extensions: None,
                }));
            }
            Some((_, PendingRequest::Streaming { tx, fail })) => {
                *fail.lock() = Some(GraphQLError::Subscription(errors));
                drop(tx);
            }
            None => debug!(id, "Dropping error frame for unknown request"),
        }
    }

    /// Route a `complete` frame: normal end of results.
    pub fn resolve_complete(&self, id: &str) {
        match self.table.remove(id) {
            Some((_, PendingRequest::Single(tx))) => {
                // Completed without a `next`: an empty response.
                let _ = tx.send(Ok(GraphQLResponse {
                    data: None,
                    errors: None,
                    extensions: None,
                }));
            }
            Some((_, PendingRequest::Streaming { tx, .. })) => drop(tx),
            None => debug!(id, "Dropping complete frame for unknown request"),
        }
    }

    /// Fail every pending request with `cause` and clear the table. Called
    /// on connection loss and on `stop()`.
    pub fn terminate_all(&self, cause: &GraphQLError) {
        *self.terminated.lock() = Some(cause.replicate());
        let ids: Vec<String> = self.table.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, pending)) = self.table.remove(&id) {
                match pending {
                    PendingRequest::Single(tx) => {
                        let _ = tx.send(Err(cause.replicate()));
                    }
                    PendingRequest::Streaming { tx, fail } => {
                        *fail.lock() = Some(cause.replicate());
                        drop(tx);
                    }
                }
            }
        }
    }

    /// Number of outstanding requests.
    pub fn pending(&self) -> usize {
        self.table.len()
    }
}

//! Outstanding request bookkeeping
//!
//! Every request that expects a reply owns exactly one entry, keyed by its
//! id, until it is resolved, rejected or swept. Settling removes the entry
//! first, so a continuation can only ever be completed once.
//!
//! Fire-and-forget commands are only noted by id, so their replies can be
//! told apart from replies nobody asked for.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError, TransactionError};

type Completion = oneshot::Sender<std::result::Result<Vec<Value>, TransactionError>>;

struct Transaction {
    method: String,
    created_at: Instant,
    completion: Completion,
}

/// Table of requests awaiting a correlated reply
pub struct TransactionTable {
    device: Arc<str>,
    verbose: bool,
    pending: DashMap<u32, Transaction>,
    /// Ids of commands sent without a transaction, with their send time
    untracked: DashMap<u32, Instant>,
}

impl TransactionTable {
    pub fn new(device: impl Into<Arc<str>>, verbose: bool) -> Self {
        Self {
            device: device.into(),
            verbose,
            pending: DashMap::new(),
            untracked: DashMap::new(),
        }
    }

    /// Register a transaction for `id`
    ///
    /// Fails with [`SessionError::DuplicateTransaction`] while another
    /// transaction with the same id is outstanding.
    pub fn register(&self, id: u32, method: &str, created_at: Instant) -> Result<PendingReply> {
        self.untracked.remove(&id);
        match self.pending.entry(id) {
            Entry::Occupied(_) => Err(SessionError::DuplicateTransaction(id)),
            Entry::Vacant(slot) => {
                let (completion, rx) = oneshot::channel();
                slot.insert(Transaction {
                    method: method.to_string(),
                    created_at,
                    completion,
                });
                Ok(PendingReply { id, rx })
            }
        }
    }

    /// Remember that `id` was sent without expecting a reply
    ///
    /// A later reply for it is logged at debug instead of as unknown. Notes
    /// are dropped by [`sweep_expired`](Self::sweep_expired) once they are
    /// older than the transaction max age.
    pub fn note_untracked(&self, id: u32, sent_at: Instant) {
        self.untracked.insert(id, sent_at);
    }

    pub fn is_untracked(&self, id: u32) -> bool {
        self.untracked.contains_key(&id)
    }

    /// Complete the transaction for `id` with a result
    ///
    /// Returns `false` (and logs) when no such transaction exists.
    pub fn resolve(&self, id: u32, result: Vec<Value>) -> bool {
        let Some((_, transaction)) = self.pending.remove(&id) else {
            if let Some((_, sent_at)) = self.untracked.remove(&id) {
                debug!(device = %self.device, id, elapsed = ?sent_at.elapsed(), "Reply for untracked request");
            } else {
                warn!(device = %self.device, id, "Reply for unknown request");
            }
            return false;
        };

        let elapsed = transaction.created_at.elapsed();
        if self.verbose {
            info!(device = %self.device, id, method = %transaction.method, ?elapsed, "Request completed");
        } else {
            debug!(device = %self.device, id, method = %transaction.method, ?elapsed, "Request completed");
        }

        // The caller may have stopped waiting; that is not an error
        let _ = transaction.completion.send(Ok(result));
        true
    }

    /// Fail the transaction for `id`
    ///
    /// Returns `false` (and logs) when no such transaction exists.
    pub fn reject(&self, id: u32, error: TransactionError) -> bool {
        let Some((_, transaction)) = self.pending.remove(&id) else {
            if self.untracked.remove(&id).is_some() {
                debug!(device = %self.device, id, %error, "Failure for untracked request");
            } else {
                warn!(device = %self.device, id, %error, "Failure for unknown request");
            }
            return false;
        };

        debug!(device = %self.device, id, method = %transaction.method, %error, "Request failed");
        let _ = transaction.completion.send(Err(error));
        true
    }

    /// Remove and time out every transaction older than `max_age`
    ///
    /// Returns the swept ids. Untracked notes of the same age are dropped
    /// silently.
    pub fn sweep_expired(&self, now: Instant, max_age: Duration) -> Vec<u32> {
        self.untracked
            .retain(|_, sent_at| now.saturating_duration_since(*sent_at) <= max_age);

        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.created_at) > max_age)
            .map(|entry| *entry.key())
            .collect();

        let mut swept = Vec::with_capacity(expired.len());
        for id in expired {
            // Re-check under the shard lock: a reply may have raced the sweep
            let removed = self
                .pending
                .remove_if(&id, |_, t| now.saturating_duration_since(t.created_at) > max_age);
            if let Some((_, transaction)) = removed {
                let age = now.saturating_duration_since(transaction.created_at);
                let _ = transaction
                    .completion
                    .send(Err(TransactionError::Timeout { id, age }));
                swept.push(id);
            }
        }
        swept
    }

    /// Fail every outstanding transaction with [`TransactionError::Abandoned`]
    ///
    /// Used once nothing can answer any more. Returns the abandoned ids.
    pub fn abandon_all(&self) -> Vec<u32> {
        let ids: Vec<u32> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut abandoned = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, transaction)) = self.pending.remove(&id) {
                let _ = transaction
                    .completion
                    .send(Err(TransactionError::Abandoned { id }));
                abandoned.push(id);
            }
        }
        self.untracked.clear();
        abandoned
    }

    pub fn contains(&self, id: u32) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl std::fmt::Debug for TransactionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionTable")
            .field("device", &self.device)
            .field("pending", &self.pending.len())
            .field("untracked", &self.untracked.len())
            .finish()
    }
}

/// Completion handle for one registered transaction
///
/// Resolves with the reply's result list, or the reason the request failed.
/// Dropping it does not cancel the request.
#[derive(Debug)]
pub struct PendingReply {
    id: u32,
    rx: oneshot::Receiver<std::result::Result<Vec<Value>, TransactionError>>,
}

impl PendingReply {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Future for PendingReply {
    type Output = std::result::Result<Vec<Value>, TransactionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        self.rx
            .poll_unpin(cx)
            .map(|received| received.unwrap_or(Err(TransactionError::Abandoned { id })))
    }
}

//! Coalesced blocking reads
//!
//! Concurrent blocking reads of one session share a single attribute query:
//! the first caller issues it, later callers join it, and all of them are
//! released together when it settles. A new query is only started when none
//! is in flight and the previous one was issued longer ago than the share
//! window.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{ReadFailure, Result};
use crate::transaction::PendingReply;

/// Settlement of a shared query, cloneable by every waiting caller
pub type Settlement = Shared<BoxFuture<'static, std::result::Result<(), ReadFailure>>>;

struct PendingSharedQuery {
    id: u32,
    settle_tx: oneshot::Sender<std::result::Result<(), ReadFailure>>,
    settlement: Settlement,
}

impl PendingSharedQuery {
    fn is_settled(&self) -> bool {
        self.settlement.clone().now_or_never().is_some()
    }
}

/// At most one in-flight shared query per session
#[derive(Default)]
pub struct CoalescingReader {
    pending: Mutex<Option<PendingSharedQuery>>,
}

impl CoalescingReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight query, or start one with `issue`
    ///
    /// Returns `None` when there is nothing to wait for: no query is in
    /// flight and the last one (`last_query`) is within `window` of `now`,
    /// or issuing failed. The caller then serves its cached snapshot.
    pub fn join_or_start<F>(
        &self,
        now: Instant,
        window: Duration,
        last_query: Option<Instant>,
        issue: F,
    ) -> Option<Settlement>
    where
        F: FnOnce() -> Result<(u32, PendingReply)>,
    {
        let mut pending = self.pending.lock();

        match pending.as_ref() {
            Some(query) if !query.is_settled() => return Some(query.settlement.clone()),
            _ => *pending = None,
        }

        if let Some(last) = last_query {
            if now.saturating_duration_since(last) <= window {
                return None;
            }
        }

        let (id, reply) = match issue() {
            Ok(issued) => issued,
            Err(e) => {
                warn!(error = %e, "Could not issue shared attribute query");
                return None;
            }
        };

        let (settle_tx, settle_rx) = oneshot::channel();
        let settlement = async move {
            tokio::select! {
                result = reply => result.map(|_| ()).map_err(ReadFailure::from),
                outcome = settle_rx => outcome.unwrap_or(Err(ReadFailure::Abandoned)),
            }
        }
        .boxed()
        .shared();

        *pending = Some(PendingSharedQuery {
            id,
            settle_tx,
            settlement: settlement.clone(),
        });
        Some(settlement)
    }

    /// Release every waiter of the in-flight query with `outcome`
    ///
    /// Returns the id of the query that was settled, if one was in flight.
    pub fn settle(&self, outcome: std::result::Result<(), ReadFailure>) -> Option<u32> {
        let query = self.pending.lock().take()?;
        // Waiters may already have been released by the reply itself
        let _ = query.settle_tx.send(outcome);
        Some(query.id)
    }

    /// Id of the in-flight query, if it has not settled yet
    pub fn pending_id(&self) -> Option<u32> {
        self.pending
            .lock()
            .as_ref()
            .filter(|query| !query.is_settled())
            .map(|query| query.id)
    }

    pub fn is_pending(&self) -> bool {
        self.pending_id().is_some()
    }
}

impl std::fmt::Debug for CoalescingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingReader")
            .field("pending", &self.pending_id())
            .finish()
    }
}

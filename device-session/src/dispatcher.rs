//! Outbound command dispatch
//!
//! Allocates request ids, registers a transaction for requests that expect a
//! reply, and hands the encoded command to the connection. Ids come from a
//! single atomic counter so concurrent senders never share one; `0` is skipped
//! because the session treats it as "no id".

use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::device::DeviceInfo;
use crate::error::{Result, SessionError, TransactionError};
use crate::message::Command;
use crate::state::SessionState;
use crate::transaction::{PendingReply, TransactionTable};

/// How many fresh ids to try when the counter lands on an outstanding one
const MAX_ID_ATTEMPTS: usize = 16;

pub struct CommandDispatcher {
    label: Arc<str>,
    device: Arc<DeviceInfo>,
    connection: Arc<dyn Connection>,
    transactions: Arc<TransactionTable>,
    state: watch::Receiver<SessionState>,
    next_id: AtomicU32,
    verbose: bool,
}

impl CommandDispatcher {
    pub(crate) fn new(
        label: Arc<str>,
        device: Arc<DeviceInfo>,
        connection: Arc<dyn Connection>,
        transactions: Arc<TransactionTable>,
        state: watch::Receiver<SessionState>,
        verbose: bool,
    ) -> Self {
        Self {
            label,
            device,
            connection,
            transactions,
            state,
            next_id: AtomicU32::new(1),
            verbose,
        }
    }

    /// Send a command without tracking its reply
    ///
    /// Always returns the allocated id, even when the device is not connected
    /// or the connection refused the command.
    pub fn send(&self, method: &str, params: Vec<Value>) -> u32 {
        let id = self.allocate_id();
        self.transactions.note_untracked(id, Instant::now());
        self.dispatch(id, method, params, false);
        id
    }

    /// Send a command and register a transaction for its reply
    pub fn send_expecting_reply(&self, method: &str, params: Vec<Value>) -> Result<(u32, PendingReply)> {
        let reply = self.register(method)?;
        let id = reply.id();
        self.dispatch(id, method, params, true);
        Ok((id, reply))
    }

    fn register(&self, method: &str) -> Result<PendingReply> {
        let mut last_error = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.allocate_id();
            match self.transactions.register(id, method, Instant::now()) {
                Ok(reply) => return Ok(reply),
                Err(SessionError::DuplicateTransaction(id)) => {
                    warn!(device = %self.label, id, "Request id still outstanding, skipping");
                    last_error = Some(SessionError::DuplicateTransaction(id));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or(SessionError::DuplicateTransaction(0)))
    }

    fn allocate_id(&self) -> u32 {
        loop {
            // fetch_add wraps on overflow
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn dispatch(&self, id: u32, method: &str, params: Vec<Value>, tracked: bool) {
        let state = *self.state.borrow();
        if !state.is_connected() {
            warn!(device = %self.label, id, method, %state, "Sending command but device doesn't seem connected");
        }
        if !self.device.supports(method) {
            warn!(device = %self.label, id, method, "Device does not advertise support for this method");
        }

        let command = Command::new(id, method, params);
        if self.verbose {
            info!(device = %self.label, id, method, params = ?command.params, "Sending command");
        } else {
            debug!(device = %self.label, id, method, "Sending command");
        }

        if let Err(e) = self.connection.send(&command) {
            warn!(device = %self.label, id, method, error = %e, "Connection refused command");
            if tracked {
                self.transactions.reject(
                    id,
                    TransactionError::Send {
                        id,
                        reason: e.to_string(),
                    },
                );
            }
        }
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("device", &self.label)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

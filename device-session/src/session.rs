//! Device session: lifecycle, inbound message handling and the public API
//!
//! A [`DeviceSession`] owns everything that belongs to one device: its
//! transaction table, attribute store, poll timer and shared-read state.
//! Nothing is shared between sessions.
//!
//! Inbound events are handled one at a time by [`DeviceSession::run`].
//! Outbound commands may be sent from any task.

use attribute_store::{change, AttributeObserver, AttributeSchema, AttributeSnapshot, AttributeStore, AttributeValue};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::attributes;
use crate::builder::DeviceSessionBuilder;
use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionEvent, EventReceiver};
use crate::device::DeviceInfo;
use crate::dispatcher::CommandDispatcher;
use crate::error::{ReadFailure, Result, SessionError, TransactionError};
use crate::message::{IncomingMessage, Reply};
use crate::polling::{is_stale, PollOutcome, PollScheduler, PollTarget};
use crate::reader::CoalescingReader;
use crate::state::{SessionState, StateCell};
use crate::transaction::TransactionTable;

/// Method used for bulk attribute reads
pub const QUERY_METHOD: &str = "get_prop";

#[derive(Debug, Default)]
struct Timing {
    /// Last bulk attribute update received
    last_update: Option<Instant>,
    /// Last attribute query issued
    last_query: Option<Instant>,
    /// Id of the last attribute query issued
    last_query_id: Option<u32>,
}

pub(crate) struct SessionInner {
    this: Weak<SessionInner>,
    name: Arc<str>,
    device: Arc<DeviceInfo>,
    config: SessionConfig,
    schema: AttributeSchema,
    connection: Arc<dyn Connection>,
    state: StateCell,
    dispatcher: CommandDispatcher,
    transactions: Arc<TransactionTable>,
    store: AttributeStore,
    reader: CoalescingReader,
    poller: parking_lot::Mutex<Option<PollScheduler>>,
    timing: parking_lot::Mutex<Timing>,
}

/// Handle to one device's session; cheap to clone
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<SessionInner>,
}

impl DeviceSession {
    /// Create a builder for a session talking to `device` over `connection`
    pub fn builder(device: DeviceInfo, connection: Arc<dyn Connection>) -> DeviceSessionBuilder {
        DeviceSessionBuilder::new(device, connection)
    }

    pub(crate) fn new(
        name: String,
        device: DeviceInfo,
        connection: Arc<dyn Connection>,
        config: SessionConfig,
        schema: AttributeSchema,
    ) -> Self {
        let name: Arc<str> = name.into();
        let device = Arc::new(device);
        let inner = Arc::new_cyclic(|this| {
            let state = StateCell::new();
            let transactions = Arc::new(TransactionTable::new(Arc::clone(&name), config.log));
            let dispatcher = CommandDispatcher::new(
                Arc::clone(&name),
                Arc::clone(&device),
                Arc::clone(&connection),
                Arc::clone(&transactions),
                state.subscribe(),
                config.log,
            );
            let store = AttributeStore::new(&schema, config.push_policy());

            SessionInner {
                this: this.clone(),
                name,
                device,
                config,
                schema,
                connection,
                state,
                dispatcher,
                transactions,
                store,
                reader: CoalescingReader::new(),
                poller: parking_lot::Mutex::new(None),
                timing: parking_lot::Mutex::new(Timing::default()),
            }
        });

        Self { inner }
    }

    /// Spawn [`run`](Self::run) on the current runtime and start connecting
    pub fn start(&self, events: EventReceiver) -> Result<JoinHandle<()>> {
        let session = self.clone();
        let handle = tokio::spawn(async move { session.run(events).await });
        self.connect()?;
        Ok(handle)
    }

    /// Consume connection events in arrival order until the stream ends
    ///
    /// Between events, expired transactions are swept every
    /// [`SessionConfig::sweep_period`], whether or not the session is polling
    /// or connected. The end of the stream counts as a disconnect, and every
    /// request still outstanding then fails as abandoned.
    pub async fn run(&self, mut events: EventReceiver) {
        let period = self.inner.config.sweep_period();
        let mut sweep = tokio::time::interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                now = sweep.tick() => self.inner.sweep_transactions(now),
            }
        }

        self.inner.on_disconnected("event stream closed");
        let abandoned = self.inner.transactions.abandon_all();
        if !abandoned.is_empty() {
            warn!(device = %self.inner.name, ?abandoned, "Requests abandoned, event stream closed");
        }
        debug!(device = %self.inner.name, "Session event loop ended");
    }

    /// Apply a single connection event
    ///
    /// Periodic polling needs a tokio runtime: a `Connected` event handled
    /// outside one connects the session without polling it.
    pub fn handle_event(&self, event: ConnectionEvent) {
        self.inner.handle_event(event);
    }

    /// Ask the connection to connect
    ///
    /// Moves a disconnected session to `Connecting`; the session becomes
    /// `Connected` once the connection reports it.
    pub fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.state.begin_connecting() {
            info!(device = %inner.name, "Connecting");
        }

        if let Err(e) = inner.connection.connect() {
            // Only undo our own transition; a connected event may have won the race
            inner.state.revert_connecting();
            return Err(SessionError::Connection(e));
        }
        Ok(())
    }

    /// Current attributes, honoring the session's blocking setting
    pub async fn get_attributes(&self) -> Arc<AttributeSnapshot> {
        self.get_attributes_with(self.inner.config.blocking, self.inner.config.timeout)
            .await
    }

    /// Current attributes
    ///
    /// Non-blocking reads, and any read while not connected, return the
    /// cached snapshot without touching the device. Blocking reads join the
    /// in-flight shared query (or start one) and wait for it up to `timeout`.
    /// A read never fails: on timeout or query failure the cached snapshot is
    /// returned.
    pub async fn get_attributes_with(&self, blocking: bool, timeout: Duration) -> Arc<AttributeSnapshot> {
        let inner = &self.inner;
        if !blocking || !inner.state.get().is_connected() {
            return inner.store.snapshot();
        }

        let last_query = inner.timing.lock().last_query;
        let settlement = inner.reader.join_or_start(
            Instant::now(),
            inner.config.share_window,
            last_query,
            || inner.request_attributes(),
        );

        if let Some(settlement) = settlement {
            match tokio::time::timeout(timeout, settlement).await {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => {
                    warn!(device = %inner.name, %failure, "Blocking read failed, serving cached attributes");
                }
                Err(_) => {
                    warn!(device = %inner.name, ?timeout, "Blocking read timed out, serving cached attributes");
                }
            }
        }

        inner.store.snapshot()
    }

    /// Issue a fresh attribute query; the reply updates the snapshot
    pub fn request_attributes(&self) -> Result<u32> {
        self.inner.request_attributes().map(|(id, _)| id)
    }

    /// Send a command without waiting for its reply
    ///
    /// Returns the request id. Sending while disconnected is logged, not refused.
    pub fn send_command(&self, method: &str, params: Vec<Value>) -> u32 {
        self.inner.dispatcher.send(method, params)
    }

    /// Send a command and wait until the device answers it
    ///
    /// Fails when the device returns an error, the command cannot be sent,
    /// or no answer arrives before the transaction is swept.
    pub async fn send_command_await(&self, method: &str, params: Vec<Value>) -> Result<Vec<Value>> {
        let (_, reply) = self.inner.dispatcher.send_expecting_reply(method, params)?;
        Ok(reply.await?)
    }

    /// Record values the caller just set on the device, without notifying observers
    pub fn set_attributes<'a>(&self, values: impl IntoIterator<Item = (&'a str, AttributeValue)>) {
        self.inner.store.apply_local(values);
    }

    /// Register an attribute observer
    pub fn subscribe(&self, observer: Arc<dyn AttributeObserver>) {
        self.inner.store.subscribe(observer);
    }

    /// Log a greeting so the user can tell which device this session drives
    pub fn identify(&self) {
        info!(device = %self.inner.name, "Hi {}", self.inner.device.model);
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    /// Watch lifecycle transitions, including staleness-driven disconnects
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Cached attributes, without any device round-trip
    pub fn snapshot(&self) -> Arc<AttributeSnapshot> {
        self.inner.store.snapshot()
    }

    /// Display name of this session
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.inner.device
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.inner.schema
    }

    /// Number of requests still awaiting a reply
    pub fn pending_transactions(&self) -> usize {
        self.inner.transactions.len()
    }

    /// When the last bulk attribute update arrived
    pub fn last_update(&self) -> Option<Instant> {
        self.inner.timing.lock().last_update
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .poller
            .lock()
            .as_ref()
            .is_some_and(PollScheduler::is_running)
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("name", &self.inner.name)
            .field("device", &self.inner.device.id)
            .field("state", &self.inner.state.get())
            .field("pending_transactions", &self.inner.transactions.len())
            .finish()
    }
}

impl SessionInner {
    fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => self.on_connected(),
            ConnectionEvent::Disconnected => self.on_disconnected("connection closed"),
            ConnectionEvent::Error(payload) => {
                // Not proof of disconnection on its own
                warn!(device = %self.name, error = %payload, "Connection error");
            }
            ConnectionEvent::Message(message) => self.on_message(message),
        }
    }

    fn on_connected(&self) {
        let previous = {
            // Staleness checks read the update time under the same lock
            let mut timing = self.timing.lock();
            timing.last_update = None;
            self.state.transition(SessionState::Connected)
        };
        if previous != SessionState::Connected {
            info!(device = %self.name, "Connected");
        }

        if let Err(e) = self.request_attributes() {
            warn!(device = %self.name, error = %e, "Initial attribute query failed");
        }
        self.restart_polling();
    }

    fn on_disconnected(&self, reason: &str) {
        let previous = self.state.transition(SessionState::Disconnected);
        self.stop_polling();

        if previous != SessionState::Connected {
            debug!(device = %self.name, %previous, reason, "Disconnected");
            return;
        }
        self.after_disconnect(reason);
    }

    /// Follow-up once the session has left `Connected`
    fn after_disconnect(&self, reason: &str) {
        info!(device = %self.name, reason, "Disconnected");
        if self.config.off_on_disconnect {
            self.store.power_off();
        }
        if let Some(id) = self.reader.settle(Err(ReadFailure::Disconnected)) {
            debug!(device = %self.name, id, "Released blocking reads after disconnect");
        }
    }

    fn on_message(&self, message: IncomingMessage) {
        let Some(id) = message.request_id() else {
            match &message.error {
                Some(payload) => error!(device = %self.name, error = %payload, "Device error for no request"),
                None => debug!(device = %self.name, ?message, "Unknown message"),
            }
            return;
        };

        match message.classify() {
            Reply::Ack => {
                if self.config.log {
                    info!(device = %self.name, id, "Received OK");
                }
                self.transactions.resolve(id, vec![Value::from("ok")]);
            }
            Reply::Attributes(values) => {
                self.apply_attributes(id, values);
                self.transactions.resolve(id, values.to_vec());
            }
            Reply::Error(device_error) => {
                error!(device = %self.name, id, error = %device_error, "Error returned for request");
                self.transactions.reject(
                    id,
                    TransactionError::Device {
                        id,
                        source: device_error,
                    },
                );
            }
            Reply::Other(values) => {
                warn!(device = %self.name, id, ?values, "Unhandled reply");
                self.transactions.resolve(id, values.to_vec());
            }
            Reply::Unrecognized => {
                warn!(device = %self.name, id, "Unhandled message");
                self.transactions.resolve(id, Vec::new());
            }
        }
    }

    fn apply_attributes(&self, id: u32, values: &[Value]) {
        let now = Instant::now();
        let (expected, since_query) = {
            let mut timing = self.timing.lock();
            timing.last_update = Some(now);
            (
                timing.last_query_id,
                timing.last_query.map(|at| now.saturating_duration_since(at)),
            )
        };

        if expected != Some(id) {
            warn!(device = %self.name, id, expected = ?expected, "Update with unexpected id");
        }
        if self.config.log {
            info!(device = %self.name, id, ?since_query, ?values, "Received update");
        } else {
            debug!(device = %self.name, id, ?since_query, "Received update");
        }

        let snapshot = attributes::decode(&self.schema, values);
        let publication = self.store.diff_and_publish_at(snapshot, now.into_std());
        if !publication.is_unchanged() {
            let changes = change::describe(&publication.changes);
            if self.config.log {
                info!(device = %self.name, notified = publication.notified, %changes, "Attributes changed");
            } else {
                debug!(device = %self.name, notified = publication.notified, %changes, "Attributes changed");
            }
        }

        self.reader.settle(Ok(()));
    }

    fn request_attributes(&self) -> Result<(u32, crate::transaction::PendingReply)> {
        let issued_at = Instant::now();
        let (id, reply) = self
            .dispatcher
            .send_expecting_reply(QUERY_METHOD, attributes::query_params(&self.schema))?;

        {
            let mut timing = self.timing.lock();
            timing.last_query = Some(issued_at);
            timing.last_query_id = Some(id);
        }

        if self.config.log {
            info!(device = %self.name, id, pending = self.transactions.len(), "Requesting attributes");
        } else {
            debug!(device = %self.name, id, pending = self.transactions.len(), "Requesting attributes");
        }
        Ok((id, reply))
    }

    fn restart_polling(&self) {
        self.stop_polling();
        if !self.config.polling_enabled() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(device = %self.name, "No tokio runtime, periodic polling disabled");
            return;
        }

        let scheduler = PollScheduler::start(Arc::clone(&self.name), self.this.clone(), self.config.interval);
        *self.poller.lock() = Some(scheduler);
    }

    fn stop_polling(&self) {
        let stopped = self.poller.lock().take();
        if let Some(scheduler) = stopped {
            scheduler.stop();
        }
    }

    fn sweep_transactions(&self, now: Instant) {
        for id in self.transactions.sweep_expired(now, self.config.transaction_max_age) {
            warn!(device = %self.name, id, "Timeout for request");
        }
    }

    /// Connected → Disconnected when no update arrived within the threshold
    ///
    /// The check and the transition happen under the timing lock, so a
    /// reconnect racing the tick either resets the update time first or
    /// finds the session already disconnected. Polling is left to the
    /// ticking scheduler, which ends on [`PollOutcome::Stale`].
    fn go_stale_if_silent(&self, now: Instant) -> bool {
        let threshold = self.config.staleness_threshold();
        let went_stale = {
            let timing = self.timing.lock();
            is_stale(timing.last_update, now, threshold) && self.state.end_connected()
        };

        if went_stale {
            warn!(
                device = %self.name,
                ?threshold,
                "No update within threshold, presuming device unreachable"
            );
            self.after_disconnect("stale");
        }
        went_stale
    }
}

impl PollTarget for SessionInner {
    fn on_poll_tick(&self, now: Instant) -> PollOutcome {
        let outcome = if !self.state.get().is_connected() {
            PollOutcome::Idle
        } else if self.go_stale_if_silent(now) {
            PollOutcome::Stale
        } else {
            if let Err(e) = self.request_attributes() {
                warn!(device = %self.name, error = %e, "Poll query failed");
            }
            PollOutcome::Queried
        };

        self.sweep_transactions(now);
        outcome
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;
    use crate::testing::RecordingConnection;
    use serde_json::json;

    struct RefusingConnection;

    impl Connection for RefusingConnection {
        fn connect(&self) -> std::result::Result<(), ConnectionError> {
            Err(ConnectionError::Io("host unreachable".to_string()))
        }

        fn send(&self, _command: &crate::message::Command) -> std::result::Result<(), ConnectionError> {
            Err(ConnectionError::NotConnected)
        }
    }

    fn session(connection: Arc<dyn Connection>) -> DeviceSession {
        DeviceSession::builder(DeviceInfo::new("0x1", "color"), connection)
            .build()
            .unwrap()
    }

    #[test]
    fn test_connect_moves_to_connecting() {
        let connection = Arc::new(RecordingConnection::default());
        let session = session(connection.clone());

        session.connect().unwrap();
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(connection.connects(), 1);

        // Connecting again only asks the connection again
        session.connect().unwrap();
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(connection.connects(), 2);
    }

    #[test]
    fn test_failed_connect_returns_to_disconnected() {
        let session = session(Arc::new(RefusingConnection));

        match session.connect() {
            Err(SessionError::Connection(ConnectionError::Io(_))) => {}
            other => panic!("Expected connection error, got {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_refused_command_fails_the_caller() {
        let session = session(Arc::new(RefusingConnection));

        let result = session.send_command_await("set_power", vec![json!("on")]).await;
        assert!(matches!(
            result,
            Err(SessionError::Transaction(TransactionError::Send { .. }))
        ));
        assert_eq!(session.pending_transactions(), 0);
    }

    #[tokio::test]
    async fn test_connected_event_starts_polling() {
        let connection = Arc::new(RecordingConnection::default());
        let session = session(connection.clone());

        session.handle_event(ConnectionEvent::Connected);

        assert!(session.is_connected());
        assert!(session.is_polling());
        assert_eq!(connection.sent()[0].method, QUERY_METHOD);

        session.handle_event(ConnectionEvent::Disconnected);
        assert!(!session.is_polling());
    }

    #[test]
    fn test_connected_event_outside_runtime_skips_polling() {
        let connection = Arc::new(RecordingConnection::default());
        let session = session(connection.clone());

        session.handle_event(ConnectionEvent::Connected);

        assert!(session.is_connected());
        assert!(!session.is_polling());
        assert_eq!(connection.sent().len(), 1);
    }

    fn answer_last_query(session: &DeviceSession, connection: &RecordingConnection) {
        let id = *connection.sent_ids().last().unwrap();
        let values = vec![json!("on"); AttributeSchema::yeelight().len()];
        session.handle_event(ConnectionEvent::Message(IncomingMessage::reply(id, values)));
    }

    #[tokio::test]
    async fn test_silent_tick_disconnects_once() {
        let connection = Arc::new(RecordingConnection::default());
        let session = session(connection.clone());
        session.handle_event(ConnectionEvent::Connected);
        answer_last_query(&session, &connection);

        let late = Instant::now() + Duration::from_secs(200);
        assert_eq!(session.inner.on_poll_tick(late), PollOutcome::Stale);
        assert_eq!(session.state(), SessionState::Disconnected);

        // Nothing left to end on a second tick
        assert_eq!(session.inner.on_poll_tick(late), PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_reconnect_wins_over_late_staleness_check() {
        let connection = Arc::new(RecordingConnection::default());
        let session = session(connection.clone());
        session.handle_event(ConnectionEvent::Connected);
        answer_last_query(&session, &connection);

        // A repeated connected event resets the update time and restarts polling
        session.handle_event(ConnectionEvent::Connected);
        let late = Instant::now() + Duration::from_secs(200);

        assert_eq!(session.inner.on_poll_tick(late), PollOutcome::Queried);
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.is_polling());
    }

    #[test]
    fn test_identify_does_not_touch_the_device() {
        let connection = Arc::new(RecordingConnection::default());
        let session = session(connection.clone());

        session.identify();
        assert!(connection.sent().is_empty());
    }
}

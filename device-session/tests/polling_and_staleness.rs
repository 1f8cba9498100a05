//! Integration tests for periodic polling, staleness detection and the
//! transaction sweep. All of them run on paused time.


use device_session::{DeviceSession, SessionConfig, SessionError, SessionState, TransactionError};
use serde_json::Value;
use std::time::Duration;
use test_helpers::{bulk_values, settle, Harness};
use tokio::task::JoinHandle;

const SECOND: Duration = Duration::from_secs(1);

fn spawn_toggle(session: &DeviceSession) -> JoinHandle<Result<Vec<Value>, SessionError>> {
    let session = session.clone();
    tokio::spawn(async move { session.send_command_await("toggle", vec![]).await })
}

fn assert_timed_out(result: Result<Vec<Value>, SessionError>) {
    match result {
        Err(SessionError::Transaction(TransactionError::Timeout { age, .. })) => {
            assert!(age > 60 * SECOND);
        }
        other => panic!("Expected timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_each_tick_issues_a_query() {
    let harness = Harness::new(SessionConfig::default());
    harness.connect().await;
    harness.answer_last_query(bulk_values(true, 10, "")).await;

    for tick in 1..=3 {
        tokio::time::sleep(60 * SECOND).await;
        assert_eq!(harness.connection.queries().len(), 1 + tick);
        harness.answer_last_query(bulk_values(true, 10, "")).await;
    }

    assert_eq!(harness.session.state(), SessionState::Connected);
    assert_eq!(harness.session.pending_transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_silent_device_goes_stale_on_next_tick() {
    // interval 60s + timeout 5s: stale once nothing arrived for more than 65s
    let config = SessionConfig::default()
        .with_interval(Duration::from_millis(60_000))
        .with_timeout(Duration::from_millis(5_000));
    let harness = Harness::new(config);
    let mut changes = harness.session.state_changes();
    harness.connect().await;
    harness.answer_last_query(bulk_values(true, 10, "")).await;

    // First tick: 60s since the update, within the threshold
    tokio::time::sleep(60 * SECOND).await;
    assert_eq!(harness.session.state(), SessionState::Connected);
    let queries = harness.connection.queries().len();

    // Second tick: 120s since the update, no further query
    tokio::time::sleep(60 * SECOND).await;
    assert_eq!(harness.session.state(), SessionState::Disconnected);
    assert_eq!(harness.connection.queries().len(), queries);
    assert!(!harness.session.is_polling());

    assert!(changes.has_changed().unwrap());
    assert_eq!(*changes.borrow_and_update(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_stale_session_reports_power_off() {
    let harness = Harness::new(SessionConfig::default().with_off_on_disconnect(true));
    let observer = test_helpers::RecordingObserver::new();
    harness.session.subscribe(observer.clone());
    harness.connect().await;
    harness.answer_last_query(bulk_values(true, 10, "")).await;

    tokio::time::sleep(121 * SECOND).await;

    assert_eq!(harness.session.state(), SessionState::Disconnected);
    assert_eq!(harness.session.snapshot().bool("power"), Some(false));
    assert_eq!(observer.power_offs(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_session_reconnects_on_connected_event() {
    let harness = Harness::new(SessionConfig::default());
    harness.connect().await;
    harness.answer_last_query(bulk_values(true, 10, "")).await;
    tokio::time::sleep(121 * SECOND).await;
    assert_eq!(harness.session.state(), SessionState::Disconnected);

    harness.emit(device_session::ConnectionEvent::Connected).await;
    assert_eq!(harness.session.state(), SessionState::Connected);
    assert!(harness.session.last_update().is_none());

    // The old update no longer counts against the new connection
    tokio::time::sleep(61 * SECOND).await;
    assert_eq!(harness.session.state(), SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_never_updated_session_is_not_stale() {
    let harness = Harness::new(SessionConfig::default());
    harness.connect().await;

    tokio::time::sleep(181 * SECOND).await;

    assert_eq!(harness.session.state(), SessionState::Connected);
    assert_eq!(harness.connection.queries().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_command_times_out_on_sweep() {
    let harness = Harness::new(SessionConfig::default());
    harness.connect().await;

    let command = spawn_toggle(&harness.session);

    // Sweeps up to 60s find it younger than the max age
    tokio::time::sleep(61 * SECOND).await;
    assert!(!command.is_finished());

    // The next sweep, 15s later, times it out
    tokio::time::sleep(15 * SECOND).await;
    assert!(command.is_finished());
    assert_timed_out(command.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_command_times_out_without_polling() {
    let harness = Harness::new(SessionConfig::without_polling());
    harness.connect().await;

    let command = spawn_toggle(&harness.session);
    settle().await;
    assert_eq!(harness.session.pending_transactions(), 2);

    tokio::time::sleep(600 * SECOND).await;

    assert!(command.is_finished());
    assert_timed_out(command.await.unwrap());
    // The query sent on connect expired as well
    assert_eq!(harness.session.pending_transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_command_times_out_while_disconnected() {
    let harness = Harness::new(SessionConfig::default());
    harness.connect().await;

    let command = spawn_toggle(&harness.session);
    settle().await;
    harness.disconnect().await;
    assert!(!harness.session.is_polling());

    tokio::time::sleep(600 * SECOND).await;

    assert!(command.is_finished());
    assert_timed_out(command.await.unwrap());
    assert_eq!(harness.session.pending_transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_disables_polling() {
    let harness = Harness::new(SessionConfig::without_polling());
    harness.connect().await;
    assert!(!harness.session.is_polling());

    tokio::time::sleep(600 * SECOND).await;

    assert_eq!(harness.connection.queries().len(), 1);
    assert_eq!(harness.session.state(), SessionState::Connected);
}

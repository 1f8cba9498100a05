//! Connection lifecycle state

use std::fmt;
use tokio::sync::watch;

/// Lifecycle state of a device session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn is_connected(self) -> bool {
        self == SessionState::Connected
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
        }
    }
}

/// Shared, observable holder of the current [`SessionState`]
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<SessionState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Disconnected);
        Self { tx }
    }

    pub fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Move to `next`, returning the state that was replaced
    pub fn transition(&self, next: SessionState) -> SessionState {
        self.tx.send_replace(next)
    }

    /// Disconnected → Connecting; returns whether the transition happened
    pub fn begin_connecting(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == SessionState::Disconnected {
                *state = SessionState::Connecting;
                true
            } else {
                false
            }
        })
    }

    /// Connected → Disconnected; returns whether the transition happened
    ///
    /// Leaves any other state alone, so a session that was already
    /// disconnected or is reconnecting is not touched.
    pub fn end_connected(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == SessionState::Connected {
                *state = SessionState::Disconnected;
                true
            } else {
                false
            }
        })
    }

    /// Connecting → Disconnected, after a connect attempt failed
    pub fn revert_connecting(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == SessionState::Connecting {
                *state = SessionState::Disconnected;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_connecting_only_from_disconnected() {
        let cell = StateCell::new();
        assert!(cell.begin_connecting());
        assert_eq!(cell.get(), SessionState::Connecting);
        assert!(!cell.begin_connecting());
        assert!(cell.revert_connecting());
        assert_eq!(cell.get(), SessionState::Disconnected);
        assert!(cell.begin_connecting());

        cell.transition(SessionState::Connected);
        assert!(!cell.begin_connecting());
        assert!(!cell.revert_connecting());
        assert_eq!(cell.get(), SessionState::Connected);
    }

    #[test]
    fn test_end_connected_only_from_connected() {
        let cell = StateCell::new();
        assert!(!cell.end_connected());

        cell.begin_connecting();
        assert!(!cell.end_connected());
        assert_eq!(cell.get(), SessionState::Connecting);

        cell.transition(SessionState::Connected);
        assert!(cell.end_connected());
        assert_eq!(cell.get(), SessionState::Disconnected);
        assert!(!cell.end_connected());
    }

    #[tokio::test]
    async fn test_transitions_are_observable() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();

        assert_eq!(cell.transition(SessionState::Connected), SessionState::Disconnected);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SessionState::Connected);
    }
}

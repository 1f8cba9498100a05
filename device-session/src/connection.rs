//! Boundary to the connection collaborator
//!
//! The session never touches sockets. A collaborator implementing
//! [`Connection`] opens the link, writes encoded commands, and reports what
//! happens through a stream of [`ConnectionEvent`]s that the session consumes
//! one at a time in arrival order.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ConnectionError;
use crate::message::{Command, IncomingMessage};

/// Link to a single device
///
/// `send` may be called concurrently from several tasks. Implementations must
/// not deliver events synchronously from inside `connect` or `send`; replies
/// go through the event channel.
pub trait Connection: Send + Sync {
    /// Start (or restart) connecting; completion is reported as an event
    fn connect(&self) -> Result<(), ConnectionError>;

    /// Write one command; the collaborator decides whether to queue or refuse
    /// while no link is open
    fn send(&self, command: &Command) -> Result<(), ConnectionError>;
}

/// Lifecycle and message events produced by a connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    /// Transport-level error; not proof of disconnection on its own
    Error(Value),
    Message(IncomingMessage),
}

pub type EventSender = mpsc::UnboundedSender<ConnectionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Create the channel a connection uses to report events to its session
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

//! # device-session
//!
//! Per-device session management for smart lights that speak a line-oriented,
//! id-correlated JSON protocol.
//!
//! A session sits between a connection (which owns the socket) and the host
//! (which wants attribute values and commands). It correlates replies with
//! requests, tracks the connection lifecycle, polls for attributes and
//! detects silent devices, and lets many concurrent blocking reads share a
//! single device query.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use device_session::{event_channel, DeviceInfo, DeviceSession, SessionConfig};
//!
//! let (events_tx, events_rx) = event_channel();
//! let connection = Arc::new(MyConnection::new(address, events_tx));
//!
//! let session = DeviceSession::builder(DeviceInfo::new("0x1", "color"), connection)
//!     .with_config(SessionConfig::blocking())
//!     .build()?;
//! session.start(events_rx)?;
//!
//! let attributes = session.get_attributes().await;
//! println!("power: {:?}", attributes.bool("power"));
//! ```
//!
//! # Architecture
//!
//! ```text
//! Connection ──events──▶ DeviceSession::run
//!                           │
//!                           ├── TransactionTable  (id → pending reply)
//!                           ├── AttributeStore    (snapshot + observers)
//!                           └── CoalescingReader  (shared blocking reads)
//!
//! PollScheduler / readers / callers ──▶ CommandDispatcher ──▶ Connection
//! ```

pub mod attributes;
pub mod builder;
pub mod config;
pub mod connection;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod message;
pub mod names;
pub mod polling;
pub mod reader;
pub mod registry;
pub mod session;
pub mod state;
pub mod transaction;

#[cfg(test)]
mod testing;

pub use builder::DeviceSessionBuilder;
pub use config::SessionConfig;
pub use connection::{event_channel, Connection, ConnectionEvent, EventReceiver, EventSender};
pub use device::DeviceInfo;
pub use dispatcher::CommandDispatcher;
pub use error::{ConnectionError, DeviceError, ReadFailure, Result, SessionError, TransactionError};
pub use message::{Command, IncomingMessage, Reply};
pub use names::DisplayNames;
pub use polling::{PollOutcome, PollScheduler};
pub use reader::CoalescingReader;
pub use registry::SessionRegistry;
pub use session::{DeviceSession, QUERY_METHOD};
pub use state::SessionState;
pub use transaction::{PendingReply, TransactionTable};

pub use attribute_store::{
    AttributeObserver, AttributeSchema, AttributeSnapshot, AttributeValue, PushPolicy,
};

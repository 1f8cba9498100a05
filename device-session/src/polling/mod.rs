//! Periodic attribute polling and staleness detection
//!
//! While a session is connected with a non-zero interval, a background task
//! ticks once per interval. Each tick either re-queries the device or, when
//! nothing has been heard for longer than the staleness threshold, declares
//! the device unreachable.

pub mod scheduler;

pub use scheduler::{is_stale, PollOutcome, PollScheduler, PollTarget};

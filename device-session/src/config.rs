//! Configuration types for the device-session crate
//!
//! This module defines the per-session configuration that controls polling
//! cadence, staleness detection, blocking reads and push notifications.
//! Durations are written as integer milliseconds when (de)serialized so the
//! structure can be embedded in a host platform's JSON configuration.

use attribute_store::PushPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SessionError;

/// Configuration for a DeviceSession
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Serve reads by querying the device instead of relying on pushes
    /// Default: false
    pub blocking: bool,

    /// Poll period while connected; zero disables periodic polling
    /// Default: 60 seconds
    #[serde(with = "duration_ms")]
    pub interval: Duration,

    /// Round-trip budget for a single query, also bounds blocking reads
    /// Default: 5 seconds
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    /// Report power attributes as off while the device is unreachable
    /// Default: false
    pub off_on_disconnect: bool,

    /// Verbose per-transaction logging
    /// Default: false
    pub log: bool,

    /// Push behavior for blocking sessions; non-blocking sessions always push
    /// Default: Suppress
    pub blocking_push: PushPolicy,

    /// Age after which an unanswered transaction is rejected
    /// Default: 60 seconds
    #[serde(with = "duration_ms")]
    pub transaction_max_age: Duration,

    /// Minimum time between attribute queries started by blocking reads
    /// Default: 1 second
    #[serde(with = "duration_ms")]
    pub share_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            blocking: false,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
            off_on_disconnect: false,
            log: false,
            blocking_push: PushPolicy::Suppress,
            transaction_max_age: Duration::from_secs(60),
            share_window: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    /// Create a new SessionConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull-oriented session: reads query the device, pushes are suppressed
    pub fn blocking() -> Self {
        Self {
            blocking: true,
            ..Default::default()
        }
    }

    /// Session that only queries on connect and on demand
    pub fn without_polling() -> Self {
        Self {
            interval: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn polling_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Longest silence tolerated before the device is presumed unreachable
    ///
    /// One poll period plus one round-trip timeout: a query issued at a tick
    /// must have been answered before the following tick's timeout elapses.
    pub fn staleness_threshold(&self) -> Duration {
        self.interval + self.timeout
    }

    /// How often the event loop sweeps expired transactions
    ///
    /// A quarter of the transaction max age, so an unanswered request fails
    /// at most a quarter late, whether or not the session is polling.
    pub fn sweep_period(&self) -> Duration {
        (self.transaction_max_age / 4).max(Duration::from_millis(1))
    }

    /// Push policy the attribute store should apply for this session
    pub fn push_policy(&self) -> PushPolicy {
        if self.blocking {
            self.blocking_push
        } else {
            PushPolicy::Always
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.timeout.is_zero() {
            return Err(SessionError::ConfigurationError(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.transaction_max_age.is_zero() {
            return Err(SessionError::ConfigurationError(
                "Transaction max age must be greater than 0".to_string(),
            ));
        }

        if let PushPolicy::RateLimited { min_interval_ms: 0 } = self.blocking_push {
            return Err(SessionError::ConfigurationError(
                "Rate-limited push window must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_off_on_disconnect(mut self, enabled: bool) -> Self {
        self.off_on_disconnect = enabled;
        self
    }

    pub fn with_verbose_logging(mut self, enabled: bool) -> Self {
        self.log = enabled;
        self
    }

    pub fn with_blocking_push(mut self, policy: PushPolicy) -> Self {
        self.blocking_push = policy;
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

//! Error types for the device-session crate.
//!
//! Transaction-level failures (one request failed or timed out) are kept
//! apart from session-level failures (the device is gone). None of them is
//! fatal: unknown reply ids are only logged, staleness surfaces as a state
//! change, and blocking reads fall back to the cached snapshot.

use serde_json::Value;
use std::time::Duration;

/// An explicit error payload returned by the device
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device error{}: {message}", .code.map(|c| format!(" {}", c)).unwrap_or_default())]
pub struct DeviceError {
    /// Numeric error code, when the device sent one
    pub code: Option<i64>,
    /// Human-readable message
    pub message: String,
}

impl DeviceError {
    /// Decode a device error payload
    ///
    /// Objects of the form `{"code": -1, "message": "..."}` are read field by
    /// field; any other payload is kept as its JSON text.
    pub fn from_payload(payload: &Value) -> Self {
        let code = payload.get("code").and_then(Value::as_i64);
        let message = match payload.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => match payload {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
        };
        Self { code, message }
    }
}

/// Failure of a single outstanding request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// The device answered with an error payload
    #[error("request {id} failed: {source}")]
    Device {
        id: u32,
        #[source]
        source: DeviceError,
    },

    /// No reply arrived before the transaction was swept
    #[error("request {id} timed out after {age:?}")]
    Timeout { id: u32, age: Duration },

    /// The command never reached the connection
    #[error("request {id} could not be sent: {reason}")]
    Send { id: u32, reason: String },

    /// The pending continuation was dropped without being settled
    #[error("request {id} was abandoned")]
    Abandoned { id: u32 },
}

impl TransactionError {
    /// The request identifier the failure belongs to
    pub fn id(&self) -> u32 {
        match self {
            TransactionError::Device { id, .. }
            | TransactionError::Timeout { id, .. }
            | TransactionError::Send { id, .. }
            | TransactionError::Abandoned { id } => *id,
        }
    }
}

/// Why a shared blocking read settled without fresh data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadFailure {
    /// The underlying attribute query failed
    #[error("attribute query failed: {0}")]
    Transaction(#[from] TransactionError),

    /// The session left the connected state while the query was in flight
    #[error("device disconnected while the query was in flight")]
    Disconnected,

    /// The shared query was dropped before settling
    #[error("shared query abandoned")]
    Abandoned,
}

/// Errors reported by the connection collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The collaborator refuses to send while no socket is open
    #[error("Not connected")]
    NotConnected,

    /// Transport-level failure
    #[error("I/O error: {0}")]
    Io(String),

    /// The collaborator has shut down for good
    #[error("Connection closed")]
    Closed,
}

/// Errors surfaced by session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A transaction with this identifier is already outstanding
    #[error("Duplicate transaction id: {0}")]
    DuplicateTransaction(u32),

    /// A request failed
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The connection collaborator reported an error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Convenience type alias for Results using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_error_from_object() {
        let error = DeviceError::from_payload(&json!({"code": -1, "message": "unsupported method"}));
        assert_eq!(error.code, Some(-1));
        assert_eq!(error.message, "unsupported method");
        assert_eq!(error.to_string(), "device error -1: unsupported method");
    }

    #[test]
    fn test_device_error_from_other_payloads() {
        let error = DeviceError::from_payload(&json!("client quota exceeded"));
        assert_eq!(error.code, None);
        assert_eq!(error.message, "client quota exceeded");
        assert_eq!(error.to_string(), "device error: client quota exceeded");

        let error = DeviceError::from_payload(&json!({"code": 5}));
        assert_eq!(error.code, Some(5));
        assert_eq!(error.message, r#"{"code":5}"#);
    }

    #[test]
    fn test_transaction_error_display() {
        let error = TransactionError::Timeout {
            id: 7,
            age: Duration::from_secs(61),
        };
        assert_eq!(error.to_string(), "request 7 timed out after 61s");
        assert_eq!(error.id(), 7);

        let error = TransactionError::Send {
            id: 3,
            reason: "Not connected".to_string(),
        };
        assert_eq!(error.to_string(), "request 3 could not be sent: Not connected");

        let error = TransactionError::Device {
            id: 9,
            source: DeviceError {
                code: Some(-5000),
                message: "general error".to_string(),
            },
        };
        assert_eq!(error.to_string(), "request 9 failed: device error -5000: general error");
    }

    #[test]
    fn test_error_conversion_from_transaction_error() {
        let error: SessionError = TransactionError::Abandoned { id: 4 }.into();
        match error {
            SessionError::Transaction(e) => assert_eq!(e.id(), 4),
            _ => panic!("Expected Transaction variant"),
        }
    }

    #[test]
    fn test_read_failure_wraps_transaction_error() {
        let failure: ReadFailure = TransactionError::Abandoned { id: 2 }.into();
        assert_eq!(failure.to_string(), "attribute query failed: request 2 was abandoned");
    }
}

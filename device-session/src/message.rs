//! Wire-level message shapes exchanged with the device
//!
//! Requests carry a numeric id, a method name and positional parameters:
//! ```json
//! {"id": 42, "method": "get_prop", "params": ["power", "bright"]}
//! ```
//!
//! Replies echo the id with either a positional result list or an error:
//! ```json
//! {"id": 42, "result": ["on", "50"]}
//! {"id": 43, "result": ["ok"]}
//! {"id": 44, "error": {"code": -1, "message": "unsupported method"}}
//! ```
//!
//! Anything else (for example unsolicited property notifications, which carry
//! no id) is treated as unrecognized and only logged by the session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeviceError;

/// Replies with at most this many result values are acknowledgements or
/// short answers, never a bulk attribute read
pub const MIN_ACK_LEN: usize = 3;

/// Outbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Request id used to correlate the reply
    pub id: u32,
    /// Method name to invoke
    pub method: String,
    /// Positional parameters
    pub params: Vec<Value>,
}

impl Command {
    pub fn new(id: u32, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Encode as a single protocol line terminated by `\r\n`
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push_str("\r\n");
        Ok(line)
    }
}

/// Inbound message, already decoded by the connection collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Id of the request this answers, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// Success payload (mutually exclusive with error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Value>>,
    /// Error payload (mutually exclusive with result)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// What an inbound message carries
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<'a> {
    /// Bare `["ok"]` acknowledgement
    Ack,
    /// Positional attribute values from a bulk read
    Attributes(&'a [Value]),
    /// Explicit device error
    Error(DeviceError),
    /// A result that is neither an ack nor a bulk read
    Other(&'a [Value]),
    /// No result and no error
    Unrecognized,
}

impl IncomingMessage {
    /// Successful reply carrying `result`
    pub fn reply(id: u32, result: Vec<Value>) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Single-element `["ok"]` acknowledgement
    pub fn ok(id: u32) -> Self {
        Self::reply(id, vec![Value::from("ok")])
    }

    /// Error reply carrying `payload`
    pub fn error(id: u32, payload: Value) -> Self {
        Self {
            id: Some(id),
            result: None,
            error: Some(payload),
        }
    }

    /// Decode one protocol line
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }

    /// The request id, treating the reserved id `0` as absent
    pub fn request_id(&self) -> Option<u32> {
        self.id.filter(|id| *id != 0)
    }

    pub fn classify(&self) -> Reply<'_> {
        match (&self.result, &self.error) {
            (Some(result), _) if is_ack(result) => Reply::Ack,
            (Some(result), _) if result.len() > MIN_ACK_LEN => Reply::Attributes(result),
            (_, Some(error)) => Reply::Error(DeviceError::from_payload(error)),
            (Some(result), None) => Reply::Other(result),
            (None, None) => Reply::Unrecognized,
        }
    }
}

fn is_ack(result: &[Value]) -> bool {
    matches!(result, [Value::String(ok)] if ok == "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_line_encoding() {
        let command = Command::new(7, "set_power", vec![json!("on"), json!("smooth"), json!(500)]);
        assert_eq!(
            command.to_line().unwrap(),
            "{\"id\":7,\"method\":\"set_power\",\"params\":[\"on\",\"smooth\",500]}\r\n"
        );
    }

    #[test]
    fn test_parse_reply_line() {
        let message = IncomingMessage::parse_line("{\"id\": 7, \"result\": [\"ok\"]}\r\n").unwrap();
        assert_eq!(message, IncomingMessage::ok(7));
        assert_eq!(message.classify(), Reply::Ack);
    }

    #[test]
    fn test_classify_bulk_read() {
        let message = IncomingMessage::reply(9, vec![json!("on"), json!("50"), json!("2700"), json!("0")]);
        match message.classify() {
            Reply::Attributes(values) => assert_eq!(values.len(), 4),
            other => panic!("Expected Attributes, got {:?}", other),
        }
    }

    #[test]
    fn test_short_results_are_not_bulk_reads() {
        let message = IncomingMessage::reply(9, vec![json!("on"), json!("50"), json!("2700")]);
        assert!(matches!(message.classify(), Reply::Other(values) if values.len() == 3));

        let message = IncomingMessage::reply(9, vec![json!("done")]);
        assert!(matches!(message.classify(), Reply::Other(_)));
    }

    #[test]
    fn test_classify_error() {
        let message = IncomingMessage::error(4, json!({"code": -1, "message": "unsupported method"}));
        match message.classify() {
            Reply::Error(error) => assert_eq!(error.message, "unsupported method"),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_notification_without_id_is_unrecognized() {
        let message =
            IncomingMessage::parse_line(r#"{"method": "props", "params": {"power": "off"}}"#).unwrap();
        assert_eq!(message.request_id(), None);
        assert_eq!(message.classify(), Reply::Unrecognized);
    }

    #[test]
    fn test_zero_id_is_treated_as_absent() {
        let message = IncomingMessage::ok(0);
        assert_eq!(message.request_id(), None);
    }
}

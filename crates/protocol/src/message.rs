//! Bus message shapes.
//!
//! The bus carries three kinds of frames: method call requests (carry a
//! serial and expect a reply), replies (correlated back by serial), and
//! broadcast signals (no serial, no reply). All addressing is by string
//! interface / object path / member name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method call sent to a named destination on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Serial used to correlate the reply.
    pub serial: u32,
    /// Interface the member belongs to.
    pub interface: String,
    /// Object path the call is addressed to.
    pub path: String,
    /// Method name to invoke.
    pub member: String,
    /// Positional arguments.
    pub args: Vec<Value>,
}

/// Reply to a method call, correlated by serial.
///
/// `result` and `error` are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// Serial of the request this reply answers.
    pub serial: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Bus-level error reply payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error name (e.g., "org.example.Error.Failed").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human-readable error message.
    pub message: String,
}

/// Unsolicited broadcast message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Interface the signal belongs to.
    pub interface: String,
    /// Object path the signal was emitted from.
    pub path: String,
    /// Signal name.
    pub member: String,
    /// Positional arguments.
    pub args: Vec<Value>,
}

impl Signal {
    /// First argument as a string, if present.
    ///
    /// Subscriptions may be scoped by this value (arg0 filtering).
    pub fn arg0_str(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }
}

/// Discriminated union of inbound bus messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Reply message (has `serial` field).
    Reply(Reply),
    /// Signal message (no `serial` field).
    Signal(Signal),
    /// Unknown message type (forward-compatible catch-all).
    Unknown(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_deserializes_by_serial() {
        let json = r#"{"serial": 7, "result": {"ok": true}}"#;
        let message: Message = serde_json::from_str(json).unwrap();

        match message {
            Message::Reply(reply) => {
                assert_eq!(reply.serial, 7);
                assert!(reply.result.is_some());
                assert!(reply.error.is_none());
            }
            _ => panic!("Expected Reply"),
        }
    }

    #[test]
    fn signal_deserializes_without_serial() {
        let json = r#"{
            "interface": "org.example.FileManager.MenuProvider",
            "path": "/org/example/FileManager/MenuProvider",
            "member": "ItemsAdded",
            "args": [["file:///tmp/sub"]]
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();

        match message {
            Message::Signal(signal) => {
                assert_eq!(signal.member, "ItemsAdded");
                assert_eq!(signal.args.len(), 1);
            }
            _ => panic!("Expected Signal"),
        }
    }

    #[test]
    fn arg0_str_reads_first_string_argument() {
        let signal = Signal {
            interface: "i".to_string(),
            path: "/p".to_string(),
            member: "MenuItemActivated".to_string(),
            args: vec![serde_json::json!("open-folder-abc")],
        };
        assert_eq!(signal.arg0_str(), Some("open-folder-abc"));

        let no_args = Signal {
            args: Vec::new(),
            ..signal
        };
        assert_eq!(no_args.arg0_str(), None);
    }

    #[test]
    fn error_reply_round_trips() {
        let reply = Reply {
            serial: 3,
            result: None,
            error: Some(ErrorPayload {
                name: Some("org.example.Error.Failed".to_string()),
                message: "provider rejected".to_string(),
            }),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["message"], "provider rejected");
    }
}

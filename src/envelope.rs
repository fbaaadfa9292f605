use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The minimal message unit exchanged over the connection.
///
/// Every envelope carries a `type` discriminator used to route it to
/// subscribers, plus an arbitrary JSON payload. Frames that fail to parse
/// or lack a string `type` field are discarded before reaching subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type discriminator, e.g. `"chat.message"`
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary payload; `null` when absent
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Create an envelope from a type and payload
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Parse an envelope from a text frame
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize the envelope to a text frame
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_valid_envelope() {
        let envelope =
            Envelope::from_text(r#"{"type":"chat.message","payload":{"text":"hi"}}"#).unwrap();
        assert_eq!(envelope.kind, "chat.message");
        assert_eq!(envelope.payload["text"], "hi");
    }

    #[test]
    fn test_missing_payload_defaults_to_null() {
        let envelope = Envelope::from_text(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(envelope.kind, "ping");
        assert_eq!(envelope.payload, Value::Null);
    }

    #[test]
    fn test_missing_type_is_rejected() {
        assert!(Envelope::from_text(r#"{"payload":{}}"#).is_err());
    }

    #[test]
    fn test_non_string_type_is_rejected() {
        assert!(Envelope::from_text(r#"{"type":42,"payload":{}}"#).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Envelope::from_text("not-json").is_err());
    }

    #[test]
    fn test_serialize_uses_type_key() {
        let envelope = Envelope::new("ping", Value::Null);
        let text = envelope.to_text().unwrap();
        assert_eq!(text, r#"{"type":"ping","payload":null}"#);
    }

    #[test]
    fn test_roundtrip() {
        let envelope = Envelope::new("order.update", json!({"id": 7, "status": "filled"}));
        let parsed = Envelope::from_text(&envelope.to_text().unwrap()).unwrap();
        assert_eq!(parsed, envelope);
    }
}

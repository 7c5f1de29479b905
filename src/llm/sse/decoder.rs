use std::fmt;

use serde_json::Value;

/// A data payload that is not valid JSON.
///
/// Carried to the consumer as an item of the stream rather than raised, so
/// that one bad frame does not abort the whole response.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedPayload {
    /// Event name the payload arrived under.
    pub event_name: String,
    /// The undecoded `data:` value.
    pub raw: String,
    /// Decoder message.
    pub reason: String,
}

impl fmt::Display for MalformedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed '{}' payload {:?}: {}",
            self.event_name, self.raw, self.reason
        )
    }
}

impl std::error::Error for MalformedPayload {}

pub fn decode_payload(event_name: &str, raw: &str) -> Result<Value, MalformedPayload> {
    serde_json::from_str(raw).map_err(|err| MalformedPayload {
        event_name: event_name.to_string(),
        raw: raw.to_string(),
        reason: err.to_string(),
    })
}

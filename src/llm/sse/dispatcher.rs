use serde_json::Value;

use crate::llm::response::MessageResponse;
use crate::llm::sse::classifier::{ClassifiedEvent, DONE_SENTINEL};
use crate::llm::sse::decoder::{MalformedPayload, decode_payload};

/// One value handed to the stream consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// Aggregated message built from a nested `message` object.
    Message(MessageResponse),
    /// Decoded payload forwarded as-is.
    Payload(Value),
    /// Payload that failed to decode.
    Malformed(MalformedPayload),
}

impl StreamItem {
    /// The payload `type` field, when this is a raw payload.
    pub fn payload_type(&self) -> Option<&str> {
        match self {
            Self::Payload(value) => value.get("type").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Incremental text carried by this item, for Anthropic
    /// `content_block_delta` payloads and OpenAI-style chunks.
    pub fn text_delta(&self) -> Option<&str> {
        let Self::Payload(value) = self else {
            return None;
        };
        if let Some(text) = value
            .get("delta")
            .and_then(|delta| delta.get("text"))
            .and_then(Value::as_str)
        {
            return Some(text);
        }
        value
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("delta"))
            .and_then(|delta| delta.get("content"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emission {
    /// Emit an aggregated message when the payload nests one, otherwise
    /// nothing.
    NestedMessage,
    /// Emit an aggregated message when the payload nests one, otherwise the
    /// raw payload.
    NestedMessageOrRaw,
    Raw,
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    event: &'static str,
    emission: Emission,
    terminal: bool,
}

const DISPATCH_TABLE: &[Rule] = &[
    Rule {
        event: "message_start",
        emission: Emission::NestedMessage,
        terminal: false,
    },
    Rule {
        event: "message_stop",
        emission: Emission::NestedMessageOrRaw,
        terminal: true,
    },
    Rule {
        event: "content_block_start",
        emission: Emission::Raw,
        terminal: false,
    },
    Rule {
        event: "content_block_delta",
        emission: Emission::Raw,
        terminal: false,
    },
    Rule {
        event: "message_delta",
        emission: Emission::Raw,
        terminal: false,
    },
    Rule {
        event: "message_other",
        emission: Emission::Raw,
        terminal: false,
    },
];

/// Unknown event names pass through untouched.
const DEFAULT_RULE: Rule = Rule {
    event: "*",
    emission: Emission::Raw,
    terminal: false,
};

fn rule_for(event_name: &str) -> &'static Rule {
    DISPATCH_TABLE
        .iter()
        .find(|rule| rule.event == event_name)
        .unwrap_or(&DEFAULT_RULE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    Idle,
    Streaming,
    Terminated,
}

/// Maps classified events to consumer items, one at a time.
#[derive(Debug, Default)]
pub struct Dispatcher {
    state: DispatchState,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == DispatchState::Terminated
    }

    /// Marks the arrival of the first byte.
    pub fn begin(&mut self) {
        if self.state == DispatchState::Idle {
            self.state = DispatchState::Streaming;
        }
    }

    /// Marks end-of-data from the transport.
    pub fn end(&mut self) {
        self.state = DispatchState::Terminated;
    }

    /// Applies the dispatch table to one event.
    ///
    /// Returns the item to deliver, if any. A terminal rule moves the
    /// dispatcher to [`DispatchState::Terminated`] after producing its item;
    /// from then on every call returns `None`.
    pub fn dispatch(&mut self, event: &ClassifiedEvent) -> Option<StreamItem> {
        if self.is_terminated() {
            return None;
        }
        self.begin();

        let rule = rule_for(&event.event_name);
        let item = match decode_payload(&event.event_name, &event.raw_data) {
            Ok(payload) => emit(rule.emission, event, payload),
            Err(malformed) if malformed.raw == DONE_SENTINEL => {
                tracing::debug!(event = %malformed.event_name, "SSE end-of-stream sentinel");
                Some(StreamItem::Malformed(malformed))
            }
            Err(malformed) => {
                tracing::warn!(
                    event = %malformed.event_name,
                    reason = %malformed.reason,
                    "undecodable SSE payload"
                );
                Some(StreamItem::Malformed(malformed))
            }
        };

        if rule.terminal {
            tracing::debug!(event = %event.event_name, "terminal SSE event");
            self.state = DispatchState::Terminated;
        }
        item
    }
}

fn emit(emission: Emission, event: &ClassifiedEvent, payload: Value) -> Option<StreamItem> {
    let nested = payload.get("message").filter(|message| message.is_object());

    match (emission, nested) {
        (Emission::NestedMessage | Emission::NestedMessageOrRaw, Some(message)) => {
            Some(match serde_json::from_value::<MessageResponse>(message.clone()) {
                Ok(response) => StreamItem::Message(response),
                Err(err) => StreamItem::Malformed(MalformedPayload {
                    event_name: event.event_name.clone(),
                    raw: event.raw_data.clone(),
                    reason: format!("nested message: {err}"),
                }),
            })
        }
        (Emission::NestedMessage, None) => None,
        (Emission::NestedMessageOrRaw | Emission::Raw, _) => Some(StreamItem::Payload(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, data: &str) -> ClassifiedEvent {
        ClassifiedEvent {
            event_name: name.to_string(),
            raw_data: data.to_string(),
        }
    }

    #[test]
    fn message_start_with_nested_message_emits_aggregate() {
        let mut dispatcher = Dispatcher::new();
        let item = dispatcher.dispatch(&event(
            "message_start",
            r#"{"type":"message_start","message":{"id":"m1","role":"assistant"}}"#,
        ));
        match item {
            Some(StreamItem::Message(message)) => {
                assert_eq!(message.id.as_deref(), Some("m1"));
                assert_eq!(message.role.as_deref(), Some("assistant"));
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert_eq!(dispatcher.state(), DispatchState::Streaming);
    }

    #[test]
    fn message_start_without_nested_message_is_swallowed() {
        let mut dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.dispatch(&event("message_start", r#"{"type":"message_start"}"#)), None);
        assert_eq!(
            dispatcher.dispatch(&event("message_start", r#"{"message":"not an object"}"#)),
            None
        );
        assert!(!dispatcher.is_terminated());
    }

    #[test]
    fn message_stop_without_message_emits_raw_and_terminates() {
        let mut dispatcher = Dispatcher::new();
        let item = dispatcher.dispatch(&event("message_stop", r#"{"type":"message_stop"}"#));
        assert_eq!(item, Some(StreamItem::Payload(json!({"type": "message_stop"}))));
        assert!(dispatcher.is_terminated());
    }

    #[test]
    fn message_stop_with_message_emits_aggregate_and_terminates() {
        let mut dispatcher = Dispatcher::new();
        let item = dispatcher.dispatch(&event("message_stop", r#"{"message":{"id":"m2"}}"#));
        assert!(matches!(item, Some(StreamItem::Message(ref m)) if m.id.as_deref() == Some("m2")));
        assert!(dispatcher.is_terminated());
    }

    #[test]
    fn raw_rows_and_unknown_events_pass_through() {
        let mut dispatcher = Dispatcher::new();
        for name in [
            "content_block_start",
            "content_block_delta",
            "message_delta",
            "message_other",
            "content_block_stop",
            "ping",
            "brand_new_event",
        ] {
            let item = dispatcher.dispatch(&event(name, r#"{"k":1}"#));
            assert_eq!(item, Some(StreamItem::Payload(json!({"k": 1}))), "event {name}");
        }
        assert!(!dispatcher.is_terminated());
    }

    #[test]
    fn malformed_stop_is_surfaced_then_terminates() {
        let mut dispatcher = Dispatcher::new();
        match dispatcher.dispatch(&event("message_stop", "[DONE]")) {
            Some(StreamItem::Malformed(malformed)) => assert_eq!(malformed.raw, "[DONE]"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(dispatcher.is_terminated());
    }

    #[test]
    fn nested_message_with_wrong_shape_is_malformed() {
        let mut dispatcher = Dispatcher::new();
        let item = dispatcher.dispatch(&event("message_start", r#"{"message":{"id":5}}"#));
        assert!(matches!(item, Some(StreamItem::Malformed(ref m)) if m.reason.starts_with("nested message")));
    }

    #[test]
    fn nothing_is_dispatched_after_termination() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.dispatch(&event("message_stop", "{}"));
        assert_eq!(dispatcher.dispatch(&event("content_block_delta", "{}")), None);

        let mut ended = Dispatcher::new();
        ended.begin();
        ended.end();
        assert_eq!(ended.dispatch(&event("message_other", "{}")), None);
    }

    #[test]
    fn text_delta_reads_both_wire_dialects() {
        let anthropic = StreamItem::Payload(json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "Hi"}
        }));
        let openai = StreamItem::Payload(json!({
            "choices": [{"delta": {"content": "there"}}]
        }));
        assert_eq!(anthropic.text_delta(), Some("Hi"));
        assert_eq!(anthropic.payload_type(), Some("content_block_delta"));
        assert_eq!(openai.text_delta(), Some("there"));
        assert_eq!(StreamItem::Payload(json!({"type": "ping"})).text_delta(), None);
    }
}

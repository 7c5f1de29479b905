/// Data value that ends a stream without a typed event.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Synthetic name for a `[DONE]` frame without an `event:` line.
pub const MESSAGE_STOP: &str = "message_stop";

/// Synthetic name for any other frame without an `event:` line.
pub const MESSAGE_OTHER: &str = "message_other";

/// One frame reduced to its event name and data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    pub event_name: String,
    pub raw_data: String,
}

/// Parses the header lines of one frame.
///
/// Only `event:` and `data:` lines are read; when several `data:` lines are
/// present the last one wins. Returns `None` for frames without data.
pub fn classify_frame(frame: &str) -> Option<ClassifiedEvent> {
    let mut event_name = String::new();
    let mut raw_data = String::new();

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event_name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            raw_data = value.trim().to_string();
        }
    }

    if raw_data.is_empty() {
        if !event_name.is_empty() {
            tracing::trace!(event = %event_name, "dropping SSE frame without data");
        }
        return None;
    }

    if event_name.is_empty() {
        event_name = if raw_data == DONE_SENTINEL {
            MESSAGE_STOP
        } else {
            MESSAGE_OTHER
        }
        .to_string();
    }

    Some(ClassifiedEvent {
        event_name,
        raw_data,
    })
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting as reported by either wire dialect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl Usage {
    pub fn input(&self) -> Option<u64> {
        self.input_tokens.or(self.prompt_tokens)
    }

    pub fn output(&self) -> Option<u64> {
        self.output_tokens.or(self.completion_tokens)
    }

    pub fn total(&self) -> Option<u64> {
        self.total_tokens.or_else(|| match (self.input(), self.output()) {
            (Some(input), Some(output)) => input.checked_add(output),
            _ => None,
        })
    }
}

/// A complete assistant message.
///
/// Covers both the Messages API shape (`content` blocks) and the
/// chat-completions shape (`choices`). Every field is optional so that
/// partial messages, such as the one nested in `message_start`, decode too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageResponse {
    pub id: Option<String>,
    pub object: Option<String>,
    pub created: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub role: Option<String>,
    pub content: Option<Vec<Value>>,
    pub choices: Option<Vec<Value>>,
    pub model: Option<String>,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: Option<Usage>,
    pub system_fingerprint: Option<String>,
}

impl MessageResponse {
    /// Content blocks, falling back to `choices` when there are none.
    pub fn content(&self) -> &[Value] {
        non_empty(&self.content)
            .or_else(|| non_empty(&self.choices))
            .unwrap_or_default()
    }

    /// Choices, falling back to content blocks when there are none.
    pub fn choices(&self) -> &[Value] {
        non_empty(&self.choices)
            .or_else(|| non_empty(&self.content))
            .unwrap_or_default()
    }

    /// Assistant text: joined `text` blocks, or the first choice's message.
    pub fn text(&self) -> Option<String> {
        if let Some(blocks) = non_empty(&self.content) {
            let text = blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<String>();
            if !text.is_empty() {
                return Some(text);
            }
        }
        non_empty(&self.choices)?
            .first()?
            .get("message")?
            .get("content")?
            .as_str()
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

fn non_empty(values: &Option<Vec<Value>>) -> Option<&[Value]> {
    values.as_deref().filter(|values| !values.is_empty())
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::error::ClientError;
use crate::llm::message::{ContentBlock, Message, Tool};
use crate::llm::provider::ClientConfig;

/// Top-level system prompt: a plain string or a list of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Builder for a Messages API request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl MessageRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            messages: Vec::new(),
            tools: Vec::new(),
            tool_choice: None,
            system: None,
            temperature: None,
            stop_sequences: Vec::new(),
            stream: false,
            metadata: None,
            top_k: None,
            top_p: None,
        }
    }

    /// Empty request using the configured model and token limit.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.model.clone(), config.max_tokens)
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn add_message(&mut self, message: Message) -> &mut Self {
        self.messages.push(message);
        self
    }

    pub fn with_tool(mut self, tool: impl Into<Tool>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: Value) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(SystemPrompt::Text(system.into()));
        self
    }

    /// Appends a system text block, converting a plain system string into
    /// its block form first.
    pub fn add_system_message(&mut self, text: impl Into<String>, cached: bool) -> &mut Self {
        let block = if cached {
            ContentBlock::cached_text(text)
        } else {
            ContentBlock::text(text)
        };
        let mut blocks = match self.system.take() {
            Some(SystemPrompt::Blocks(blocks)) => blocks,
            Some(SystemPrompt::Text(text)) => vec![ContentBlock::text(text)],
            None => Vec::new(),
        };
        blocks.push(block);
        self.system = Some(SystemPrompt::Blocks(blocks));
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_stop_sequences<I, S>(mut self, stop_sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_sequences = stop_sequences.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Serializes the request body. Fails when there are no messages.
    pub fn to_json(&self) -> Result<Value, ClientError> {
        if self.messages.is_empty() {
            return Err(ClientError::invalid_request(
                "At least one message is required",
            ));
        }
        Ok(serde_json::to_value(self)?)
    }
}

/// A `{role, content}` pair with plain-text content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

impl From<ChatMessage> for Message {
    fn from(message: ChatMessage) -> Self {
        Message::new(message.role, vec![ContentBlock::text(message.content)])
    }
}

/// A list of messages plus optional per-call overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// Loosely shaped chat input accepted by `Client::chat`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatInput {
    Text(String),
    Message(ChatMessage),
    Messages(Vec<ChatMessage>),
    Conversation(Conversation),
}

impl ChatInput {
    /// Builds a request, filling model and token limit from `config` unless
    /// the input overrides them.
    pub fn into_request(self, config: &ClientConfig) -> MessageRequest {
        let request = MessageRequest::from_config(config);
        match self {
            ChatInput::Text(text) => request.with_message(Message::user(text)),
            ChatInput::Message(message) => request.with_message(message.into()),
            ChatInput::Messages(messages) => {
                request.with_messages(messages.into_iter().map(Message::from))
            }
            ChatInput::Conversation(conversation) => {
                let mut request =
                    request.with_messages(conversation.messages.into_iter().map(Message::from));
                if let Some(model) = conversation.model {
                    request.model = model;
                }
                if let Some(max_tokens) = conversation.max_tokens {
                    request.max_tokens = max_tokens;
                }
                request.temperature = conversation.temperature;
                request.system = conversation.system.map(SystemPrompt::Text);
                request
            }
        }
    }
}

impl From<&str> for ChatInput {
    fn from(text: &str) -> Self {
        ChatInput::Text(text.to_string())
    }
}

impl From<String> for ChatInput {
    fn from(text: String) -> Self {
        ChatInput::Text(text)
    }
}

impl From<ChatMessage> for ChatInput {
    fn from(message: ChatMessage) -> Self {
        ChatInput::Message(message)
    }
}

impl From<Vec<ChatMessage>> for ChatInput {
    fn from(messages: Vec<ChatMessage>) -> Self {
        ChatInput::Messages(messages)
    }
}

impl From<Conversation> for ChatInput {
    fn from(conversation: Conversation) -> Self {
        ChatInput::Conversation(conversation)
    }
}

pub mod blocking;
pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod request;
pub mod response;
pub mod retry;
pub mod sse;

pub use blocking::BlockingClient;
pub use client::Client;
pub use error::ClientError;
pub use message::{
    CacheControl, ContentBlock, ImageSource, Message, Tool, ToolFunction, ToolParam, ToolParamType,
};
pub use provider::{AuthType, ClientConfig, Provider};
pub use request::{ChatInput, ChatMessage, Conversation, MessageRequest, SystemPrompt};
pub use response::{MessageResponse, Usage};
pub use retry::RetryPolicy;

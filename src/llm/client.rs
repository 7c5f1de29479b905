use std::error::Error;
use std::path::Path;

use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::llm::error::ClientError;
use crate::llm::message::{ContentBlock, ImageSource, Message};
use crate::llm::provider::{ClientConfig, Provider};
use crate::llm::request::{ChatInput, MessageRequest};
use crate::llm::response::MessageResponse;
use crate::llm::retry::{RetryPolicy, post_with_retry};
use crate::llm::sse::{StreamError, StreamItem, StreamOutcome, drive_async};

/// Async client for a Messages or chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_env(provider: Provider) -> Result<Self, ClientError> {
        Ok(Self::new(ClientConfig::from_env(provider)?))
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    pub fn format_request(&self, input: impl Into<ChatInput>) -> MessageRequest {
        input.into().into_request(&self.config)
    }

    pub async fn chat(&self, input: impl Into<ChatInput>) -> Result<MessageResponse, ClientError> {
        let request = self.format_request(input);
        self.send_message(&request).await
    }

    pub async fn send_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ClientError> {
        self.send_payload(&request.to_json()?).await
    }

    /// Posts an already serialized body and decodes the full response.
    pub async fn send_payload(&self, payload: &Value) -> Result<MessageResponse, ClientError> {
        let url = self.config.message_url();
        let headers = self.config.default_headers()?;
        let response = post_with_retry(&self.http, &url, &headers, payload, self.retry).await?;
        let body = response.text().await?;
        let message: MessageResponse = serde_json::from_str(&body)?;
        debug!(id = ?message.id, stop_reason = ?message.stop_reason, "message received");
        Ok(message)
    }

    /// Sends `request` with `stream: true` and hands every event to
    /// `consumer` as it arrives.
    ///
    /// The request is sent once. An `Err` from `consumer` cancels the stream
    /// and is returned as [`ClientError::Cancelled`].
    pub async fn stream_message<F, E>(
        &self,
        request: &MessageRequest,
        consumer: F,
    ) -> Result<StreamOutcome, ClientError>
    where
        F: FnMut(StreamItem) -> Result<(), E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let payload = request.clone().with_stream(true).to_json()?;
        let url = self.config.message_url();
        let mut headers = self.config.default_headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        debug!(url = %url, "opening event stream");
        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }

        drive_async(response.bytes_stream(), consumer)
            .await
            .map_err(stream_error)
    }

    pub async fn stream_chat<F, E>(
        &self,
        input: impl Into<ChatInput>,
        consumer: F,
    ) -> Result<StreamOutcome, ClientError>
    where
        F: FnMut(StreamItem) -> Result<(), E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let request = self.format_request(input);
        self.stream_message(&request, consumer).await
    }

    /// Sends one user message carrying `text` followed by the image at
    /// `image_path`.
    pub async fn send_message_with_image(
        &self,
        text: &str,
        image_path: impl AsRef<Path>,
    ) -> Result<MessageResponse, ClientError> {
        let image = ImageSource::from_path(image_path)?;
        let message = Message::user(text).with_content(ContentBlock::image(image));
        let request = MessageRequest::from_config(&self.config).with_message(message);
        self.send_message(&request).await
    }
}

pub(crate) fn stream_error<E>(err: StreamError<E>) -> ClientError
where
    E: Into<Box<dyn Error + Send + Sync>>,
{
    match err {
        StreamError::Transport(source) => ClientError::Transport { source },
        StreamError::Consumer(source) => ClientError::Cancelled {
            source: source.into(),
        },
    }
}

//! Blocking client for callers without an async runtime.

use std::error::Error;

use reqwest::header::{ACCEPT, HeaderValue};
use tracing::debug;

use crate::llm::client::stream_error;
use crate::llm::error::ClientError;
use crate::llm::provider::ClientConfig;
use crate::llm::request::MessageRequest;
use crate::llm::response::MessageResponse;
use crate::llm::sse::{ReadTransport, StreamItem, StreamOutcome, drive};

#[derive(Debug, Clone)]
pub struct BlockingClient {
    config: ClientConfig,
    http: reqwest::blocking::Client,
}

impl BlockingClient {
    /// Builds a client without a total request timeout, so long streams are
    /// not cut off.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder().timeout(None).build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn send_message(&self, request: &MessageRequest) -> Result<MessageResponse, ClientError> {
        let payload = request.to_json()?;
        let url = self.config.message_url();
        debug!(url = %url, "sending request");
        let response = self
            .http
            .post(&url)
            .headers(self.config.default_headers()?)
            .json(&payload)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ClientError::Api { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Streams `request` through the blocking read loop, reading the body in
    /// 1024-byte chunks.
    pub fn stream_message<F, E>(
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
        let response = self.http.post(&url).headers(headers).json(&payload).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }

        drive(ReadTransport::new(response), consumer).map_err(stream_error)
    }
}

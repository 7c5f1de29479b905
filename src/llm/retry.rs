use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::llm::error::ClientError;

const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Timeout and retry settings for non-streaming requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Option<Duration>,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            retries: 0,
            retry_delay_ms: 500,
        }
    }
}

/// Posts `payload`, retrying on 429, 5xx, and connect or timeout failures.
pub(crate) async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    payload: &Value,
    policy: RetryPolicy,
) -> Result<reqwest::Response, ClientError> {
    let max_attempts = policy.retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        let mut request = client.post(url).headers(headers.clone()).json(payload);
        if let Some(timeout) = policy.timeout {
            request = request.timeout(timeout);
        }

        debug!(url, attempt, "sending request");
        let failure = match request.send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let retryable = is_retryable_status(status);
                (ClientError::Api { status, body }, retryable)
            }
            Err(source) => {
                let retryable = is_retryable_request_error(&source);
                (ClientError::Request { source }, retryable)
            }
        };

        match failure {
            (err, true) if attempt + 1 < max_attempts => {
                let delay = retry_delay(attempt, policy.retry_delay_ms);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying request");
                sleep(delay).await;
                attempt += 1;
            }
            (err, _) => return Err(err),
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_request_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn retry_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(MAX_RETRY_DELAY_MS))
}

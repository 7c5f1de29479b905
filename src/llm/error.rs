use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;

use crate::llm::provider::Provider;

#[derive(Debug)]
pub enum ClientError {
    MissingApiKey {
        provider: Provider,
        key_env: &'static str,
    },
    InvalidRequest {
        reason: String,
    },
    InvalidHeader {
        name: &'static str,
        reason: String,
    },
    Request {
        source: reqwest::Error,
    },
    Api {
        status: StatusCode,
        body: String,
    },
    Transport {
        source: io::Error,
    },
    Decode {
        source: serde_json::Error,
    },
    Image {
        path: PathBuf,
        reason: String,
    },
    Cancelled {
        source: Box<dyn Error + Send + Sync>,
    },
}

impl ClientError {
    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey { key_env, .. } => {
                write!(f, "{key_env} is not set in the environment")
            }
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
            Self::InvalidHeader { name, reason } => {
                write!(f, "invalid value for header '{name}': {reason}")
            }
            Self::Request { source } => write!(f, "request failed: {source}"),
            Self::Api { status, body } => write!(f, "API error {status}: {body}"),
            Self::Transport { source } => write!(f, "error streaming message: {source}"),
            Self::Decode { source } => write!(f, "response is not valid JSON: {source}"),
            Self::Image { path, reason } => {
                write!(f, "cannot load image '{}': {reason}", path.display())
            }
            Self::Cancelled { source } => write!(f, "stream cancelled by consumer: {source}"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Request { source } => Some(source),
            Self::Transport { source } => Some(source),
            Self::Decode { source } => Some(source),
            Self::Cancelled { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(source: reqwest::Error) -> Self {
        Self::Request { source }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(source: serde_json::Error) -> Self {
        Self::Decode { source }
    }
}

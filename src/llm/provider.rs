use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::str::FromStr;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::llm::error::ClientError;

pub const CLAUDE_API_VERSION: &str = "2023-06-01";
pub const CLAUDE_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const CLAUDE_MODEL: &str = "claude-3-7-sonnet-latest";
pub const CLAUDE_MAX_TOKENS: u32 = 8192;
pub const CLAUDE_MESSAGE_PATH: &str = "/messages";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4o";
pub const OPENAI_MAX_TOKENS: u32 = 16384;
pub const OPENAI_MESSAGE_PATH: &str = "/chat/completions";

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_MODEL: &str = "deepseek-chat";
pub const DEEPSEEK_MAX_TOKENS: u32 = 8192;
pub const DEEPSEEK_MESSAGE_PATH: &str = "/chat/completions";

/// Beta flag raising the output limit of Claude 3.7 Sonnet to 128k tokens.
pub const OUTPUT_128K_BETA: &str = "output-128k-2025-02-19";
pub const OUTPUT_128K_MAX_TOKENS: u32 = 131_072;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    Openai,
    Deepseek,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Self::Anthropic, Self::Openai, Self::Deepseek];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Openai => "openai",
            Self::Deepseek => "deepseek",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Openai => "OPENAI_API_KEY",
            Self::Deepseek => "DEEPSEEK_API_KEY",
        }
    }

    pub fn is_api_key_present(self) -> bool {
        env::var(self.api_key_env())
            .ok()
            .is_some_and(|value| !value.trim().is_empty())
    }

    pub fn supported_values() -> String {
        Self::ALL
            .iter()
            .map(|provider| provider.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::Openai),
            "deepseek" => Ok(Self::Deepseek),
            _ => Err(format!(
                "Unsupported provider '{value}'. Supported values: {}.",
                Self::supported_values()
            )),
        }
    }
}

/// How the API key is presented to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// `x-api-key: <key>`
    XApiKey,
    /// `Authorization: Bearer <key>`
    Bearer,
}

impl AuthType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::XApiKey => "x-api-key",
            Self::Bearer => "bearer",
        }
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x-api-key" => Ok(Self::XApiKey),
            "bearer" => Ok(Self::Bearer),
            _ => Err(format!(
                "Unsupported auth type '{value}'. Supported values: x-api-key, bearer."
            )),
        }
    }
}

/// Endpoint, credentials and defaults for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_key: String,
    pub api_version: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub auth_type: AuthType,
    pub message_path: String,
    beta_features: BTreeMap<String, bool>,
}

impl ClientConfig {
    /// Anthropic defaults with the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        let mut config = Self {
            api_key: api_key.into(),
            api_version: String::new(),
            base_url: String::new(),
            model: String::new(),
            max_tokens: 0,
            auth_type: AuthType::XApiKey,
            message_path: String::new(),
            beta_features: BTreeMap::new(),
        };
        config.use_claude();
        config
    }

    pub fn for_provider(provider: Provider, api_key: impl Into<String>) -> Self {
        let mut config = Self::new(api_key);
        config.use_provider(provider);
        config
    }

    /// Reads the key from the provider's environment variable.
    pub fn from_env(provider: Provider) -> Result<Self, ClientError> {
        let key_env = provider.api_key_env();
        let api_key = env::var(key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ClientError::MissingApiKey { provider, key_env })?;
        Ok(Self::for_provider(provider, api_key))
    }

    pub fn use_provider(&mut self, provider: Provider) -> &mut Self {
        match provider {
            Provider::Anthropic => self.use_claude(),
            Provider::Openai => self.use_openai(),
            Provider::Deepseek => self.use_deepseek(),
        }
    }

    pub fn use_claude(&mut self) -> &mut Self {
        self.apply_preset(
            CLAUDE_BASE_URL,
            CLAUDE_MODEL,
            CLAUDE_MAX_TOKENS,
            AuthType::XApiKey,
            CLAUDE_MESSAGE_PATH,
        );
        self.beta_features = BTreeMap::from([(OUTPUT_128K_BETA.to_string(), false)]);
        self
    }

    pub fn use_openai(&mut self) -> &mut Self {
        self.apply_preset(
            OPENAI_BASE_URL,
            OPENAI_MODEL,
            OPENAI_MAX_TOKENS,
            AuthType::Bearer,
            OPENAI_MESSAGE_PATH,
        );
        self
    }

    pub fn use_deepseek(&mut self) -> &mut Self {
        self.apply_preset(
            DEEPSEEK_BASE_URL,
            DEEPSEEK_MODEL,
            DEEPSEEK_MAX_TOKENS,
            AuthType::Bearer,
            DEEPSEEK_MESSAGE_PATH,
        );
        self
    }

    fn apply_preset(
        &mut self,
        base_url: &str,
        model: &str,
        max_tokens: u32,
        auth_type: AuthType,
        message_path: &str,
    ) {
        // Only the Messages API reads the version header; the other presets
        // send the same value.
        self.api_version = CLAUDE_API_VERSION.to_string();
        self.base_url = base_url.to_string();
        self.model = model.to_string();
        self.max_tokens = max_tokens;
        self.auth_type = auth_type;
        self.message_path = message_path.to_string();
        self.beta_features.clear();
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    pub fn with_message_path(mut self, message_path: impl Into<String>) -> Self {
        self.message_path = message_path.into();
        self
    }

    pub fn beta_features(&self) -> &BTreeMap<String, bool> {
        &self.beta_features
    }

    /// Turns on a beta feature the current preset knows about. Unknown names
    /// are ignored.
    pub fn enable_beta_feature(&mut self, name: &str) -> &mut Self {
        if let Some(enabled) = self.beta_features.get_mut(name) {
            *enabled = true;
        }
        self
    }

    pub fn disable_beta_feature(&mut self, name: &str) -> &mut Self {
        if let Some(enabled) = self.beta_features.get_mut(name) {
            *enabled = false;
        }
        self
    }

    /// Merges `features` into the known set, adding new names.
    pub fn set_beta_features<I, K>(&mut self, features: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        self.beta_features
            .extend(features.into_iter().map(|(name, enabled)| (name.into(), enabled)));
        self
    }

    pub fn is_beta_feature_enabled(&self, name: &str) -> bool {
        self.beta_features.get(name).copied().unwrap_or(false)
    }

    pub fn enable_128k_output(&mut self) -> &mut Self {
        self.enable_beta_feature(OUTPUT_128K_BETA)
    }

    pub fn enable_128k_output_with_tokens(&mut self, max_tokens: Option<u32>) -> &mut Self {
        self.enable_beta_feature(OUTPUT_128K_BETA);
        self.max_tokens = max_tokens.unwrap_or(OUTPUT_128K_MAX_TOKENS);
        self
    }

    pub fn message_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.message_path)
    }

    /// Headers sent with every request.
    pub fn default_headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", header_value("anthropic-version", &self.api_version)?);

        match self.auth_type {
            AuthType::XApiKey => {
                let mut value = header_value("x-api-key", &self.api_key)?;
                value.set_sensitive(true);
                headers.insert("x-api-key", value);
            }
            AuthType::Bearer => {
                let mut value =
                    header_value("authorization", &format!("Bearer {}", self.api_key))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }

        let enabled = self
            .beta_features
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        if !enabled.is_empty() {
            headers.insert("anthropic-beta", header_value("anthropic-beta", &enabled.join(","))?);
        }
        Ok(headers)
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value).map_err(|err| ClientError::InvalidHeader {
        name,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_claude_preset() {
        let config = ClientConfig::new("test-api-key");
        assert_eq!(config.api_key, "test-api-key");
        assert_eq!(config.api_version, CLAUDE_API_VERSION);
        assert_eq!(config.base_url, CLAUDE_BASE_URL);
        assert_eq!(config.model, CLAUDE_MODEL);
        assert_eq!(config.max_tokens, 8192);
        assert_eq!(config.auth_type, AuthType::XApiKey);
        assert_eq!(config.message_path, "/messages");
        assert!(!config.is_beta_feature_enabled(OUTPUT_128K_BETA));
        assert_eq!(config.message_url(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn provider_presets_switch_endpoint_and_auth() {
        let mut config = ClientConfig::new("k");
        config.use_openai();
        assert_eq!(config.message_url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(config.auth_type, AuthType::Bearer);
        assert_eq!(config.max_tokens, 16384);
        assert!(config.beta_features().is_empty());

        let deepseek = ClientConfig::for_provider(Provider::Deepseek, "k");
        assert_eq!(deepseek.message_url(), "https://api.deepseek.com/chat/completions");
        assert_eq!(deepseek.model, "deepseek-chat");

        config.use_claude();
        assert_eq!(config.beta_features().len(), 1);
    }

    #[test]
    fn message_url_trims_trailing_slash() {
        let config = ClientConfig::new("k").with_base_url("http://localhost:8080/v1/");
        assert_eq!(config.message_url(), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn only_known_beta_features_can_be_toggled() {
        let mut config = ClientConfig::new("k");
        config.enable_beta_feature("made-up");
        assert!(!config.is_beta_feature_enabled("made-up"));

        config.enable_128k_output_with_tokens(None);
        assert!(config.is_beta_feature_enabled(OUTPUT_128K_BETA));
        assert_eq!(config.max_tokens, OUTPUT_128K_MAX_TOKENS);

        config.disable_beta_feature(OUTPUT_128K_BETA);
        assert!(!config.is_beta_feature_enabled(OUTPUT_128K_BETA));

        config.set_beta_features([("made-up", true)]);
        assert!(config.is_beta_feature_enabled("made-up"));
    }

    #[test]
    fn headers_follow_auth_type_and_beta_features() {
        let mut config = ClientConfig::new("secret");
        config.enable_128k_output();
        let headers = config.default_headers().unwrap();
        assert_eq!(headers["x-api-key"], "secret");
        assert_eq!(headers["anthropic-version"], CLAUDE_API_VERSION);
        assert_eq!(headers["anthropic-beta"], OUTPUT_128K_BETA);
        assert!(headers.get(AUTHORIZATION).is_none());

        let bearer = ClientConfig::for_provider(Provider::Openai, "secret")
            .default_headers()
            .unwrap();
        assert_eq!(bearer[AUTHORIZATION], "Bearer secret");
        assert!(bearer.get("x-api-key").is_none());
        assert!(bearer.get("anthropic-beta").is_none());
    }

    #[test]
    fn invalid_key_is_reported_as_header_error() {
        let err = ClientConfig::new("bad\nkey").default_headers().unwrap_err();
        assert!(matches!(err, ClientError::InvalidHeader { name: "x-api-key", .. }));
    }

    #[test]
    fn provider_parsing_lists_supported_values() {
        assert_eq!("Claude".parse::<Provider>(), Ok(Provider::Anthropic));
        assert_eq!(
            "bad".parse::<Provider>(),
            Err("Unsupported provider 'bad'. Supported values: anthropic, openai, deepseek.".to_string())
        );
    }
}

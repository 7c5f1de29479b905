use std::env;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use owo_colors::{OwoColorize, Stream};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{self, ProfileConfig};
use crate::llm::sse::StreamItem;
use crate::llm::{
    Client, ClientConfig, ContentBlock, ImageSource, Message, MessageRequest, Provider,
    RetryPolicy, Usage,
};
use crate::logging;

pub const ABOUT: &str = "Send a prompt and print the answer";

/// Shown under `mpchat ask --help` and `mpask --help`; `mpask` takes the same
/// arguments as `mpchat ask`.
pub const HELP_EXAMPLES: &str = "Examples:\n  mpask --model claude-3-7-sonnet-latest \"2+2?\"\n  mpchat ask --image diagram.png \"What does this show?\"\n  echo \"Summarize this\" | mpask --provider openai --stream\n  mpask --profile fast --stream --show-usage \"Write a haiku\"";

const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    fn as_str(self) -> &'static str {
        match self {
            OutputMode::Text => "text",
            OutputMode::Json => "json",
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct AskArgs {
    /// Prompt text. Read from stdin when omitted.
    prompt: Option<String>,
    /// anthropic, openai or deepseek [env: MPCHAT_PROVIDER]
    #[arg(long)]
    provider: Option<String>,
    /// Model name; defaults to the provider preset [env: MPCHAT_MODEL]
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    system: Option<String>,
    /// [env: MPCHAT_TEMPERATURE]
    #[arg(long)]
    temperature: Option<f32>,
    /// [env: MPCHAT_MAX_TOKENS]
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Request timeout in seconds [env: MPCHAT_TIMEOUT]
    #[arg(long)]
    timeout: Option<u64>,
    /// [env: MPCHAT_RETRIES]
    #[arg(long)]
    retries: Option<u32>,
    /// Base retry delay in milliseconds [env: MPCHAT_RETRY_DELAY]
    #[arg(long)]
    retry_delay: Option<u64>,
    /// Override the provider endpoint [env: MPCHAT_BASE_URL]
    #[arg(long)]
    base_url: Option<String>,
    /// Profile name from the config file
    #[arg(long)]
    profile: Option<String>,
    /// Attach an image to the prompt
    #[arg(long)]
    image: Option<PathBuf>,
    /// Print text as it streams in
    #[arg(long)]
    stream: bool,
    /// Print the request instead of sending it
    #[arg(long)]
    dry_run: bool,
    /// Shorthand for --output json
    #[arg(long)]
    json: bool,
    #[arg(long, value_enum)]
    output: Option<OutputMode>,
    /// Print token usage and latency on stderr
    #[arg(long)]
    show_usage: bool,
    #[arg(short, long)]
    verbose: bool,
    /// Only fatal errors reach stderr
    #[arg(short, long)]
    quiet: bool,
    /// Print version and build metadata
    #[arg(long)]
    version: bool,
}

#[derive(Debug)]
struct AskSettings {
    provider: Provider,
    model: String,
    system: Option<String>,
    temperature: Option<f32>,
    max_tokens: u32,
    timeout_secs: Option<u64>,
    retries: u32,
    retry_delay_ms: u64,
    base_url: Option<String>,
    output: OutputMode,
    stream: bool,
    show_usage: bool,
}

impl AskSettings {
    /// CLI flag, then environment, then profile, then provider preset.
    fn resolve(args: &AskArgs, profile: &ProfileConfig) -> Result<Self, String> {
        let provider = match args.provider.as_deref() {
            Some(value) => parse_provider("--provider", value)?,
            None => match non_empty_env("MPCHAT_PROVIDER") {
                Some(value) => parse_provider("MPCHAT_PROVIDER", &value)?,
                None => profile.provider()?.unwrap_or(Provider::Anthropic),
            },
        };
        let preset = ClientConfig::for_provider(provider, "");

        let model = args
            .model
            .clone()
            .or_else(|| non_empty_env("MPCHAT_MODEL"))
            .or_else(|| profile.model.clone())
            .unwrap_or(preset.model);
        let max_tokens = pick(args.max_tokens, "MPCHAT_MAX_TOKENS", profile.max_tokens)?
            .unwrap_or(preset.max_tokens);
        let base_url = args
            .base_url
            .clone()
            .or_else(|| non_empty_env("MPCHAT_BASE_URL"))
            .or_else(|| profile.base_url.clone());

        let output = if args.json {
            OutputMode::Json
        } else {
            match (args.output, profile.output.as_deref()) {
                (Some(output), _) => output,
                (None, Some("json")) => OutputMode::Json,
                _ => OutputMode::Text,
            }
        };

        Ok(Self {
            provider,
            model,
            system: args.system.clone().or_else(|| profile.system.clone()),
            temperature: pick(args.temperature, "MPCHAT_TEMPERATURE", profile.temperature)?,
            max_tokens,
            timeout_secs: pick(args.timeout, "MPCHAT_TIMEOUT", profile.timeout)?,
            retries: pick(args.retries, "MPCHAT_RETRIES", profile.retries)?
                .unwrap_or(DEFAULT_RETRIES),
            retry_delay_ms: pick(args.retry_delay, "MPCHAT_RETRY_DELAY", profile.retry_delay)?
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            base_url,
            output,
            stream: args.stream || profile.stream.unwrap_or(false),
            show_usage: args.show_usage || profile.show_usage.unwrap_or(false),
        })
    }

    fn client_config(&self, api_key: String) -> ClientConfig {
        let mut config = ClientConfig::for_provider(self.provider, api_key)
            .with_model(self.model.clone())
            .with_max_tokens(self.max_tokens);
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        config
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.timeout_secs.map(Duration::from_secs),
            retries: self.retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

pub fn version_text() -> String {
    format!(
        "{} {}\ncommit: {}\nbuilt: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("MPCHAT_GIT_SHA"),
        env!("MPCHAT_BUILD_TS"),
    )
}

pub async fn run(args: AskArgs) -> Result<(), String> {
    if args.version {
        println!("{}", version_text());
        return Ok(());
    }
    logging::init_tracing(logging::default_level(args.verbose, args.quiet));

    let profile = match args.profile.as_deref() {
        Some(name) => config::load_profile(name)?,
        None => ProfileConfig::default(),
    };
    let settings = AskSettings::resolve(&args, &profile)?;
    let prompt = read_prompt(args.prompt.as_deref())?;
    debug!(
        provider = settings.provider.as_str(),
        model = %settings.model,
        api_key_present = settings.provider.is_api_key_present(),
        "resolved ask settings"
    );

    let mut message = Message::user(prompt);
    if let Some(path) = &args.image {
        let image = ImageSource::from_path(path).map_err(|err| err.to_string())?;
        message.add_content(ContentBlock::image(image));
    }
    let mut request = MessageRequest::new(settings.model.clone(), settings.max_tokens)
        .with_message(message)
        .with_stream(settings.stream);
    if let Some(system) = &settings.system {
        request = request.with_system(system.clone());
    }
    if let Some(temperature) = settings.temperature {
        request = request.with_temperature(temperature);
    }

    if args.dry_run {
        let config = settings.client_config(String::new());
        let body = request.to_json().map_err(|err| err.to_string())?;
        print_json(&dry_run_report(&settings, &config, body))?;
        if settings.show_usage && !args.quiet {
            report_usage(None, Duration::ZERO, true);
        }
        return Ok(());
    }

    let key_env = settings.provider.api_key_env();
    let api_key = non_empty_env(key_env)
        .ok_or_else(|| format!("{key_env} is not set in the environment"))?;
    let client = Client::new(settings.client_config(api_key)).with_retry_policy(settings.retry_policy());

    let started = Instant::now();
    let (content, stop_reason, usage) = if settings.stream {
        stream_answer(&client, &request, settings.output).await?
    } else {
        let response = client
            .send_message(&request)
            .await
            .map_err(|err| err.to_string())?;
        let content = response
            .text()
            .ok_or_else(|| "Provider returned an empty response.".to_string())?;
        (content, response.stop_reason, response.usage)
    };
    let latency = started.elapsed();

    match settings.output {
        OutputMode::Text if settings.stream => println!(),
        OutputMode::Text => println!("{content}"),
        OutputMode::Json => print_json(&json!({
            "provider": settings.provider.as_str(),
            "model": settings.model,
            "content": content,
            "stop_reason": stop_reason,
            "usage": usage,
            "latency_ms": latency.as_millis() as u64,
        }))?,
    }

    if settings.show_usage && !args.quiet {
        report_usage(usage.as_ref(), latency, false);
    }
    Ok(())
}

/// Streams the answer, echoing text deltas in text mode. Returns the joined
/// text, the stop reason and the usage counters seen on the way.
async fn stream_answer(
    client: &Client,
    request: &MessageRequest,
    output: OutputMode,
) -> Result<(String, Option<String>, Option<Usage>), String> {
    let mut content = String::new();
    let mut stop_reason = None;
    let mut usage = Usage::default();
    let mut stdout = io::stdout();

    let outcome = client
        .stream_message(request, |item| -> io::Result<()> {
            match &item {
                StreamItem::Message(message) => {
                    if let Some(start) = &message.usage {
                        usage.input_tokens = start.input_tokens.or(usage.input_tokens);
                        usage.output_tokens = start.output_tokens.or(usage.output_tokens);
                    }
                }
                StreamItem::Payload(payload) => {
                    if let Some(reason) = payload
                        .pointer("/delta/stop_reason")
                        .or_else(|| payload.pointer("/choices/0/finish_reason"))
                        .and_then(Value::as_str)
                    {
                        stop_reason = Some(reason.to_string());
                    }
                    if let Some(delta) = payload
                        .get("usage")
                        .and_then(|value| serde_json::from_value::<Usage>(value.clone()).ok())
                    {
                        merge_usage(&mut usage, delta);
                    }
                }
                StreamItem::Malformed(_) => {}
            }
            if let Some(text) = item.text_delta() {
                content.push_str(text);
                if output == OutputMode::Text {
                    stdout.write_all(text.as_bytes())?;
                    stdout.flush()?;
                }
            }
            Ok(())
        })
        .await
        .map_err(|err| err.to_string())?;
    debug!(?outcome, "stream finished");

    let usage = (usage != Usage::default()).then_some(usage);
    Ok((content, stop_reason, usage))
}

fn merge_usage(usage: &mut Usage, delta: Usage) {
    usage.input_tokens = delta.input_tokens.or(usage.input_tokens);
    usage.output_tokens = delta.output_tokens.or(usage.output_tokens);
    usage.prompt_tokens = delta.prompt_tokens.or(usage.prompt_tokens);
    usage.completion_tokens = delta.completion_tokens.or(usage.completion_tokens);
    usage.total_tokens = delta.total_tokens.or(usage.total_tokens);
}

fn dry_run_report(settings: &AskSettings, config: &ClientConfig, body: Value) -> Value {
    json!({
        "dry_run": true,
        "provider": settings.provider.as_str(),
        "model": settings.model,
        "url": config.message_url(),
        "output": settings.output.as_str(),
        "stream": settings.stream,
        "request": {
            "temperature": settings.temperature,
            "max_tokens": settings.max_tokens,
            "timeout_secs": settings.timeout_secs,
            "retries": settings.retries,
            "retry_delay_ms": settings.retry_delay_ms,
        },
        "body": body,
    })
}

fn report_usage(usage: Option<&Usage>, latency: Duration, dry_run: bool) {
    let line = match usage {
        _ if dry_run => "usage: unavailable latency_ms=0 (dry-run)".to_string(),
        Some(usage) => format!(
            "usage: input={} output={} total={} latency_ms={}",
            count(usage.input()),
            count(usage.output()),
            count(usage.total()),
            latency.as_millis()
        ),
        None => format!("usage: unavailable latency_ms={}", latency.as_millis()),
    };
    eprintln!("{}", line.if_supports_color(Stream::Stderr, |text| text.dimmed()));
}

fn count(value: Option<u64>) -> String {
    value.map_or_else(|| "?".to_string(), |value| value.to_string())
}

fn print_json(value: &Value) -> Result<(), String> {
    let text = serde_json::to_string(value).map_err(|err| err.to_string())?;
    println!("{text}");
    Ok(())
}

fn read_prompt(argument: Option<&str>) -> Result<String, String> {
    if let Some(prompt) = argument.filter(|prompt| !prompt.trim().is_empty()) {
        return Ok(prompt.to_string());
    }

    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err("No prompt provided. Pass it as an argument or pipe it on stdin.".to_string());
    }
    let mut prompt = String::new();
    stdin
        .read_to_string(&mut prompt)
        .map_err(|err| format!("Failed to read prompt from stdin: {err}"))?;
    let prompt = prompt.trim_end_matches(['\n', '\r']);
    if prompt.trim().is_empty() {
        return Err("No prompt provided. Pass it as an argument or pipe it on stdin.".to_string());
    }
    Ok(prompt.to_string())
}

fn parse_provider(source: &str, value: &str) -> Result<Provider, String> {
    Provider::from_str(value).map_err(|_| {
        format!(
            "Invalid {source} '{value}'. Supported values: {}.",
            Provider::supported_values()
        )
    })
}

/// Flag value, else the parsed environment variable, else the profile value.
fn pick<T: FromStr>(flag: Option<T>, env_name: &str, profile: Option<T>) -> Result<Option<T>, String> {
    if flag.is_some() {
        return Ok(flag);
    }
    match non_empty_env(env_name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("Invalid {env_name} '{raw}'.")),
        None => Ok(profile),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

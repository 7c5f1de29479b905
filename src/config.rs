use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::Provider;

/// One `[profiles.<name>]` table. Every key is optional.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay: Option<u64>,
    pub base_url: Option<String>,
    pub output: Option<String>,
    pub stream: Option<bool>,
    pub show_usage: Option<bool>,
}

impl ProfileConfig {
    pub fn provider(&self) -> Result<Option<Provider>, String> {
        self.provider
            .as_deref()
            .map(|value| {
                value.parse::<Provider>().map_err(|_| {
                    format!(
                        "Invalid profile provider '{value}'. Supported values: {}.",
                        Provider::supported_values()
                    )
                })
            })
            .transpose()
    }

    fn check(&self) -> Result<(), String> {
        self.provider()?;
        if let Some(output) = self.output.as_deref() {
            if !matches!(output, "text" | "json") {
                return Err(format!(
                    "Invalid profile output '{output}'. Supported values: text, json."
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    profiles: Option<HashMap<String, ProfileConfig>>,
}

/// Loads and validates a named profile.
pub fn load_profile(name: &str) -> Result<ProfileConfig, String> {
    let (path, config) = read_config()?;
    let profiles = config.profiles.ok_or_else(|| {
        format!(
            "Config file '{}' does not contain a [profiles] section.",
            path.display()
        )
    })?;

    let profile = profiles.get(name).cloned().ok_or_else(|| {
        format!(
            "Profile '{}' not found in config file '{}'.",
            name,
            path.display()
        )
    })?;
    profile.check()?;
    Ok(profile)
}

/// Result of `validate_config`: the file that was read and the profiles that
/// passed, in name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigReport {
    pub path: PathBuf,
    pub profiles: Vec<String>,
}

/// Parses the config file and checks every profile, or only `profile` when
/// one is named.
pub fn validate_config(profile: Option<&str>) -> Result<ConfigReport, String> {
    if let Some(name) = profile {
        load_profile(name)?;
        return Ok(ConfigReport {
            path: config_path()?,
            profiles: vec![name.to_string()],
        });
    }

    let (path, config) = read_config()?;
    check_profiles(config).map(|profiles| ConfigReport { path, profiles })
}

fn check_profiles(config: ConfigFile) -> Result<Vec<String>, String> {
    let mut profiles = config.profiles.unwrap_or_default().into_iter().collect::<Vec<_>>();
    profiles.sort_by(|a, b| a.0.cmp(&b.0));
    profiles
        .into_iter()
        .map(|(name, profile)| match profile.check() {
            Ok(()) => Ok(name),
            Err(err) => Err(format!("Profile '{name}': {err}")),
        })
        .collect()
}

fn read_config() -> Result<(PathBuf, ConfigFile), String> {
    let path = config_path()?;
    let raw = fs::read_to_string(&path)
        .map_err(|err| format!("Failed to read config file '{}': {err}", path.display()))?;
    let config = toml::from_str(&raw)
        .map_err(|err| format!("Failed to parse config file '{}': {err}", path.display()))?;
    Ok((path, config))
}

/// `MPCHAT_CONFIG`, then `$XDG_CONFIG_HOME/mpchat/config.toml`, then
/// `~/.config/mpchat/config.toml`.
pub fn config_path() -> Result<PathBuf, String> {
    if let Some(path) = non_empty_env("MPCHAT_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    if let Some(xdg) = non_empty_env("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("mpchat").join("config.toml"));
    }

    let home = non_empty_env("HOME").ok_or_else(|| {
        "Cannot resolve config path: set MPCHAT_CONFIG or HOME/XDG_CONFIG_HOME.".to_string()
    })?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("mpchat")
        .join("config.toml"))
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ConfigFile {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn profiles_parse_from_toml() {
        let config = parse(
            "[profiles.fast]\nprovider = \"deepseek\"\nmodel = \"deepseek-chat\"\ntemperature = 0.3\nstream = true\n",
        );
        let profile = &config.profiles.unwrap()["fast"];
        assert_eq!(profile.provider().unwrap(), Some(Provider::Deepseek));
        assert_eq!(profile.model.as_deref(), Some("deepseek-chat"));
        assert_eq!(profile.stream, Some(true));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let profile = ProfileConfig {
            provider: Some("fireworks".to_string()),
            ..ProfileConfig::default()
        };
        let err = profile.check().unwrap_err();
        assert!(err.starts_with("Invalid profile provider 'fireworks'"));
    }

    #[test]
    fn unknown_output_is_rejected() {
        let profile = ProfileConfig {
            output: Some("yaml".to_string()),
            ..ProfileConfig::default()
        };
        assert!(profile.check().unwrap_err().contains("Invalid profile output 'yaml'"));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let result = toml::from_str::<ConfigFile>("[profiles.x]\nmodle = \"typo\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn profiles_are_checked_in_name_order() {
        let names = check_profiles(parse(
            "[profiles.zeta]\nprovider = \"openai\"\n\n[profiles.alpha]\noutput = \"json\"\n",
        ))
        .unwrap();
        assert_eq!(names, ["alpha", "zeta"]);

        let err = check_profiles(parse("[profiles.ok]\n\n[profiles.bad]\noutput = \"yaml\"\n")).unwrap_err();
        assert!(err.starts_with("Profile 'bad': "));
    }
}

use clap::{Subcommand, ValueEnum};
use serde_json::{Value, json};

use crate::app::Runtime;
use crate::config::{
    ProfileConfig, ensure_profile, profile_mut, profile_ref, save_config, validate_url,
};
use crate::errors::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Initialize config file and profile
    Init {
        #[arg(long = "api-url")]
        api_url: Option<String>,
        /// Default persona for `ask` and `chat`
        #[arg(long)]
        username: Option<String>,
    },
    /// Read a config key from the active profile
    Get { key: ConfigKey },
    /// Set a config key on the active profile
    Set { key: ConfigKey, value: String },
    /// List all profiles
    Profiles,
    /// Switch active profile
    Use { profile: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigKey {
    #[value(name = "apiUrl")]
    ApiUrl,
    #[value(name = "username")]
    Username,
    #[value(name = "multiMessage")]
    MultiMessage,
    #[value(name = "initialDelayMs")]
    InitialDelayMs,
    #[value(name = "tokenDelayMs")]
    TokenDelayMs,
    #[value(name = "segmentPauseMs")]
    SegmentPauseMs,
}

impl ConfigKey {
    fn name(self) -> &'static str {
        match self {
            ConfigKey::ApiUrl => "apiUrl",
            ConfigKey::Username => "username",
            ConfigKey::MultiMessage => "multiMessage",
            ConfigKey::InitialDelayMs => "initialDelayMs",
            ConfigKey::TokenDelayMs => "tokenDelayMs",
            ConfigKey::SegmentPauseMs => "segmentPauseMs",
        }
    }
}

pub async fn handle(runtime: &mut Runtime, command: ConfigCommand) -> Result<(), CliError> {
    match command {
        ConfigCommand::Init { api_url, username } => init(runtime, api_url, username).await,
        ConfigCommand::Get { key } => get(runtime, key).await,
        ConfigCommand::Set { key, value } => set(runtime, key, value).await,
        ConfigCommand::Profiles => profiles(runtime).await,
        ConfigCommand::Use { profile } => use_profile(runtime, profile).await,
    }
}

async fn init(
    runtime: &mut Runtime,
    api_url: Option<String>,
    username: Option<String>,
) -> Result<(), CliError> {
    let profile_name = runtime.active_profile();
    ensure_profile(&mut runtime.config, &profile_name);
    if let Some(profile) = profile_mut(&mut runtime.config, &profile_name) {
        if let Some(url) = api_url {
            apply_key(profile, ConfigKey::ApiUrl, &url)?;
        }
        if let Some(name) = username {
            apply_key(profile, ConfigKey::Username, &name)?;
        }
    }

    runtime.config.profile = profile_name;
    let path = save_config(&runtime.config)?;
    runtime.config_path = path.clone();

    if runtime.output.json {
        runtime
            .output
            .print_json(&json!({ "ok": true, "path": path }))?;
    } else {
        runtime
            .output
            .print_human(&format!("Config initialized: {}", path.display()));
    }
    Ok(())
}

async fn get(runtime: &mut Runtime, key: ConfigKey) -> Result<(), CliError> {
    let profile_name = runtime.active_profile();
    let profile = profile_ref(&runtime.config, &profile_name).ok_or_else(|| {
        CliError::Usage(format!(
            "Profile '{profile_name}' not found. Run `pchat config init` first."
        ))
    })?;

    let value = read_key(profile, key);
    if runtime.output.json {
        runtime.output.print_json(&json!({
            "key": key.name(),
            "value": value
        }))?;
        return Ok(());
    }

    match value {
        Value::Null => runtime.output.print_human("(not set)"),
        Value::String(s) => runtime.output.print_human(&s),
        other => runtime.output.print_human(&other.to_string()),
    }
    Ok(())
}

async fn set(runtime: &mut Runtime, key: ConfigKey, value: String) -> Result<(), CliError> {
    let profile_name = runtime.active_profile();
    ensure_profile(&mut runtime.config, &profile_name);
    let profile = profile_mut(&mut runtime.config, &profile_name).ok_or_else(|| {
        CliError::Generic(format!(
            "Failed to resolve profile '{profile_name}' while setting config."
        ))
    })?;

    apply_key(profile, key, &value)?;

    let path = save_config(&runtime.config)?;
    runtime.config_path = path;

    if runtime.output.json {
        runtime.output.print_json(&json!({ "ok": true }))?;
    } else {
        runtime.output.print_human("Config updated.");
    }

    Ok(())
}

async fn profiles(runtime: &mut Runtime) -> Result<(), CliError> {
    let active = runtime.active_profile();
    let mut names: Vec<String> = runtime.config.profiles.keys().cloned().collect();
    names.sort();

    if runtime.output.json {
        let payload = names
            .iter()
            .map(|name| {
                let profile = runtime.config.profiles.get(name);
                json!({
                    "name": name,
                    "active": name == &active,
                    "apiUrl": profile.map(|p| p.api_url.clone()).unwrap_or_default(),
                    "username": profile.and_then(|p| p.username.clone()),
                })
            })
            .collect::<Vec<_>>();
        runtime.output.print_json(&json!({ "profiles": payload }))?;
        return Ok(());
    }

    for name in names {
        let marker = if name == active { "*" } else { " " };
        runtime.output.print_human(&format!("{marker} {name}"));
    }
    Ok(())
}

async fn use_profile(runtime: &mut Runtime, profile_name: String) -> Result<(), CliError> {
    ensure_profile(&mut runtime.config, &profile_name);
    runtime.config.profile = profile_name.clone();
    let path = save_config(&runtime.config)?;
    runtime.config_path = path;

    if runtime.output.json {
        runtime
            .output
            .print_json(&json!({ "ok": true, "profile": profile_name }))?;
    } else {
        runtime
            .output
            .print_human(&format!("Active profile: {profile_name}"));
    }

    Ok(())
}

fn read_key(profile: &ProfileConfig, key: ConfigKey) -> Value {
    match key {
        ConfigKey::ApiUrl => json!(profile.api_url),
        ConfigKey::Username => json!(profile.username),
        ConfigKey::MultiMessage => json!(profile.multi_message),
        ConfigKey::InitialDelayMs => json!(profile.pacing.initial_delay_ms),
        ConfigKey::TokenDelayMs => json!(profile.pacing.token_delay_ms),
        ConfigKey::SegmentPauseMs => json!(profile.pacing.segment_pause_ms),
    }
}

fn apply_key(profile: &mut ProfileConfig, key: ConfigKey, value: &str) -> Result<(), CliError> {
    let value = value.trim();
    match key {
        ConfigKey::ApiUrl => {
            validate_url(value)?;
            profile.api_url = value.to_string();
        }
        ConfigKey::Username => {
            profile.username = (!value.is_empty()).then(|| value.to_string());
        }
        ConfigKey::MultiMessage => {
            profile.multi_message = parse_bool(value)?;
        }
        ConfigKey::InitialDelayMs => profile.pacing.initial_delay_ms = parse_millis(key, value)?,
        ConfigKey::TokenDelayMs => profile.pacing.token_delay_ms = parse_millis(key, value)?,
        ConfigKey::SegmentPauseMs => profile.pacing.segment_pause_ms = parse_millis(key, value)?,
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, CliError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CliError::Usage(format!(
            "Expected true/false, got '{value}'."
        ))),
    }
}

fn parse_millis(key: ConfigKey, value: &str) -> Result<u64, CliError> {
    value.parse::<u64>().map_err(|_| {
        CliError::Usage(format!(
            "{} must be a whole number of milliseconds, got '{value}'.",
            key.name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_key_updates_pacing_and_flags() {
        let mut profile = ProfileConfig::default();
        apply_key(&mut profile, ConfigKey::TokenDelayMs, "20").unwrap();
        apply_key(&mut profile, ConfigKey::MultiMessage, "yes").unwrap();
        apply_key(&mut profile, ConfigKey::Username, " ada ").unwrap();

        assert_eq!(profile.pacing.token_delay_ms, 20);
        assert!(profile.multi_message);
        assert_eq!(profile.username.as_deref(), Some("ada"));
        assert_eq!(read_key(&profile, ConfigKey::TokenDelayMs), json!(20));
    }

    #[test]
    fn empty_username_unsets_it() {
        let mut profile = ProfileConfig {
            username: Some("ada".to_string()),
            ..ProfileConfig::default()
        };
        apply_key(&mut profile, ConfigKey::Username, "").unwrap();
        assert_eq!(read_key(&profile, ConfigKey::Username), Value::Null);
    }

    #[test]
    fn invalid_values_are_usage_errors() {
        let mut profile = ProfileConfig::default();
        assert!(matches!(
            apply_key(&mut profile, ConfigKey::SegmentPauseMs, "-5"),
            Err(CliError::Usage(_))
        ));
        assert!(matches!(
            apply_key(&mut profile, ConfigKey::MultiMessage, "maybe"),
            Err(CliError::Usage(_))
        ));
        assert!(apply_key(&mut profile, ConfigKey::ApiUrl, "ftp://x").is_err());
        assert_eq!(profile.pacing.segment_pause_ms, 1000);
    }
}

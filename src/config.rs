use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::CliError;
use crate::stream::Pacing;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const API_URL_ENV: &str = "PCHAT_API_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingConfig {
    pub initial_delay_ms: u64,
    pub token_delay_ms: u64,
    pub segment_pause_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            token_delay_ms: 50,
            segment_pause_ms: 1000,
        }
    }
}

impl PacingConfig {
    pub fn to_pacing(self) -> Pacing {
        Pacing {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            token_delay: Duration::from_millis(self.token_delay_ms),
            segment_pause: Duration::from_millis(self.segment_pause_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
    pub api_url: String,
    /// Persona used when `ask`/`chat` get no username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub multi_message: bool,
    #[serde(default)]
    pub pacing: PacingConfig,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            username: None,
            multi_message: false,
            pacing: PacingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub profile: String,
    pub profiles: HashMap<String, ProfileConfig>,
}

impl Default for CliConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), ProfileConfig::default());
        Self {
            profile: "default".to_string(),
            profiles,
        }
    }
}

pub fn config_path() -> Result<PathBuf, CliError> {
    let base = dirs::config_dir().ok_or_else(|| {
        CliError::Generic("Could not resolve config directory for this OS.".to_string())
    })?;
    Ok(base.join("persona-chat").join("config.json"))
}

pub fn load_config() -> Result<CliConfig, CliError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }

    let text = fs::read_to_string(&path)?;
    let mut config: CliConfig = serde_json::from_str(&text)?;
    let profile = config.profile.clone();
    ensure_profile(&mut config, &profile);
    Ok(config)
}

pub fn save_config(config: &CliConfig) -> Result<PathBuf, CliError> {
    let path = config_path()?;
    let parent = path
        .parent()
        .ok_or_else(|| CliError::Generic("Invalid config path.".to_string()))?;
    fs::create_dir_all(parent)?;
    fs::write(&path, serde_json::to_string_pretty(config)?)?;
    Ok(path)
}

pub fn active_profile_name(config: &CliConfig, profile_override: Option<&str>) -> String {
    profile_override
        .map(|s| s.to_string())
        .unwrap_or_else(|| config.profile.clone())
}

pub fn ensure_profile(config: &mut CliConfig, profile_name: &str) {
    if !config.profiles.contains_key(profile_name) {
        config
            .profiles
            .insert(profile_name.to_string(), ProfileConfig::default());
    }
}

pub fn profile_ref<'a>(config: &'a CliConfig, profile_name: &str) -> Option<&'a ProfileConfig> {
    config.profiles.get(profile_name)
}

pub fn profile_mut<'a>(
    config: &'a mut CliConfig,
    profile_name: &str,
) -> Option<&'a mut ProfileConfig> {
    config.profiles.get_mut(profile_name)
}

/// Precedence: `--api-url`, then `PCHAT_API_URL`, then the profile.
pub fn resolve_api_url(
    config: &CliConfig,
    profile_name: &str,
    api_override: Option<&str>,
) -> Result<String, CliError> {
    let env_url = std::env::var(API_URL_ENV).ok();
    pick_api_url(config, profile_name, api_override, env_url.as_deref())
}

fn pick_api_url(
    config: &CliConfig,
    profile_name: &str,
    api_override: Option<&str>,
    env_url: Option<&str>,
) -> Result<String, CliError> {
    let explicit = api_override
        .or(env_url)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(url) = explicit {
        validate_url(url)?;
        return Ok(url.to_string());
    }

    let profile = profile_ref(config, profile_name)
        .ok_or_else(|| CliError::Usage(format!("Profile '{profile_name}' does not exist.")))?;
    validate_url(&profile.api_url)?;
    Ok(profile.api_url.clone())
}

pub fn validate_url(value: &str) -> Result<(), CliError> {
    let parsed = Url::parse(value)?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(CliError::Usage(
            "API URL must use http:// or https://.".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_default_profile() {
        let config = CliConfig::default();
        let profile = profile_ref(&config, "default").expect("default profile");
        assert_eq!(profile.api_url, DEFAULT_API_URL);
        assert_eq!(profile.pacing, PacingConfig::default());
    }

    #[test]
    fn flag_beats_env_beats_profile() {
        let config = CliConfig::default();
        let url = pick_api_url(
            &config,
            "default",
            Some("https://chat.example.com"),
            Some("http://env.example.com"),
        )
        .unwrap();
        assert_eq!(url, "https://chat.example.com");

        let url = pick_api_url(&config, "default", None, Some("http://env.example.com")).unwrap();
        assert_eq!(url, "http://env.example.com");

        let url = pick_api_url(&config, "default", None, Some("  ")).unwrap();
        assert_eq!(url, DEFAULT_API_URL);
    }

    #[test]
    fn unknown_profile_is_usage_error() {
        let config = CliConfig::default();
        let err = pick_api_url(&config, "missing", None, None);
        assert!(matches!(err, Err(CliError::Usage(_))));
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(matches!(
            validate_url("ftp://example.com"),
            Err(CliError::Usage(_))
        ));
        assert!(validate_url("http://192.168.68.104:8000").is_ok());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn profile_without_pacing_uses_defaults() {
        let text = r#"{
            "profile": "default",
            "profiles": { "default": { "apiUrl": "http://localhost:9000" } }
        }"#;
        let config: CliConfig = serde_json::from_str(text).unwrap();
        let profile = profile_ref(&config, "default").unwrap();
        assert_eq!(profile.api_url, "http://localhost:9000");
        assert!(!profile.multi_message);
        assert_eq!(profile.pacing.token_delay_ms, 50);
    }

    #[test]
    fn pacing_converts_to_durations() {
        let pacing = PacingConfig::default().to_pacing();
        assert_eq!(pacing.initial_delay, Duration::from_millis(500));
        assert_eq!(pacing.token_delay, Duration::from_millis(50));
        assert_eq!(pacing.segment_pause, Duration::from_millis(1000));
    }
}

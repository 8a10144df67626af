use std::path::PathBuf;

use crate::api::ApiClient;
use crate::config::{CliConfig, ProfileConfig, active_profile_name, profile_ref, resolve_api_url};
use crate::errors::CliError;
use crate::output::OutputMode;
use crate::personas::PersonaApi;

#[derive(Debug, Clone)]
pub struct Runtime {
    pub output: OutputMode,
    pub config: CliConfig,
    pub config_path: PathBuf,
    pub profile_override: Option<String>,
    pub api_url_override: Option<String>,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Runtime {
    pub fn active_profile(&self) -> String {
        active_profile_name(&self.config, self.profile_override.as_deref())
    }

    pub fn profile(&self) -> ProfileConfig {
        profile_ref(&self.config, &self.active_profile())
            .cloned()
            .unwrap_or_default()
    }

    pub fn resolved_api_url(&self) -> Result<String, CliError> {
        resolve_api_url(
            &self.config,
            &self.active_profile(),
            self.api_url_override.as_deref(),
        )
    }

    /// Explicit argument first, then the profile's default persona.
    pub fn resolved_username(&self, explicit: Option<&str>) -> Result<String, CliError> {
        explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .or_else(|| self.profile().username)
            .ok_or_else(|| {
                CliError::Usage(
                    "Missing username. Pass one or run `pchat config set username <name>`."
                        .to_string(),
                )
            })
    }

    pub fn api_client(&self) -> Result<ApiClient, CliError> {
        ApiClient::new(
            self.resolved_api_url()?,
            self.timeout_ms,
            self.retries,
            self.output.debug,
        )
    }

    pub fn persona_api(&self) -> Result<PersonaApi, CliError> {
        Ok(PersonaApi::new(self.api_client()?))
    }
}

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Generic = 1,
    Usage = 3,
    Network = 4,
    RateLimited = 5,
    Server = 6,
    NotFound = 7,
    Cancelled = 130,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Server(String),
    #[error("{0}")]
    Cancelled(String),
    #[error("{0}")]
    Generic(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => ExitCode::Usage as i32,
            CliError::Network(_) => ExitCode::Network as i32,
            CliError::NotFound(_) => ExitCode::NotFound as i32,
            CliError::RateLimited(_) => ExitCode::RateLimited as i32,
            CliError::Server(_) => ExitCode::Server as i32,
            CliError::Cancelled(_) => ExitCode::Cancelled as i32,
            CliError::Generic(_) => ExitCode::Generic as i32,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        CliError::Generic(format!("I/O error: {value}"))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        CliError::Generic(format!("JSON error: {value}"))
    }
}

impl From<url::ParseError> for CliError {
    fn from(value: url::ParseError) -> Self {
        CliError::Usage(format!("Invalid URL: {value}"))
    }
}

impl From<reqwest::Error> for CliError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return CliError::Network("Request timed out.".to_string());
        }
        CliError::Network(format!("Network request failed: {value}"))
    }
}

pub fn with_debug_hint(message: &str, debug: bool) -> String {
    if debug {
        return message.to_string();
    }
    format!("{message} (try --debug for details)")
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_variant() {
        assert_eq!(CliError::Usage("x".into()).exit_code(), 3);
        assert_eq!(CliError::NotFound("x".into()).exit_code(), 7);
        assert_eq!(CliError::Cancelled("x".into()).exit_code(), 130);
        assert_eq!(ExitCode::Network.to_string(), "4");
    }

    #[test]
    fn debug_hint_only_without_debug() {
        assert_eq!(with_debug_hint("boom", true), "boom");
        assert_eq!(
            with_debug_hint("boom", false),
            "boom (try --debug for details)"
        );
    }
}

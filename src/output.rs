use std::io::{self, Write};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::errors::CliError;

#[derive(Debug, Clone)]
pub struct OutputMode {
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub debug: bool,
}

impl OutputMode {
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<(), CliError> {
        let text = serde_json::to_string(value)?;
        println!("{text}");
        Ok(())
    }

    pub fn print_human(&self, message: &str) {
        if self.json || self.quiet {
            return;
        }
        println!("{message}");
    }

    /// Writes without a trailing newline and flushes, for incremental tokens.
    pub fn print_inline(&self, fragment: &str) {
        if self.json || self.quiet {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(fragment.as_bytes());
        let _ = stdout.flush();
    }

    pub fn print_stderr(&self, message: &str) {
        if self.json || self.quiet {
            return;
        }
        eprintln!("{message}");
    }

    pub fn print_verbose(&self, message: &str) {
        if !self.verbose || self.json || self.quiet {
            return;
        }
        eprintln!("{message}");
    }

    fn default_log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over the flags.
pub fn init_logging(mode: &OutputMode) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pchat={}", mode.default_log_level())));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

pub fn print_error(error: &CliError, mode: &OutputMode) {
    if mode.json {
        let payload = serde_json::json!({
            "error": error.to_string(),
            "code": error.exit_code()
        });
        println!(
            "{}",
            serde_json::to_string(&payload)
                .unwrap_or_else(|_| "{\"error\":\"unknown\"}".to_string())
        );
        return;
    }

    eprintln!("Error: {error}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(verbose: bool, debug: bool) -> OutputMode {
        OutputMode {
            json: false,
            quiet: false,
            verbose,
            debug,
        }
    }

    #[test]
    fn log_level_tracks_flags() {
        assert_eq!(mode(false, false).default_log_level(), "warn");
        assert_eq!(mode(true, false).default_log_level(), "info");
        assert_eq!(mode(true, true).default_log_level(), "debug");
    }
}

mod api;
mod app;
mod commands;
mod config;
mod conversation;
mod errors;
mod output;
mod personas;
mod stream;
mod types;

use clap::{Parser, Subcommand};

use crate::app::Runtime;
use crate::commands::ask::AskArgs;
use crate::commands::chat::ChatArgs;
use crate::commands::config::ConfigCommand;
use crate::commands::history::HistoryCommand;
use crate::errors::CliError;
use crate::output::{OutputMode, init_logging, print_error};

#[derive(Debug, Parser)]
#[command(
    name = "pchat",
    version,
    about = "Chat with persona bots from the terminal, answers typed out as they arrive."
)]
struct Cli {
    #[arg(long, global = true)]
    profile: Option<String>,
    #[arg(long = "api-url", global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true)]
    quiet: bool,
    #[arg(long, global = true, default_value_t = 120_000)]
    timeout: u64,
    #[arg(long, global = true, default_value_t = 2)]
    retries: u32,
    #[arg(long, global = true)]
    verbose: bool,
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// List active personas
    Users,
    /// Ask one question and print the answer as it is typed out
    Ask(AskArgs),
    /// Interactive conversation with one persona
    Chat(ChatArgs),
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output = OutputMode {
        json: cli.json,
        quiet: cli.quiet,
        verbose: cli.verbose,
        debug: cli.debug,
    };
    init_logging(&output);

    let result = run(cli, output.clone()).await;
    if let Err(err) = result {
        print_error(&err, &output);
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli, output: OutputMode) -> Result<(), CliError> {
    let config = config::load_config()?;
    let config_path = config::config_path()?;

    let mut runtime = Runtime {
        output,
        config,
        config_path,
        profile_override: cli.profile,
        api_url_override: cli.api_url,
        timeout_ms: cli.timeout,
        retries: cli.retries,
    };
    tracing::debug!(profile = %runtime.active_profile(), "runtime ready");

    match cli.command {
        Commands::Config { command } => commands::config::handle(&mut runtime, command).await,
        Commands::Users => commands::users::handle(&runtime).await,
        Commands::Ask(args) => commands::ask::handle(&runtime, args).await,
        Commands::Chat(args) => commands::chat::handle(&runtime, args).await,
        Commands::History { command } => commands::history::handle(&runtime, command).await,
    }
}

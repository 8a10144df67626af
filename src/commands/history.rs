use clap::{Subcommand, ValueEnum};
use serde_json::json;

use crate::app::Runtime;
use crate::errors::CliError;
use crate::personas::PersonaApi;
use crate::types::{ConversationHistoryCreate, ConversationHistoryResponse, HistoryRole};

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// Show stored conversation history
    List {
        /// Numeric user id or username
        user: String,
    },
    /// Append one entry to the history
    Add {
        user: String,
        #[arg(long, value_enum, default_value_t = RoleArg::User)]
        role: RoleArg,
        content: String,
    },
    /// Delete all history for a user
    Clear { user: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    User,
    Ai,
}

impl From<RoleArg> for HistoryRole {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::User => HistoryRole::User,
            RoleArg::Ai => HistoryRole::Ai,
        }
    }
}

pub async fn handle(runtime: &Runtime, command: HistoryCommand) -> Result<(), CliError> {
    let api = runtime.persona_api()?;
    match command {
        HistoryCommand::List { user } => list(runtime, &api, &user).await,
        HistoryCommand::Add {
            user,
            role,
            content,
        } => add(runtime, &api, &user, role.into(), content).await,
        HistoryCommand::Clear { user } => clear(runtime, &api, &user).await,
    }
}

async fn list(runtime: &Runtime, api: &PersonaApi, user: &str) -> Result<(), CliError> {
    let user_id = resolve_user_id(api, user).await?;
    let entries = api.history(user_id).await?;

    if runtime.output.json {
        runtime.output.print_json(&entries)?;
        return Ok(());
    }

    if entries.is_empty() {
        runtime.output.print_human("No history.");
        return Ok(());
    }
    for entry in &entries {
        runtime.output.print_human(&history_line(entry));
    }
    Ok(())
}

async fn add(
    runtime: &Runtime,
    api: &PersonaApi,
    user: &str,
    role: HistoryRole,
    content: String,
) -> Result<(), CliError> {
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(CliError::Usage("History content cannot be empty.".to_string()));
    }

    let user_id = resolve_user_id(api, user).await?;
    let entry = api
        .add_history(&ConversationHistoryCreate {
            user_id,
            role,
            content,
        })
        .await?;

    if runtime.output.json {
        runtime.output.print_json(&entry)?;
    } else {
        runtime
            .output
            .print_human(&format!("Added history entry {}.", entry.id));
    }
    Ok(())
}

async fn clear(runtime: &Runtime, api: &PersonaApi, user: &str) -> Result<(), CliError> {
    let user_id = resolve_user_id(api, user).await?;
    api.clear_history(user_id).await?;

    if runtime.output.json {
        runtime
            .output
            .print_json(&json!({ "ok": true, "userId": user_id }))?;
    } else {
        runtime.output.print_human("History cleared.");
    }
    Ok(())
}

/// Numeric input is taken as an id, anything else is looked up by username.
async fn resolve_user_id(api: &PersonaApi, user: &str) -> Result<i64, CliError> {
    let user = user.trim();
    if let Ok(id) = user.parse::<i64>() {
        return Ok(id);
    }
    Ok(api.find_user(user).await?.id)
}

fn history_line(entry: &ConversationHistoryResponse) -> String {
    format!(
        "[{}] {}: {}",
        entry.created_at,
        entry.role.as_str(),
        entry.content
    )
}

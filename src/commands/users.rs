use crate::app::Runtime;
use crate::errors::CliError;
use crate::types::UserProfile;

pub async fn handle(runtime: &Runtime) -> Result<(), CliError> {
    let api = runtime.persona_api()?;
    let users = api.active_users().await?;

    if runtime.output.json {
        runtime.output.print_json(&users)?;
        return Ok(());
    }

    if users.is_empty() {
        runtime.output.print_human("No active users.");
        return Ok(());
    }
    for user in &users {
        runtime.output.print_human(&user_line(user));
    }
    Ok(())
}

fn user_line(user: &UserProfile) -> String {
    let description = user
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("No description");
    format!("{:<20} {description}", user.username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_line_falls_back_when_description_missing() {
        let mut user: UserProfile =
            serde_json::from_str(r#"{"id":1,"username":"ada","created_at":""}"#).unwrap();
        assert!(user_line(&user).ends_with("No description"));

        user.description = Some("Mathematician".to_string());
        assert!(user_line(&user).starts_with("ada "));
        assert!(user_line(&user).ends_with("Mathematician"));
    }
}

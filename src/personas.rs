use std::future::Future;

use serde_json::json;
use url::Url;

use crate::api::ApiClient;
use crate::errors::CliError;
use crate::stream::{AnswerSegment, Responder, normalize_response};
use crate::types::{
    AskResponse, ConversationHistoryCreate, ConversationHistoryResponse, QuestionRequest,
    UserProfile,
};

/// Typed calls against the persona backend.
#[derive(Debug, Clone)]
pub struct PersonaApi {
    api: ApiClient,
}

impl PersonaApi {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }

    pub async fn active_users(&self) -> Result<Vec<UserProfile>, CliError> {
        let res = self.api.get_json("/personalities/active-users").await?;
        tracing::info!(
            request_id = ?res.request_id,
            elapsed_ms = res.elapsed_ms as u64,
            "loaded active users"
        );
        Ok(serde_json::from_value(res.json)?)
    }

    pub async fn find_user(&self, username: &str) -> Result<UserProfile, CliError> {
        self.active_users()
            .await?
            .into_iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .ok_or_else(|| CliError::NotFound(format!("No active user named '{username}'.")))
    }

    pub async fn ask(
        &self,
        username: &str,
        question: &str,
        multi_message: bool,
    ) -> Result<AskResponse, CliError> {
        let path = encoded_path(&["personalities", "users", username, "ask"])?;
        let body = QuestionRequest {
            question: question.to_string(),
            multi_message: multi_message.then_some(true),
        };

        tracing::info!(username, chars = question.len(), "sending question");
        let res = self.api.post_json(&path, Some(json!(body))).await?;
        tracing::info!(
            request_id = ?res.request_id,
            elapsed_ms = res.elapsed_ms as u64,
            "answer received"
        );

        let response: AskResponse = serde_json::from_value(res.json)?;
        if response.answers.is_none() && response.answer.is_none() {
            return Err(CliError::Server(
                "Server reply carried no answer.".to_string(),
            ));
        }
        Ok(response)
    }

    pub async fn history(
        &self,
        user_id: i64,
    ) -> Result<Vec<ConversationHistoryResponse>, CliError> {
        let res = self
            .api
            .get_json(&format!("/conversations/history/{user_id}"))
            .await?;
        Ok(serde_json::from_value(res.json)?)
    }

    pub async fn add_history(
        &self,
        entry: &ConversationHistoryCreate,
    ) -> Result<ConversationHistoryResponse, CliError> {
        let res = self
            .api
            .post_json("/conversations/history/", Some(json!(entry)))
            .await?;
        Ok(serde_json::from_value(res.json)?)
    }

    pub async fn clear_history(&self, user_id: i64) -> Result<(), CliError> {
        self.api
            .delete_json(&format!("/conversations/history/{user_id}"))
            .await?;
        Ok(())
    }

    pub fn responder(&self, username: impl Into<String>, multi_message: bool) -> PersonaResponder {
        PersonaResponder {
            api: self.clone(),
            username: username.into(),
            multi_message,
        }
    }
}

/// Asks one persona over HTTP and normalizes the reply into segments.
#[derive(Debug, Clone)]
pub struct PersonaResponder {
    api: PersonaApi,
    username: String,
    multi_message: bool,
}

impl Responder for PersonaResponder {
    fn ask(
        &self,
        question: &str,
    ) -> impl Future<Output = Result<Vec<AnswerSegment>, CliError>> + Send {
        let question = question.to_string();
        async move {
            let response = self
                .api
                .ask(&self.username, &question, self.multi_message)
                .await?;
            Ok(normalize_response(response))
        }
    }
}

/// Percent-encodes each segment and joins them into an absolute path.
fn encoded_path(segments: &[&str]) -> Result<String, CliError> {
    let mut url = Url::parse("http://localhost/")?;
    url.path_segments_mut()
        .map_err(|_| CliError::Generic("Cannot build request path.".to_string()))?
        .clear()
        .extend(segments);
    Ok(url.path().to_string())
}

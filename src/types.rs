// Wire types for the persona backend.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(
        default,
        rename = "profilePicture",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_message: Option<bool>,
}

/// One entry of `answers`. Either field may be missing or null on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests_matched: Vec<String>,
}

/// Reply of the ask endpoint. Older servers send a flat `answer` instead of `answers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answers: Option<Vec<MessageContent>>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_context: Option<ConversationContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Ai,
}

impl HistoryRole {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryRole::User => "user",
            HistoryRole::Ai => "ai",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistoryResponse {
    pub id: i64,
    pub user_id: i64,
    pub role: HistoryRole,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistoryCreate {
    pub user_id: i64,
    pub role: HistoryRole,
    pub content: String,
}

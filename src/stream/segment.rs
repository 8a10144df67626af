use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::AskResponse;

/// Shown when the responder answered with no segments at all.
pub const NO_RESPONSE_CONTENT: &str = "No response content";
/// Stands in for a segment whose text is missing or empty.
pub const NO_CONTENT_AVAILABLE: &str = "No content available";
/// Final segment emitted when the responder call fails.
pub const ERROR_GETTING_RESPONSE: &str = "Error getting response";
/// Final segment emitted when a delivery is cancelled before anything was revealed.
pub const RESPONSE_CANCELLED: &str = "Response cancelled";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SegmentKind {
    #[default]
    Text,
    Thinking,
    Media,
    Other(String),
}

impl SegmentKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Self::Text,
            "thinking" => Self::Thinking,
            "media" => Self::Media,
            _ => Self::Other(tag.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Thinking => "thinking",
            Self::Media => "media",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for SegmentKind {
    fn from(value: String) -> Self {
        Self::from_tag(&value)
    }
}

impl From<SegmentKind> for String {
    fn from(value: SegmentKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of answer content, rendered as one chat bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSegment {
    pub text: String,
    pub kind: SegmentKind,
}

impl AnswerSegment {
    pub fn new(text: impl Into<String>, kind: SegmentKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, SegmentKind::Text)
    }
}

/// Flattens an ask reply into ordered segments.
///
/// `answers` wins when present (even if empty, which means "no content").
/// The legacy flat `answer` becomes a single `text` segment. Entries without
/// content keep empty text; playback shows [`NO_CONTENT_AVAILABLE`] for them.
pub fn normalize_response(response: AskResponse) -> Vec<AnswerSegment> {
    if let Some(answers) = response.answers {
        return answers
            .into_iter()
            .map(|answer| {
                let text = answer.content.unwrap_or_default();
                let kind = answer
                    .kind
                    .as_deref()
                    .map(SegmentKind::from_tag)
                    .unwrap_or_default();
                AnswerSegment::new(text, kind)
            })
            .collect();
    }

    match response.answer {
        Some(answer) => vec![AnswerSegment::text(answer)],
        None => Vec::new(),
    }
}

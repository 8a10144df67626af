//! The conversation view: displayed messages and how delivery events land in it.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::stream::{CompletedSegment, DeliverySink, SegmentKind};
use crate::types::{ConversationHistoryResponse, HistoryRole};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn mint(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4()))
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl From<HistoryRole> for Sender {
    fn from(value: HistoryRole) -> Self {
        match value {
            HistoryRole::User => Sender::User,
            HistoryRole::Ai => Sender::Ai,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplayMessage {
    pub id: MessageId,
    pub sender: Sender,
    pub content: String,
    pub kind: SegmentKind,
    /// Placeholder shown as a typing indicator.
    pub loading: bool,
    /// Server timestamp for history entries, absent for local ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl DisplayMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageId::mint("user"), Sender::User, content.into(), SegmentKind::Text)
    }

    pub fn ai(id: MessageId, content: impl Into<String>, kind: SegmentKind) -> Self {
        Self::new(id, Sender::Ai, content.into(), kind)
    }

    pub fn placeholder() -> Self {
        let mut message = Self::new(
            MessageId::mint("ai-loading"),
            Sender::Ai,
            String::new(),
            SegmentKind::Text,
        );
        message.loading = true;
        message
    }

    fn new(id: MessageId, sender: Sender, content: String, kind: SegmentKind) -> Self {
        Self {
            id,
            sender,
            content,
            kind,
            loading: false,
            created_at: None,
        }
    }
}

impl From<ConversationHistoryResponse> for DisplayMessage {
    fn from(entry: ConversationHistoryResponse) -> Self {
        let mut message = Self::new(
            MessageId::from(entry.id.to_string()),
            entry.role.into(),
            entry.content,
            SegmentKind::Text,
        );
        message.created_at = Some(entry.created_at);
        message
    }
}

/// Ordered list of displayed messages keyed by id.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<DisplayMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: DisplayMessage) -> MessageId {
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    pub fn push_placeholder(&mut self) -> MessageId {
        self.push(DisplayMessage::placeholder())
    }

    /// Swaps the message `id` for `message`, keeping its position.
    pub fn replace(&mut self, id: &MessageId, message: DisplayMessage) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == id) {
            Some(slot) => {
                *slot = message;
                true
            }
            None => false,
        }
    }

    pub fn update(&mut self, id: &MessageId, apply: impl FnOnce(&mut DisplayMessage)) -> bool {
        match self.messages.iter_mut().find(|m| &m.id == id) {
            Some(message) => {
                apply(message);
                true
            }
            None => false,
        }
    }

    pub fn append_text(&mut self, id: &MessageId, text: &str) -> bool {
        self.update(id, |m| m.content.push_str(text))
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Replaces the whole view with server history, oldest first as received.
    pub fn load_history(&mut self, history: Vec<ConversationHistoryResponse>) {
        self.messages = history.into_iter().map(DisplayMessage::from).collect();
    }
}

/// Applies one delivery to a conversation.
///
/// Holds the one-placeholder-per-segment bookkeeping: the first token of a
/// segment replaces the pending placeholder with a new streaming message,
/// later tokens append to it, and its completion rewrites it with the full
/// segment text. A non-final completion opens the next placeholder.
#[derive(Debug)]
pub struct Reconciler<'a> {
    conversation: &'a mut Conversation,
    placeholder: Option<MessageId>,
    streaming: Option<MessageId>,
    finalized: Vec<MessageId>,
}

impl<'a> Reconciler<'a> {
    /// Appends the loading placeholder for the first segment.
    pub fn begin(conversation: &'a mut Conversation) -> Self {
        let placeholder = conversation.push_placeholder();
        Self {
            conversation,
            placeholder: Some(placeholder),
            streaming: None,
            finalized: Vec::new(),
        }
    }

    /// Resolves anything still loading and returns the ids finalized by this
    /// delivery, in order. Deliveries always end with a final completion, so
    /// the fallback only shows if a delivery future was dropped.
    pub fn finish(mut self, fallback: &str) -> Vec<MessageId> {
        if let Some(id) = self.streaming.take() {
            self.conversation.update(&id, |m| m.loading = false);
            self.finalized.push(id);
        }
        if let Some(id) = self.placeholder.take() {
            let message =
                DisplayMessage::ai(MessageId::mint("ai-final"), fallback, SegmentKind::Text);
            let new_id = message.id.clone();
            self.conversation.replace(&id, message);
            self.finalized.push(new_id);
        }
        self.finalized
    }
}

impl DeliverySink for Reconciler<'_> {
    fn on_token(&mut self, text: &str) {
        if let Some(id) = &self.streaming {
            self.conversation.append_text(id, text);
            return;
        }

        let message =
            DisplayMessage::ai(MessageId::mint("ai-streaming"), text, SegmentKind::Text);
        let id = message.id.clone();
        match self.placeholder.take() {
            Some(placeholder) => {
                self.conversation.replace(&placeholder, message);
            }
            None => {
                self.conversation.push(message);
            }
        }
        self.streaming = Some(id);
    }

    fn on_segment_complete(&mut self, segment: CompletedSegment) {
        let id = match (self.streaming.take(), self.placeholder.take()) {
            (Some(id), placeholder) => {
                // At most one of the two is live at a time.
                if let Some(stale) = placeholder {
                    self.conversation.messages.retain(|m| m.id != stale);
                }
                let text = segment.text.clone();
                let kind = segment.kind.clone();
                self.conversation.update(&id, move |m| {
                    m.content = text;
                    m.kind = kind;
                    m.loading = false;
                });
                id
            }
            (None, Some(placeholder)) => {
                let message = DisplayMessage::ai(
                    MessageId::mint("ai-final"),
                    segment.text.clone(),
                    segment.kind.clone(),
                );
                let id = message.id.clone();
                self.conversation.replace(&placeholder, message);
                id
            }
            (None, None) => self.conversation.push(DisplayMessage::ai(
                MessageId::mint("ai-final"),
                segment.text.clone(),
                segment.kind.clone(),
            )),
        };
        self.finalized.push(id);

        if !segment.is_final {
            self.placeholder = Some(self.conversation.push_placeholder());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::{self, Future};

    use super::*;
    use crate::errors::CliError;
    use crate::stream::{AnswerSegment, Deliverer, Pacing, Responder};

    struct FixedResponder(Result<Vec<AnswerSegment>, ()>);

    impl Responder for FixedResponder {
        fn ask(
            &self,
            _question: &str,
        ) -> impl Future<Output = Result<Vec<AnswerSegment>, CliError>> + Send {
            future::ready(
                self.0
                    .clone()
                    .map_err(|_| CliError::Network("offline".to_string())),
            )
        }
    }

    fn any_loading(conversation: &Conversation) -> bool {
        conversation.messages().iter().any(|m| m.loading)
    }

    fn final_segment(text: &str) -> CompletedSegment {
        CompletedSegment {
            text: text.to_string(),
            kind: SegmentKind::Text,
            is_final: true,
        }
    }

    #[test]
    fn conversation_supports_placeholder_replace_update_push() {
        let mut conversation = Conversation::new();
        conversation.push(DisplayMessage::user("hi"));
        let placeholder = conversation.push_placeholder();
        assert!(any_loading(&conversation));

        let id = MessageId::from("ai-1".to_string());
        let reply = DisplayMessage::ai(id.clone(), "Hel", SegmentKind::Text);
        assert!(conversation.replace(&placeholder, reply));
        assert!(conversation.messages().iter().all(|m| m.id != placeholder));

        assert!(conversation.append_text(&id, "lo"));
        assert_eq!(conversation.messages()[1].id, id);
        assert_eq!(conversation.messages()[1].content, "Hello");
        assert!(!any_loading(&conversation));

        assert!(!conversation.append_text(&MessageId::from("nope".to_string()), "x"));
    }

    #[test]
    fn reconciler_reveals_in_place_and_finalizes() {
        let mut conversation = Conversation::new();
        let mut reconciler = Reconciler::begin(&mut conversation);

        reconciler.on_token("Hello");
        reconciler.on_token(" ");
        reconciler.on_token("there");
        let streaming = reconciler.streaming.clone().unwrap();
        assert!(reconciler.placeholder.is_none());

        reconciler.on_segment_complete(final_segment("Hello there"));
        let finalized = reconciler.finish("unused");

        assert_eq!(finalized, vec![streaming.clone()]);
        assert_eq!(conversation.len(), 1);
        let message = &conversation.messages()[0];
        assert_eq!(message.id, streaming);
        assert!(message.id.to_string().starts_with("ai-streaming-"));
        assert_eq!(message.content, "Hello there");
        assert!(!message.loading);
    }

    #[test]
    fn error_completion_replaces_placeholder() {
        let mut conversation = Conversation::new();
        let mut reconciler = Reconciler::begin(&mut conversation);
        reconciler.on_segment_complete(final_segment("Error getting response"));
        reconciler.finish("unused");

        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].content, "Error getting response");
        assert!(!any_loading(&conversation));
    }

    #[test]
    fn finish_resolves_dangling_placeholder() {
        let mut conversation = Conversation::new();
        let reconciler = Reconciler::begin(&mut conversation);
        let finalized = reconciler.finish("Response cancelled");

        assert_eq!(finalized.len(), 1);
        assert_eq!(conversation.messages()[0].content, "Response cancelled");
        assert!(!any_loading(&conversation));
    }

    #[tokio::test]
    async fn multi_segment_delivery_leaves_one_bubble_per_segment() {
        let responder = FixedResponder(Ok(vec![
            AnswerSegment::new("thinking...", SegmentKind::Thinking),
            AnswerSegment::text("Sure, here it is."),
        ]));
        let deliverer = Deliverer::new(responder, Pacing::immediate());

        let mut conversation = Conversation::new();
        conversation.push(DisplayMessage::user("tell me"));
        let mut reconciler = Reconciler::begin(&mut conversation);
        deliverer.deliver_to("tell me", &mut reconciler).await.unwrap();
        let finalized = reconciler.finish("unused");

        assert_eq!(finalized.len(), 2);
        let contents: Vec<_> = conversation
            .messages()
            .iter()
            .map(|m| (m.sender, m.content.as_str(), m.kind.as_str(), m.loading))
            .collect();
        assert_eq!(
            contents,
            vec![
                (Sender::User, "tell me", "text", false),
                (Sender::Ai, "thinking...", "thinking", false),
                (Sender::Ai, "Sure, here it is.", "text", false),
            ]
        );
    }

    #[tokio::test]
    async fn failed_delivery_leaves_error_bubble() {
        let deliverer = Deliverer::new(FixedResponder(Err(())), Pacing::immediate());
        let mut conversation = Conversation::new();
        let mut reconciler = Reconciler::begin(&mut conversation);
        let result = deliverer.deliver_to("q", &mut reconciler).await;
        reconciler.finish("unused");

        assert!(result.is_err());
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].content, "Error getting response");
        assert!(!any_loading(&conversation));
    }

    #[test]
    fn history_maps_roles_and_ids() {
        let mut conversation = Conversation::new();
        conversation.push(DisplayMessage::user("stale"));
        conversation.load_history(vec![
            ConversationHistoryResponse {
                id: 10,
                user_id: 1,
                role: HistoryRole::User,
                content: "hi".to_string(),
                created_at: "2024-05-01T10:00:00".to_string(),
            },
            ConversationHistoryResponse {
                id: 11,
                user_id: 1,
                role: HistoryRole::Ai,
                content: "hello".to_string(),
                created_at: "2024-05-01T10:00:02".to_string(),
            },
        ]);

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].id.to_string(), "10");
        assert_eq!(conversation.messages()[1].sender, Sender::Ai);
        assert_eq!(
            conversation.messages()[1].created_at.as_deref(),
            Some("2024-05-01T10:00:02")
        );
    }
}

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::app::Runtime;
use crate::commands::ask::TerminalEcho;
use crate::commands::cancel_on_ctrl_c;
use crate::conversation::{Conversation, DisplayMessage, MessageId, Reconciler, Sender};
use crate::errors::CliError;
use crate::output::{OutputMode, print_error};
use crate::personas::{PersonaApi, PersonaResponder};
use crate::stream::segment::ERROR_GETTING_RESPONSE;
use crate::stream::{CompletedSegment, Deliverer, DeliverySink, Pacing};
use crate::types::UserProfile;

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Persona to chat with. Defaults to the profile's `username`
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,
    /// Ask for multi-part answers
    #[arg(long)]
    pub multi: bool,
    /// Print answers without typing delays
    #[arg(long = "no-pace")]
    pub no_pace: bool,
    /// Start with an empty conversation instead of loading stored history
    #[arg(long = "no-history")]
    pub no_history: bool,
}

pub async fn handle(runtime: &Runtime, args: ChatArgs) -> Result<(), CliError> {
    if runtime.output.json {
        return Err(CliError::Usage(
            "`pchat chat` is interactive and does not support --json. Use `pchat ask`.".to_string(),
        ));
    }

    let username = runtime.resolved_username(args.user.as_deref())?;
    let profile = runtime.profile();
    let pacing = if args.no_pace {
        Pacing::immediate()
    } else {
        profile.pacing.to_pacing()
    };

    let api = runtime.persona_api()?;
    let user = api.find_user(&username).await?;
    let mut session = ChatSession::new(
        api,
        user,
        args.multi || profile.multi_message,
        pacing,
        &runtime.output,
    );
    if !args.no_history {
        session.load_history().await;
    }

    runtime.output.print_human(&format!(
        "Chatting with {}. Commands: /history, /clear, /quit. Ctrl-C cancels a reply.",
        session.user.username
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        runtime.output.print_inline("> ");
        let line = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                runtime.output.print_human("");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match ChatInput::parse(&line) {
            ChatInput::Empty => continue,
            ChatInput::Quit => break,
            ChatInput::History => session.print_history(),
            ChatInput::Clear => match session.clear().await {
                Ok(()) => runtime.output.print_human("Conversation cleared."),
                Err(err) => print_error(&err, &runtime.output),
            },
            ChatInput::Question(question) => match session.send(&question).await {
                Ok(_) => {}
                Err(CliError::Cancelled(_)) => runtime.output.print_stderr("(cancelled)"),
                Err(err) => print_error(&err, &runtime.output),
            },
        }
    }

    tracing::info!(messages = session.conversation.len(), "chat ended");
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum ChatInput {
    Empty,
    Quit,
    Clear,
    History,
    Question(String),
}

impl ChatInput {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "" => ChatInput::Empty,
            "/quit" | "/exit" => ChatInput::Quit,
            "/clear" => ChatInput::Clear,
            "/history" => ChatInput::History,
            _ => ChatInput::Question(trimmed.to_string()),
        }
    }
}

/// One interactive conversation with a single persona.
struct ChatSession<'a> {
    api: PersonaApi,
    user: UserProfile,
    deliverer: Deliverer<PersonaResponder>,
    conversation: Conversation,
    output: &'a OutputMode,
    sending: bool,
}

impl<'a> ChatSession<'a> {
    fn new(
        api: PersonaApi,
        user: UserProfile,
        multi_message: bool,
        pacing: Pacing,
        output: &'a OutputMode,
    ) -> Self {
        let responder = api.responder(user.username.as_str(), multi_message);
        Self {
            deliverer: Deliverer::new(responder, pacing),
            api,
            user,
            conversation: Conversation::new(),
            output,
            sending: false,
        }
    }

    /// History is optional context, so failures only warn.
    async fn load_history(&mut self) {
        match self.api.history(self.user.id).await {
            Ok(history) => {
                tracing::info!(entries = history.len(), "history loaded");
                self.conversation.load_history(history);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load history");
                self.output
                    .print_stderr(&format!("Could not load history: {err}"));
            }
        }
    }

    async fn clear(&mut self) -> Result<(), CliError> {
        self.api.clear_history(self.user.id).await?;
        self.conversation.clear();
        Ok(())
    }

    fn print_history(&self) {
        if self.conversation.is_empty() {
            self.output.print_human("(no messages)");
            return;
        }
        for message in self.conversation.messages() {
            let who = match message.sender {
                Sender::User => "you",
                Sender::Ai => self.user.username.as_str(),
            };
            self.output.print_human(&format!("{who}: {}", message.content));
        }
    }

    async fn send(&mut self, text: &str) -> Result<Vec<MessageId>, CliError> {
        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(cancel.clone());
        let result = self.send_with_cancel(text, &cancel).await;
        watcher.abort();
        result
    }

    /// Adds the user's message, then streams the reply into the conversation
    /// and the terminal. Returns the ids of the finalized reply messages.
    async fn send_with_cancel(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageId>, CliError> {
        let question = text.trim();
        if question.is_empty() {
            return Ok(Vec::new());
        }
        if self.sending {
            return Err(CliError::Usage(
                "Still answering the previous question.".to_string(),
            ));
        }
        self.sending = true;

        self.conversation.push(DisplayMessage::user(question));
        self.output
            .print_inline(&format!("{}: ", self.user.username));

        let mut reconciler = Reconciler::begin(&mut self.conversation);
        let mut echo = TerminalEcho::new(self.output);
        let result = {
            let mut sink = Tee(&mut reconciler, &mut echo);
            self.deliverer
                .deliver_with_cancel(question, &mut sink, cancel)
                .await
        };
        let finalized = reconciler.finish(ERROR_GETTING_RESPONSE);
        self.sending = false;

        result.map(|()| finalized)
    }
}

/// Forwards every event to both sinks.
struct Tee<'s, A: ?Sized, B: ?Sized>(&'s mut A, &'s mut B);

impl<A, B> DeliverySink for Tee<'_, A, B>
where
    A: DeliverySink + ?Sized,
    B: DeliverySink + ?Sized,
{
    fn on_token(&mut self, text: &str) {
        self.0.on_token(text);
        self.1.on_token(text);
    }

    fn on_segment_complete(&mut self, segment: CompletedSegment) {
        self.1.on_segment_complete(segment.clone());
        self.0.on_segment_complete(segment);
    }
}

use std::cell::RefCell;
use std::io::{self, Read};

use clap::Args;
use serde_json::json;

use crate::app::Runtime;
use crate::errors::CliError;
use crate::output::OutputMode;
use crate::stream::{CompletedSegment, Deliverer, DeliverySink, Pacing, SegmentKind};

#[derive(Debug, Args)]
pub struct AskArgs {
    /// Question text
    pub question: Option<String>,
    /// Persona to ask. Defaults to the profile's `username`
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,
    /// Read the question from stdin
    #[arg(long)]
    pub stdin: bool,
    /// Ask for a multi-part answer
    #[arg(long)]
    pub multi: bool,
    /// Print the answer without typing delays
    #[arg(long = "no-pace")]
    pub no_pace: bool,
}

pub async fn handle(runtime: &Runtime, args: AskArgs) -> Result<(), CliError> {
    let question = resolve_question(&args)?;
    let username = runtime.resolved_username(args.user.as_deref())?;
    let profile = runtime.profile();
    let multi_message = args.multi || profile.multi_message;
    let pacing = if args.no_pace || runtime.output.json {
        Pacing::immediate()
    } else {
        profile.pacing.to_pacing()
    };

    let api = runtime.persona_api()?;
    runtime.output.print_verbose(&format!(
        "asking {username} via {} (multi_message={multi_message})",
        api.base_url()
    ));
    let deliverer = Deliverer::new(api.responder(username.as_str(), multi_message), pacing);

    let echo = RefCell::new(TerminalEcho::new(&runtime.output));
    let delivery = deliverer.deliver(
        &question,
        |text| echo.borrow_mut().on_token(text),
        |segment| echo.borrow_mut().on_segment_complete(segment),
    );
    // Nothing runs in the background, so dropping the delivery stops it.
    tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => {
            echo.borrow_mut().interrupted();
            return Err(CliError::Cancelled("Response cancelled.".to_string()));
        }
        result = delivery => result?,
    }

    if runtime.output.json {
        runtime.output.print_json(&json!({
            "username": username,
            "question": question,
            "segments": echo.into_inner().into_segments(),
        }))?;
    }
    Ok(())
}

/// Writes delivery events to the terminal as they arrive.
pub(crate) struct TerminalEcho<'a> {
    output: &'a OutputMode,
    mid_segment: bool,
    segments: Vec<CompletedSegment>,
}

impl<'a> TerminalEcho<'a> {
    pub(crate) fn new(output: &'a OutputMode) -> Self {
        Self {
            output,
            mid_segment: false,
            segments: Vec::new(),
        }
    }

    pub(crate) fn into_segments(self) -> Vec<CompletedSegment> {
        self.segments
    }

    /// Ends a half-printed line after the delivery was dropped.
    fn interrupted(&mut self) {
        if self.mid_segment {
            self.output.print_human("");
            self.mid_segment = false;
        }
    }
}

impl DeliverySink for TerminalEcho<'_> {
    fn on_token(&mut self, text: &str) {
        self.output.print_inline(text);
        self.mid_segment = true;
    }

    fn on_segment_complete(&mut self, segment: CompletedSegment) {
        if self.mid_segment {
            self.output.print_human("");
        } else {
            // Error and cancel completions arrive without tokens.
            self.output.print_stderr(&segment.text);
        }
        if segment.kind != SegmentKind::Text {
            self.output
                .print_verbose(&format!("(segment kind: {})", segment.kind));
        }
        self.mid_segment = false;
        self.segments.push(segment);
    }
}

fn resolve_question(args: &AskArgs) -> Result<String, CliError> {
    if args.stdin {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| CliError::Generic(format!("Failed reading stdin: {e}")))?;
        return question_from(Some(&input), "No question provided via stdin.");
    }
    question_from(
        args.question.as_deref(),
        "Missing question. Use `pchat ask -u <user> \"...\"` or pass `--stdin`.",
    )
}

fn question_from(raw: Option<&str>, missing: &str) -> Result<String, CliError> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(CliError::Usage(missing.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{AnswerSegment, Responder};
    use std::future::{self, Future};

    struct Canned(Vec<AnswerSegment>);

    impl Responder for Canned {
        fn ask(
            &self,
            _question: &str,
        ) -> impl Future<Output = Result<Vec<AnswerSegment>, CliError>> + Send {
            future::ready(Ok(self.0.clone()))
        }
    }

    fn silent() -> OutputMode {
        OutputMode {
            json: true,
            quiet: false,
            verbose: false,
            debug: false,
        }
    }

    #[test]
    fn question_is_trimmed_and_required() {
        assert_eq!(question_from(Some("  hi \n"), "missing").unwrap(), "hi");
        assert!(matches!(
            question_from(Some("   "), "missing"),
            Err(CliError::Usage(msg)) if msg == "missing"
        ));
        assert!(question_from(None, "missing").is_err());
    }

    #[tokio::test]
    async fn echo_collects_completed_segments_in_order() {
        let output = silent();
        let deliverer = Deliverer::new(
            Canned(vec![
                AnswerSegment::new("pondering", SegmentKind::Thinking),
                AnswerSegment::text("Done."),
            ]),
            Pacing::immediate(),
        );

        let echo = RefCell::new(TerminalEcho::new(&output));
        deliverer
            .deliver(
                "q",
                |text| echo.borrow_mut().on_token(text),
                |segment| echo.borrow_mut().on_segment_complete(segment),
            )
            .await
            .unwrap();
        let segments = echo.into_inner().into_segments();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].kind, SegmentKind::Thinking);
        assert!(!segments[0].is_final);
        assert_eq!(segments[1].text, "Done.");
        assert!(segments[1].is_final);
    }

    #[test]
    fn interrupt_closes_a_half_printed_line_once() {
        let output = silent();
        let mut echo = TerminalEcho::new(&output);
        echo.on_token("Hel");
        assert!(echo.mid_segment);

        echo.interrupted();
        assert!(!echo.mid_segment);
        assert!(echo.into_segments().is_empty());
    }
}

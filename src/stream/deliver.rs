use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::playback::{CompletedSegment, Pacing, Playback, PlaybackEvent};
use super::segment::{AnswerSegment, ERROR_GETTING_RESPONSE, RESPONSE_CANCELLED};
use crate::errors::CliError;

/// Answers a question with the full, ordered list of segments in one call.
pub trait Responder {
    fn ask(
        &self,
        question: &str,
    ) -> impl Future<Output = Result<Vec<AnswerSegment>, CliError>> + Send;
}

/// Receives delivery events. Both methods run on the delivering task.
pub trait DeliverySink {
    fn on_token(&mut self, text: &str);
    fn on_segment_complete(&mut self, segment: CompletedSegment);
}

/// Adapts a pair of closures into a [`DeliverySink`].
pub struct Callbacks<T, C> {
    pub on_token: T,
    pub on_segment_complete: C,
}

impl<T, C> DeliverySink for Callbacks<T, C>
where
    T: FnMut(&str),
    C: FnMut(CompletedSegment),
{
    fn on_token(&mut self, text: &str) {
        (self.on_token)(text)
    }

    fn on_segment_complete(&mut self, segment: CompletedSegment) {
        (self.on_segment_complete)(segment)
    }
}

/// Turns one responder round trip into paced token delivery.
///
/// Every call ends with exactly one final segment completion, whether it
/// succeeds, fails or is cancelled, so a consumer's loading placeholder is
/// always resolved. Callers must not run two deliveries into the same sink
/// concurrently.
#[derive(Debug, Clone)]
pub struct Deliverer<R> {
    responder: R,
    pacing: Pacing,
}

impl<R: Responder> Deliverer<R> {
    pub fn new(responder: R, pacing: Pacing) -> Self {
        Self { responder, pacing }
    }

    pub async fn deliver<T, C>(
        &self,
        question: &str,
        on_token: T,
        on_segment_complete: C,
    ) -> Result<(), CliError>
    where
        T: FnMut(&str),
        C: FnMut(CompletedSegment),
    {
        let mut sink = Callbacks {
            on_token,
            on_segment_complete,
        };
        self.deliver_to(question, &mut sink).await
    }

    pub async fn deliver_to<S>(&self, question: &str, sink: &mut S) -> Result<(), CliError>
    where
        S: DeliverySink + ?Sized,
    {
        self.deliver_with_cancel(question, sink, &CancellationToken::new())
            .await
    }

    /// Like [`deliver_to`](Self::deliver_to), but stops when `cancel` fires.
    ///
    /// On cancellation the in-flight segment is finalized with whatever was
    /// already revealed and `CliError::Cancelled` is returned. A cancel that
    /// lands after the final completion is ignored.
    pub async fn deliver_with_cancel<S>(
        &self,
        question: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), CliError>
    where
        S: DeliverySink + ?Sized,
    {
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                sink.on_segment_complete(CompletedSegment::terminal(RESPONSE_CANCELLED));
                return Err(cancelled());
            }
            answer = self.responder.ask(question) => answer,
        };

        let segments = match answer {
            Ok(segments) => segments,
            Err(err) => {
                tracing::warn!(error = %err, "responder failed");
                sink.on_segment_complete(CompletedSegment::terminal(ERROR_GETTING_RESPONSE));
                return Err(err);
            }
        };
        tracing::info!(segments = segments.len(), "answer received");

        let mut playback = Playback::new(segments, self.pacing);
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if playback.is_complete() {
                        break;
                    }
                    tracing::info!(
                        segment = playback.state().current_segment_index,
                        "delivery cancelled"
                    );
                    if let Some(segment) = playback.interrupt() {
                        sink.on_segment_complete(segment);
                    }
                    return Err(cancelled());
                }
                event = playback.next_event() => event,
            };

            match event {
                Some(PlaybackEvent::Token(text)) => sink.on_token(&text),
                Some(PlaybackEvent::SegmentComplete(segment)) => sink.on_segment_complete(segment),
                None => break,
            }
        }

        Ok(())
    }
}

fn cancelled() -> CliError {
    CliError::Cancelled("Response cancelled.".to_string())
}

//! Client-side pacing of an already-received answer.
//!
//! [`Playback`] is the state machine behind simulated streaming: it walks the
//! segments of one answer and yields tokens and segment boundaries with the
//! configured delays between them. It knows nothing about transport, so a
//! real streaming source can replace it behind the same events.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use super::segment::{
    AnswerSegment, NO_CONTENT_AVAILABLE, NO_RESPONSE_CONTENT, RESPONSE_CANCELLED, SegmentKind,
};
use super::tokenize::split_fragments;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Pause before the first token of every segment.
    pub initial_delay: Duration,
    /// Pause between consecutive tokens of one segment.
    pub token_delay: Duration,
    /// Pause after a non-final segment completes.
    pub segment_pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            token_delay: Duration::from_millis(50),
            segment_pause: Duration::from_millis(1000),
        }
    }
}

impl Pacing {
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            token_delay: Duration::ZERO,
            segment_pause: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SegmentStreaming,
    SegmentComplete,
    SessionComplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackState {
    pub phase: Phase,
    pub current_segment_index: usize,
    /// Tokens emitted so far for the current segment.
    pub accumulated_text: String,
}

impl PlaybackState {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            current_segment_index: 0,
            accumulated_text: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedSegment {
    pub text: String,
    pub kind: SegmentKind,
    pub is_final: bool,
}

impl CompletedSegment {
    /// A final plain-text segment, used for error and cancellation bubbles.
    pub fn terminal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: SegmentKind::Text,
            is_final: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Token(String),
    SegmentComplete(CompletedSegment),
}

#[derive(Debug)]
pub struct Playback {
    segments: Vec<AnswerSegment>,
    pacing: Pacing,
    state: PlaybackState,
    pending: VecDeque<String>,
    /// The answer had no segments and plays a stand-in.
    synthesized: bool,
}

impl Playback {
    /// An empty answer is played as a single "no response content" segment.
    pub fn new(segments: Vec<AnswerSegment>, pacing: Pacing) -> Self {
        let synthesized = segments.is_empty();
        let segments = if synthesized {
            vec![AnswerSegment::text(NO_RESPONSE_CONTENT)]
        } else {
            segments
        };

        Self {
            segments,
            pacing,
            state: PlaybackState::idle(),
            pending: VecDeque::new(),
            synthesized,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state.phase == Phase::SessionComplete
    }

    /// Waits out the pacing delay due at this point and returns the next event.
    ///
    /// State only changes after the wait, so dropping this future mid-delay
    /// leaves the playback where it was.
    pub async fn next_event(&mut self) -> Option<PlaybackEvent> {
        match self.state.phase {
            Phase::Idle => {
                if !self.synthesized {
                    pause(self.pacing.initial_delay).await;
                }
                Some(self.begin_segment(0))
            }
            Phase::SegmentStreaming => {
                if self.pending.is_empty() {
                    return Some(self.complete_segment());
                }
                pause(self.pacing.token_delay).await;
                Some(self.advance())
            }
            Phase::SegmentComplete => {
                pause(self.pacing.segment_pause).await;
                pause(self.pacing.initial_delay).await;
                let next = self.state.current_segment_index + 1;
                Some(self.begin_segment(next))
            }
            Phase::SessionComplete => None,
        }
    }

    /// Ends playback early. Returns the final segment the consumer should
    /// show in place of whatever is still in flight, or `None` when the
    /// session already completed.
    pub fn interrupt(&mut self) -> Option<CompletedSegment> {
        let segment = match self.state.phase {
            Phase::SessionComplete => return None,
            Phase::SegmentStreaming if !self.state.accumulated_text.is_empty() => {
                CompletedSegment {
                    text: self.state.accumulated_text.clone(),
                    kind: self.segments[self.state.current_segment_index].kind.clone(),
                    is_final: true,
                }
            }
            _ => CompletedSegment::terminal(RESPONSE_CANCELLED),
        };

        tracing::debug!(
            index = self.state.current_segment_index,
            revealed = self.state.accumulated_text.len(),
            "playback interrupted"
        );
        self.pending.clear();
        self.state.phase = Phase::SessionComplete;
        Some(segment)
    }

    fn begin_segment(&mut self, index: usize) -> PlaybackEvent {
        let segment = &self.segments[index];
        self.pending = if self.synthesized || segment.text.is_empty() {
            // Stand-in texts are revealed as one fragment.
            VecDeque::from([display_text(segment).to_string()])
        } else {
            split_fragments(&segment.text)
                .into_iter()
                .map(str::to_string)
                .collect()
        };
        self.state = PlaybackState {
            phase: Phase::SegmentStreaming,
            current_segment_index: index,
            accumulated_text: String::new(),
        };
        tracing::debug!(index, fragments = self.pending.len(), "segment started");

        // The first fragment goes out with no token delay.
        self.advance()
    }

    fn advance(&mut self) -> PlaybackEvent {
        match self.pending.pop_front() {
            Some(fragment) => {
                self.state.accumulated_text.push_str(&fragment);
                PlaybackEvent::Token(fragment)
            }
            None => self.complete_segment(),
        }
    }

    fn complete_segment(&mut self) -> PlaybackEvent {
        let index = self.state.current_segment_index;
        let segment = &self.segments[index];
        let text = display_text(segment).to_string();
        if self.state.accumulated_text != text {
            tracing::warn!(
                index,
                expected = text.len(),
                emitted = self.state.accumulated_text.len(),
                "emitted tokens differ from segment text"
            );
        }

        let is_final = index + 1 == self.segments.len();
        self.state.phase = if is_final {
            Phase::SessionComplete
        } else {
            Phase::SegmentComplete
        };
        tracing::debug!(index, is_final, "segment complete");

        PlaybackEvent::SegmentComplete(CompletedSegment {
            text,
            kind: segment.kind.clone(),
            is_final,
        })
    }
}

/// A segment never plays as nothing; empty text shows the placeholder.
fn display_text(segment: &AnswerSegment) -> &str {
    if segment.text.is_empty() {
        NO_CONTENT_AVAILABLE
    } else {
        &segment.text
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration).await;
    }
}

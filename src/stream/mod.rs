// Simulated streaming of persona answers.

pub mod deliver;
pub mod playback;
pub mod segment;
pub mod tokenize;

pub use deliver::{Deliverer, DeliverySink, Responder};
pub use playback::{CompletedSegment, Pacing};
pub use segment::{AnswerSegment, SegmentKind, normalize_response};

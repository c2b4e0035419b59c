use thiserror::Error;

use crate::feedback::domain::feedback_event::{HapticPattern, Priority};

#[derive(Error, Debug)]
pub enum SinkError {
    /// Still delivering an earlier announcement.
    #[error("feedback sink is busy")]
    Busy,
    #[error("feedback sink failed: {0}")]
    Failed(String),
}

/// Speech and haptic output.
///
/// Both calls hand off and return at once; they never wait for the
/// utterance or vibration to finish.
pub trait FeedbackSink: Send {
    fn announce(&mut self, text: &str, priority: Priority, interrupt: bool) -> Result<(), SinkError>;

    fn vibrate(&mut self, pattern: HapticPattern) -> Result<(), SinkError>;
}

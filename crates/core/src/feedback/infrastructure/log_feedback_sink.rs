use crate::feedback::domain::feedback_event::{HapticPattern, Priority};
use crate::feedback::domain::feedback_sink::{FeedbackSink, SinkError};

/// Writes announcements to the log. Never busy.
///
/// Used when no speech command is configured, and as a transcript next to
/// real speech output.
pub struct LogFeedbackSink;

impl FeedbackSink for LogFeedbackSink {
    fn announce(&mut self, text: &str, priority: Priority, interrupt: bool) -> Result<(), SinkError> {
        if interrupt {
            log::warn!("[{priority:?}] {text}");
        } else {
            log::info!("[{priority:?}] {text}");
        }
        Ok(())
    }

    fn vibrate(&mut self, pattern: HapticPattern) -> Result<(), SinkError> {
        log::debug!("Haptic {pattern:?} {:?}", pattern.timings_ms());
        Ok(())
    }
}

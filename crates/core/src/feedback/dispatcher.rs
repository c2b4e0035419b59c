use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::feedback::domain::feedback_event::{FeedbackEvent, Priority};
use crate::feedback::domain::feedback_sink::{FeedbackSink, SinkError};

/// What happened to the events of one dispatch call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub announced: usize,
    pub debounced: usize,
    /// Dropped because the sink was still speaking.
    pub dropped_busy: usize,
    pub failed: usize,
}

/// Hands ranked events to a [`FeedbackSink`], suppressing repeats.
///
/// An event is a repeat when the same debounce key was announced within
/// the window at the same or a higher priority. Nothing is ever queued:
/// once the sink reports busy, the rest of the cycle is dropped.
pub struct FeedbackDispatcher {
    sink: Box<dyn FeedbackSink>,
    window: Duration,
    recent: HashMap<String, (Instant, Priority)>,
}

impl FeedbackDispatcher {
    pub fn new(sink: Box<dyn FeedbackSink>, window: Duration) -> Self {
        Self {
            sink,
            window,
            recent: HashMap::new(),
        }
    }

    pub fn dispatch(&mut self, events: Vec<FeedbackEvent>) -> DispatchReport {
        self.dispatch_at(events, Instant::now())
    }

    pub fn dispatch_at(&mut self, mut events: Vec<FeedbackEvent>, now: Instant) -> DispatchReport {
        let mut report = DispatchReport::default();
        let window = self.window;
        self.recent
            .retain(|_, (at, _)| now.saturating_duration_since(*at) < window);

        events.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut sink_busy = false;
        for event in events {
            if sink_busy {
                report.dropped_busy += 1;
                continue;
            }
            if self.is_repeat(&event, now) {
                log::trace!("Debounced: {}", event.text);
                report.debounced += 1;
                continue;
            }

            match self.sink.announce(&event.text, event.priority, event.interrupts()) {
                Ok(()) => {
                    report.announced += 1;
                    self.recent
                        .insert(event.debounce_key.clone(), (now, event.priority));
                    if let Some(pattern) = event.haptic {
                        if let Err(e) = self.sink.vibrate(pattern) {
                            log::debug!("Haptic {pattern:?} skipped: {e}");
                        }
                    }
                }
                Err(SinkError::Busy) => {
                    log::debug!("Sink busy, dropping \"{}\" and the rest of the cycle", event.text);
                    report.dropped_busy += 1;
                    sink_busy = true;
                }
                Err(e) => {
                    log::warn!("{e}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn is_repeat(&self, event: &FeedbackEvent, now: Instant) -> bool {
        match self.recent.get(&event.debounce_key) {
            Some((at, priority)) => {
                now.saturating_duration_since(*at) < self.window && event.priority <= *priority
            }
            None => false,
        }
    }
}

use std::time::Instant;

/// Announcement urgency, lowest first.
///
/// The variant order is the dispatch order: a higher priority is spoken
/// first and may repeat an announcement still inside its debounce window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Informational,
    Obstacle,
    Person,
    Hazard,
    KnownFace,
    Status,
    /// Something is about to be in the user's path. Interrupts speech.
    Urgent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    ObjectAnnouncement,
    FaceAnnouncement,
    ProximityAlert,
    StatusNotice,
}

/// Vibration patterns as alternating off/on durations in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HapticPattern {
    Urgent,
    Warning,
    Info,
}

impl HapticPattern {
    pub fn timings_ms(self) -> &'static [u64] {
        match self {
            HapticPattern::Urgent => &[0, 100, 50, 100, 50, 100],
            HapticPattern::Warning => &[0, 200, 100, 200],
            HapticPattern::Info => &[0, 150],
        }
    }
}

/// One thing to tell the user.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackEvent {
    pub kind: EventKind,
    /// Already phrased for speech.
    pub text: String,
    pub priority: Priority,
    /// Events sharing a key are debounced against each other.
    pub debounce_key: String,
    pub haptic: Option<HapticPattern>,
    pub frame_sequence: u64,
    /// Capture time of the frame the event was derived from.
    pub captured_at: Instant,
}

impl FeedbackEvent {
    /// A pipeline status message, timestamped `now` so it is never stale.
    pub fn status(text: &str, key: &str, frame_sequence: u64, now: Instant) -> Self {
        Self {
            kind: EventKind::StatusNotice,
            text: text.to_string(),
            priority: Priority::Status,
            debounce_key: format!("status:{key}"),
            haptic: Some(HapticPattern::Warning),
            frame_sequence,
            captured_at: now,
        }
    }

    /// Whether the dispatcher should cut off whatever is being spoken.
    pub fn interrupts(&self) -> bool {
        self.priority == Priority::Urgent
    }
}

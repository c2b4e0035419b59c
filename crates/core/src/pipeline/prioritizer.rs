use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use crate::detection::domain::detection::{Detection, FaceDetection};
use crate::detection::domain::safety_category::SafetyCategory;
use crate::feedback::domain::feedback_event::{EventKind, FeedbackEvent, HapticPattern, Priority};
use crate::feedback::domain::phrasing::{face_phrase, object_phrase, Direction, Proximity};
use crate::recognition::domain::face_matcher::RecognitionResult;
use crate::shared::constants::{CLOSE_PROXIMITY_ZONE, IMMEDIATE_DANGER_ZONE};

pub const DEFAULT_MAX_EVENTS: usize = 3;

/// A face detection paired with what the matcher made of it.
#[derive(Clone, Debug)]
pub struct MatchedFace {
    pub detection: FaceDetection,
    pub recognition: RecognitionResult,
}

/// Merges one cycle's results into the few events worth saying.
///
/// Ranking, highest first: proximity alert, known face, hazard, person,
/// obstacle, informational. Equal priorities go to the larger (closer)
/// box, then to the more confident detection.
pub struct ResultPrioritizer {
    max_events: usize,
}

struct Ranked {
    event: FeedbackEvent,
    relative_size: f64,
    confidence: f64,
}

impl ResultPrioritizer {
    pub fn new(max_events: usize) -> Self {
        Self { max_events }
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    pub fn prioritize(
        &self,
        objects: &[Detection],
        faces: &[MatchedFace],
        captured_at: Instant,
    ) -> Vec<FeedbackEvent> {
        let mut ranked: Vec<Ranked> = closest_per_label(objects)
            .into_iter()
            .map(|d| object_event(d, captured_at))
            .collect();
        ranked.extend(
            closest_per_person(faces)
                .into_iter()
                .map(|(person_id, face)| face_event(person_id, face, captured_at)),
        );

        ranked.sort_by(|a, b| {
            b.event
                .priority
                .cmp(&a.event.priority)
                .then_with(|| descending(a.relative_size, b.relative_size))
                .then_with(|| descending(a.confidence, b.confidence))
        });
        ranked.truncate(self.max_events);
        ranked.into_iter().map(|r| r.event).collect()
    }
}

impl Default for ResultPrioritizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

/// Hazards filling most of the view, and any hazard or obstacle that is
/// close, warrant an interrupting alert.
pub fn is_proximity_alert(category: SafetyCategory, relative_size: f64) -> bool {
    (category == SafetyCategory::Hazard && relative_size > IMMEDIATE_DANGER_ZONE)
        || (category.is_physical_risk() && relative_size > CLOSE_PROXIMITY_ZONE)
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Larger box wins; equal sizes fall back to confidence.
fn is_closer(candidate: f64, candidate_conf: f64, current: f64, current_conf: f64) -> bool {
    candidate > current || (candidate == current && candidate_conf > current_conf)
}

fn closest_per_label(objects: &[Detection]) -> Vec<&Detection> {
    let mut by_label: HashMap<&str, &Detection> = HashMap::new();
    for d in objects {
        by_label
            .entry(d.label.as_str())
            .and_modify(|kept| {
                if is_closer(d.relative_size(), d.confidence, kept.relative_size(), kept.confidence) {
                    *kept = d;
                }
            })
            .or_insert(d);
    }
    by_label.into_values().collect()
}

fn closest_per_person(faces: &[MatchedFace]) -> Vec<(&str, &MatchedFace)> {
    let mut by_person: HashMap<&str, &MatchedFace> = HashMap::new();
    for face in faces {
        let RecognitionResult::Known { person_id, .. } = &face.recognition else {
            continue;
        };
        by_person
            .entry(person_id.as_str())
            .and_modify(|kept| {
                let (d, k) = (&face.detection, &kept.detection);
                if is_closer(d.relative_size(), d.confidence, k.relative_size(), k.confidence) {
                    *kept = face;
                }
            })
            .or_insert(face);
    }
    by_person.into_iter().collect()
}

fn object_event(d: &Detection, captured_at: Instant) -> Ranked {
    let category = d.category();
    let relative_size = d.relative_size();
    let proximity = Proximity::from_relative_size(relative_size);
    let direction = Direction::from_position(d.horizontal_position());

    let (kind, priority, haptic) = if is_proximity_alert(category, relative_size) {
        (EventKind::ProximityAlert, Priority::Urgent, Some(HapticPattern::Urgent))
    } else {
        let (priority, haptic) = match category {
            SafetyCategory::Hazard => (Priority::Hazard, Some(HapticPattern::Warning)),
            SafetyCategory::Person => (Priority::Person, None),
            SafetyCategory::Obstacle => (Priority::Obstacle, None),
            SafetyCategory::Informational => (Priority::Informational, None),
        };
        (EventKind::ObjectAnnouncement, priority, haptic)
    };

    Ranked {
        event: FeedbackEvent {
            kind,
            text: object_phrase(&d.label, proximity, direction),
            priority,
            debounce_key: format!("object:{}", d.label),
            haptic,
            frame_sequence: d.frame_sequence,
            captured_at,
        },
        relative_size,
        confidence: d.confidence,
    }
}

fn face_event(person_id: &str, face: &MatchedFace, captured_at: Instant) -> Ranked {
    let d = &face.detection;
    let direction = Direction::from_position(d.horizontal_position());
    Ranked {
        event: FeedbackEvent {
            kind: EventKind::FaceAnnouncement,
            text: face_phrase(person_id, direction),
            priority: Priority::KnownFace,
            debounce_key: format!("face:{person_id}"),
            haptic: Some(HapticPattern::Info),
            frame_sequence: d.frame_sequence,
            captured_at,
        },
        relative_size: d.relative_size(),
        confidence: d.confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use rstest::rstest;

    const W: u32 = 100;
    const H: u32 = 100;

    /// A square box of `side` pixels centred at horizontal `cx`.
    fn object(label: &str, confidence: f64, cx: f64, side: f64) -> Detection {
        Detection {
            label: label.into(),
            class_id: 0,
            confidence,
            bbox: BoundingBox::from_center(cx, 50.0, side, side),
            frame_sequence: 7,
            frame_width: W,
            frame_height: H,
        }
    }

    fn face(person: Option<&str>, cx: f64, side: f64) -> MatchedFace {
        MatchedFace {
            detection: FaceDetection {
                bbox: BoundingBox::from_center(cx, 50.0, side, side),
                confidence: 0.9,
                embedding: vec![1.0, 0.0],
                frame_sequence: 7,
                frame_width: W,
                frame_height: H,
            },
            recognition: match person {
                Some(id) => RecognitionResult::Known {
                    person_id: id.into(),
                    similarity: 0.82,
                },
                None => RecognitionResult::Unknown,
            },
        }
    }

    fn texts(events: &[FeedbackEvent]) -> Vec<&str> {
        events.iter().map(|e| e.text.as_str()).collect()
    }

    #[rstest]
    #[case(SafetyCategory::Hazard, 0.75, true)]
    #[case(SafetyCategory::Hazard, 0.45, true)]
    #[case(SafetyCategory::Obstacle, 0.45, true)]
    #[case(SafetyCategory::Obstacle, 0.3, false)]
    #[case(SafetyCategory::Person, 0.9, false)]
    #[case(SafetyCategory::Informational, 0.9, false)]
    fn test_proximity_alert_rule(
        #[case] category: SafetyCategory,
        #[case] size: f64,
        #[case] expected: bool,
    ) {
        assert_eq!(is_proximity_alert(category, size), expected);
    }

    #[test]
    fn test_ranking_by_category() {
        let p = ResultPrioritizer::new(10);
        let events = p.prioritize(
            &[
                object("cup", 0.9, 50.0, 10.0),
                object("chair", 0.9, 50.0, 10.0),
                object("person", 0.9, 50.0, 10.0),
                object("car", 0.9, 50.0, 10.0),
            ],
            &[face(Some("Alice"), 50.0, 10.0)],
            Instant::now(),
        );

        assert_eq!(
            events.iter().map(|e| e.priority).collect::<Vec<_>>(),
            vec![
                Priority::KnownFace,
                Priority::Hazard,
                Priority::Person,
                Priority::Obstacle,
                Priority::Informational,
            ]
        );
    }

    #[test]
    fn test_close_obstacle_outranks_known_face() {
        let p = ResultPrioritizer::default();
        let events = p.prioritize(
            &[object("chair", 0.8, 50.0, 70.0)],
            &[face(Some("Alice"), 50.0, 20.0)],
            Instant::now(),
        );

        assert_eq!(events[0].kind, EventKind::ProximityAlert);
        assert_eq!(events[0].priority, Priority::Urgent);
        assert_eq!(events[0].haptic, Some(HapticPattern::Urgent));
        assert_eq!(events[0].text, "chair ahead");
        assert_eq!(events[1].text, "Alice ahead");
    }

    #[test]
    fn test_hazard_filling_view_is_danger() {
        let p = ResultPrioritizer::default();
        let events = p.prioritize(&[object("car", 0.9, 50.0, 90.0)], &[], Instant::now());

        assert_eq!(texts(&events), vec!["Danger! car directly ahead"]);
        assert!(events[0].interrupts());
    }

    #[test]
    fn test_unknown_faces_produce_no_events() {
        let p = ResultPrioritizer::default();
        let events = p.prioritize(&[], &[face(None, 50.0, 40.0)], Instant::now());
        assert!(events.is_empty());
    }

    #[test]
    fn test_duplicate_labels_collapse_to_closest() {
        let p = ResultPrioritizer::default();
        let events = p.prioritize(
            &[
                object("chair", 0.95, 10.0, 10.0),
                object("chair", 0.6, 90.0, 30.0),
            ],
            &[],
            Instant::now(),
        );

        assert_eq!(texts(&events), vec!["chair in the distance to your right"]);
    }

    #[test]
    fn test_same_person_twice_is_announced_once() {
        let p = ResultPrioritizer::default();
        let events = p.prioritize(
            &[],
            &[face(Some("Alice"), 10.0, 10.0), face(Some("Alice"), 50.0, 30.0)],
            Instant::now(),
        );

        assert_eq!(texts(&events), vec!["Alice ahead"]);
        assert_eq!(events[0].debounce_key, "face:Alice");
    }

    #[test]
    fn test_ties_break_by_size_then_confidence() {
        let p = ResultPrioritizer::new(10);
        let events = p.prioritize(
            &[
                object("cup", 0.9, 50.0, 10.0),
                object("book", 0.9, 50.0, 20.0),
                object("laptop", 0.95, 50.0, 10.0),
            ],
            &[],
            Instant::now(),
        );

        assert_eq!(
            texts(&events),
            vec![
                "book in the distance ahead",
                "laptop in the distance ahead",
                "cup in the distance ahead",
            ]
        );
    }

    #[test]
    fn test_keeps_only_top_events() {
        let p = ResultPrioritizer::new(2);
        let events = p.prioritize(
            &[
                object("cup", 0.9, 50.0, 10.0),
                object("chair", 0.9, 50.0, 10.0),
                object("car", 0.9, 50.0, 10.0),
            ],
            &[],
            Instant::now(),
        );

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].debounce_key, "object:car");
        assert_eq!(events[1].debounce_key, "object:chair");
    }

    #[test]
    fn test_events_carry_frame_provenance() {
        let captured_at = Instant::now();
        let p = ResultPrioritizer::default();
        let events = p.prioritize(&[object("chair", 0.9, 50.0, 10.0)], &[], captured_at);

        assert_eq!(events[0].frame_sequence, 7);
        assert_eq!(events[0].captured_at, captured_at);
    }
}

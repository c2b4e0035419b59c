//! Turns detections into short spoken phrases.

use crate::shared::constants::{CLOSE_PROXIMITY_ZONE, IMMEDIATE_DANGER_ZONE};

/// Horizontal centre below this fraction of the width is "left".
const LEFT_BOUNDARY: f64 = 0.3;
/// Horizontal centre above this fraction of the width is "right".
const RIGHT_BOUNDARY: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Left,
    Ahead,
    Right,
}

impl Direction {
    pub fn from_position(horizontal_position: f64) -> Self {
        if horizontal_position < LEFT_BOUNDARY {
            Direction::Left
        } else if horizontal_position > RIGHT_BOUNDARY {
            Direction::Right
        } else {
            Direction::Ahead
        }
    }

    pub fn phrase(self) -> &'static str {
        match self {
            Direction::Left => "to your left",
            Direction::Ahead => "ahead",
            Direction::Right => "to your right",
        }
    }
}

/// Distance estimated from how much of the view an object fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Proximity {
    Distant,
    Close,
    Immediate,
}

impl Proximity {
    pub fn from_relative_size(relative_size: f64) -> Self {
        if relative_size > IMMEDIATE_DANGER_ZONE {
            Proximity::Immediate
        } else if relative_size > CLOSE_PROXIMITY_ZONE {
            Proximity::Close
        } else {
            Proximity::Distant
        }
    }
}

pub fn object_phrase(label: &str, proximity: Proximity, direction: Direction) -> String {
    let dir = direction.phrase();
    match proximity {
        Proximity::Immediate => format!("Danger! {label} directly {dir}"),
        Proximity::Close => format!("{label} {dir}"),
        Proximity::Distant => format!("{label} in the distance {dir}"),
    }
}

pub fn face_phrase(person_id: &str, direction: Direction) -> String {
    format!("{person_id} {}", direction.phrase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, Direction::Left)]
    #[case(0.29, Direction::Left)]
    #[case(0.3, Direction::Ahead)]
    #[case(0.5, Direction::Ahead)]
    #[case(0.7, Direction::Ahead)]
    #[case(0.71, Direction::Right)]
    fn test_direction_from_position(#[case] position: f64, #[case] expected: Direction) {
        assert_eq!(Direction::from_position(position), expected);
    }

    #[rstest]
    #[case(0.05, Proximity::Distant)]
    #[case(0.4, Proximity::Distant)]
    #[case(0.41, Proximity::Close)]
    #[case(0.7, Proximity::Close)]
    #[case(0.75, Proximity::Immediate)]
    fn test_proximity_from_relative_size(#[case] size: f64, #[case] expected: Proximity) {
        assert_eq!(Proximity::from_relative_size(size), expected);
    }

    #[test]
    fn test_object_phrases() {
        assert_eq!(
            object_phrase("car", Proximity::Immediate, Direction::Ahead),
            "Danger! car directly ahead"
        );
        assert_eq!(
            object_phrase("chair", Proximity::Close, Direction::Left),
            "chair to your left"
        );
        assert_eq!(
            object_phrase("cup", Proximity::Distant, Direction::Right),
            "cup in the distance to your right"
        );
    }

    #[test]
    fn test_face_phrase() {
        assert_eq!(face_phrase("Alice", Direction::Ahead), "Alice ahead");
    }
}

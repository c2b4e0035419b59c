/// How much a detected object matters to someone walking without sight.
///
/// Ordered from least to most important, so `max()` picks the most
/// pressing category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SafetyCategory {
    Informational,
    Obstacle,
    Person,
    Hazard,
}

const HAZARDS: &[&str] = &[
    "car",
    "truck",
    "bus",
    "motorcycle",
    "bicycle",
    "train",
    "airplane",
    "boat",
    "knife",
    "scissors",
    "oven",
    "toaster",
    "microwave",
    "horse",
    "cow",
    "elephant",
    "bear",
    "fire hydrant",
    "parking meter",
];

const OBSTACLES: &[&str] = &[
    "chair",
    "couch",
    "dining table",
    "bed",
    "bench",
    "toilet",
    "refrigerator",
    "tv",
    "sink",
    "suitcase",
    "backpack",
    "potted plant",
    "surfboard",
    "skateboard",
    "skis",
    "snowboard",
    "traffic light",
    "stop sign",
    "cat",
    "dog",
    "bird",
    "sheep",
    "zebra",
    "giraffe",
];

/// Hazards must be certain before we warn about them.
const HAZARD_MIN_CONFIDENCE: f64 = 0.60;

/// Small household items are hard to detect; accept weaker evidence.
const INFORMATIONAL_MIN_CONFIDENCE: f64 = 0.35;

impl SafetyCategory {
    pub fn classify(label: &str) -> Self {
        if label == "person" {
            SafetyCategory::Person
        } else if HAZARDS.contains(&label) {
            SafetyCategory::Hazard
        } else if OBSTACLES.contains(&label) {
            SafetyCategory::Obstacle
        } else {
            SafetyCategory::Informational
        }
    }

    /// Minimum detector score for this category, given the detector's
    /// general floor.
    pub fn min_confidence(self, floor: f64) -> f64 {
        match self {
            SafetyCategory::Hazard => HAZARD_MIN_CONFIDENCE,
            SafetyCategory::Informational => INFORMATIONAL_MIN_CONFIDENCE,
            SafetyCategory::Person | SafetyCategory::Obstacle => floor,
        }
    }

    /// Whether an object of this category can block or endanger the user
    /// when it is close.
    pub fn is_physical_risk(self) -> bool {
        matches!(self, SafetyCategory::Hazard | SafetyCategory::Obstacle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::constants::COCO_LABELS;
    use rstest::rstest;

    #[rstest]
    #[case("person", SafetyCategory::Person)]
    #[case("car", SafetyCategory::Hazard)]
    #[case("knife", SafetyCategory::Hazard)]
    #[case("fire hydrant", SafetyCategory::Hazard)]
    #[case("chair", SafetyCategory::Obstacle)]
    #[case("dog", SafetyCategory::Obstacle)]
    #[case("cup", SafetyCategory::Informational)]
    #[case("teddy bear", SafetyCategory::Informational)]
    fn test_classify(#[case] label: &str, #[case] expected: SafetyCategory) {
        assert_eq!(SafetyCategory::classify(label), expected);
    }

    #[test]
    fn test_unknown_label_is_informational() {
        assert_eq!(
            SafetyCategory::classify("hoverboard"),
            SafetyCategory::Informational
        );
    }

    #[test]
    fn test_every_listed_label_is_a_coco_label() {
        for label in HAZARDS.iter().chain(OBSTACLES) {
            assert!(COCO_LABELS.contains(label), "{label} is not a COCO label");
        }
    }

    #[test]
    fn test_ordering_puts_hazard_on_top() {
        assert!(SafetyCategory::Hazard > SafetyCategory::Person);
        assert!(SafetyCategory::Person > SafetyCategory::Obstacle);
        assert!(SafetyCategory::Obstacle > SafetyCategory::Informational);
    }

    #[test]
    fn test_min_confidence_per_category() {
        assert_eq!(SafetyCategory::Hazard.min_confidence(0.45), 0.60);
        assert_eq!(SafetyCategory::Informational.min_confidence(0.45), 0.35);
        assert_eq!(SafetyCategory::Obstacle.min_confidence(0.45), 0.45);
        assert_eq!(SafetyCategory::Person.min_confidence(0.5), 0.5);
    }

    #[test]
    fn test_physical_risk() {
        assert!(SafetyCategory::Hazard.is_physical_risk());
        assert!(SafetyCategory::Obstacle.is_physical_risk());
        assert!(!SafetyCategory::Person.is_physical_risk());
        assert!(!SafetyCategory::Informational.is_physical_risk());
    }
}

pub mod detection;
pub mod face_analyzer;
pub mod object_detector;
pub mod safety_category;

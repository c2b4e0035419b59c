pub mod feedback_event;
pub mod feedback_sink;
pub mod phrasing;

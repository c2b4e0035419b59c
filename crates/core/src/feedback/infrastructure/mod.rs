pub mod command_speech_sink;
pub mod log_feedback_sink;
pub mod threaded_feedback_sink;

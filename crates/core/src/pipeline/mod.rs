pub mod coordinator;
pub mod cycle_state;
pub mod pipeline_logger;
pub mod prioritizer;

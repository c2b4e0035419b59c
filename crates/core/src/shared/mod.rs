pub mod bounding_box;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod latest_slot;
pub mod model_resolver;

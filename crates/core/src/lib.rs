pub mod capture;
pub mod detection;
pub mod feedback;
pub mod inference;
pub mod pipeline;
pub mod recognition;
pub mod shared;

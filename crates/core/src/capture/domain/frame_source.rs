use std::time::Duration;

use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The camera produced nothing within its stall budget. Recoverable.
    #[error("camera stalled for {0:?}")]
    Stalled(Duration),
    /// A finite source (file replay) has no more frames.
    #[error("frame source ended")]
    Ended,
    #[error("frame source failed: {0}")]
    Failed(String),
}

/// Pull-based camera interface.
///
/// Implementations must not block indefinitely: a camera that stops
/// delivering reports [`CaptureError::Stalled`] instead of hanging.
/// Sequence numbers and capture timestamps are assigned by the source.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}

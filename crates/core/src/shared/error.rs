use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy of the perception pipeline.
///
/// Everything except `ModelLoad` is recoverable: the coordinator aborts the
/// current cycle, logs, and carries on.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("frame source stalled after {0:?} without a frame")]
    SourceStalled(Duration),
    #[error("inference exceeded its {budget:?} budget on frame {sequence}")]
    InferenceTimeout { sequence: u64, budget: Duration },
    #[error("inference failed on frame {sequence}: {message}")]
    InferenceFailed { sequence: u64, message: String },
    #[error("failed to load model {model}: {message}")]
    ModelLoad { model: String, message: String },
    #[error("failed to persist face gallery: {0}")]
    GalleryPersistence(String),
}

impl PipelineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::InferenceTimeout { .. })
    }

    /// Only a model that never loaded prevents the pipeline from running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::ModelLoad { .. })
    }
}

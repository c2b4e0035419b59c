use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::detection::domain::detection::{Detection, FaceDetection};
use crate::detection::domain::face_analyzer::FaceAnalyzer;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference on frame {sequence} exceeded {budget:?}")]
    Timeout { sequence: u64, budget: Duration },
    #[error("{model} failed on frame {sequence}: {message}")]
    Failed {
        model: &'static str,
        sequence: u64,
        message: String,
    },
    #[error("{model} worker stopped")]
    Stopped { model: &'static str, sequence: u64 },
    #[error("failed to spawn {model} worker: {source}")]
    Spawn {
        model: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl From<InferenceError> for PipelineError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::Timeout { sequence, budget } => {
                PipelineError::InferenceTimeout { sequence, budget }
            }
            InferenceError::Failed {
                sequence, message, ..
            } => PipelineError::InferenceFailed { sequence, message },
            InferenceError::Stopped { model, sequence } => PipelineError::InferenceFailed {
                sequence,
                message: format!("{model} worker stopped"),
            },
            InferenceError::Spawn { model, source } => PipelineError::ModelLoad {
                model: model.to_string(),
                message: source.to_string(),
            },
        }
    }
}

/// Results of one frame, already filtered by the confidence threshold.
#[derive(Clone, Debug, Default)]
pub struct InferenceOutput {
    pub sequence: u64,
    pub objects: Vec<Detection>,
    pub faces: Vec<FaceDetection>,
    /// Detections dropped for falling below the confidence threshold.
    pub rejected: usize,
}

/// Runs the loaded models on dedicated threads with per-call deadlines.
///
/// Each model is owned by exactly one worker and serves one request at a
/// time. A worker still busy with a timed-out frame is never handed a
/// second one; the engine waits for it only until the new deadline.
pub struct InferenceEngine {
    objects: ModelWorker<Vec<Detection>>,
    faces: Option<ModelWorker<Vec<FaceDetection>>>,
    confidence: f64,
}

impl InferenceEngine {
    pub fn start(
        mut object_detector: Box<dyn ObjectDetector>,
        face_analyzer: Option<Box<dyn FaceAnalyzer>>,
        confidence: f64,
    ) -> Result<Self, InferenceError> {
        let objects = ModelWorker::spawn("object-detector", move |frame: &Frame| {
            object_detector
                .detect_objects(frame)
                .map_err(|e| e.to_string())
        })?;
        let faces = match face_analyzer {
            Some(mut analyzer) => Some(ModelWorker::spawn("face-analyzer", move |frame: &Frame| {
                analyzer.detect_faces(frame).map_err(|e| e.to_string())
            })?),
            None => None,
        };
        Ok(Self {
            objects,
            faces,
            confidence,
        })
    }

    /// Runs every model on `frame`, all within one shared `timeout`.
    ///
    /// Either every model answers in time or the call fails; partial
    /// results are never returned.
    pub fn infer(
        &mut self,
        frame: Arc<Frame>,
        timeout: Duration,
    ) -> Result<InferenceOutput, InferenceError> {
        let sequence = frame.sequence();
        let deadline = Instant::now() + timeout;
        let timed_out = || InferenceError::Timeout {
            sequence,
            budget: timeout,
        };

        if !self.objects.submit(frame.clone(), deadline)? {
            return Err(timed_out());
        }
        if let Some(faces) = self.faces.as_mut() {
            if !faces.submit(frame, deadline)? {
                return Err(timed_out());
            }
        }

        let objects = self.objects.collect(sequence, deadline)?.ok_or_else(timed_out)?;
        let faces = match self.faces.as_mut() {
            Some(worker) => worker.collect(sequence, deadline)?.ok_or_else(timed_out)?,
            None => Vec::new(),
        };

        Ok(self.filter(sequence, objects, faces))
    }

    fn filter(
        &self,
        sequence: u64,
        mut objects: Vec<Detection>,
        mut faces: Vec<FaceDetection>,
    ) -> InferenceOutput {
        let before = objects.len() + faces.len();
        objects.retain(|d| d.confidence >= self.confidence);
        faces.retain(|f| f.confidence >= self.confidence);
        let rejected = before - objects.len() - faces.len();
        if rejected > 0 {
            log::debug!("Frame {sequence}: {rejected} detection(s) below confidence threshold");
        }
        InferenceOutput {
            sequence,
            objects,
            faces,
            rejected,
        }
    }

    /// Stops the workers, waiting for any in-flight call to finish.
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        self.objects.stop();
        if let Some(faces) = self.faces.as_mut() {
            faces.stop();
        }
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

struct Reply<R> {
    sequence: u64,
    result: Result<R, String>,
}

/// One model behind a thread, with at most one request outstanding.
struct ModelWorker<R> {
    name: &'static str,
    requests: Option<Sender<Arc<Frame>>>,
    replies: Receiver<Reply<R>>,
    in_flight: Option<u64>,
    handle: Option<JoinHandle<()>>,
}

impl<R: Send + 'static> ModelWorker<R> {
    fn spawn<F>(name: &'static str, mut run: F) -> Result<Self, InferenceError>
    where
        F: FnMut(&Frame) -> Result<R, String> + Send + 'static,
    {
        let (request_tx, request_rx) = bounded::<Arc<Frame>>(1);
        let (reply_tx, reply_rx) = bounded::<Reply<R>>(1);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for frame in request_rx {
                    let started = Instant::now();
                    let result = run(&frame);
                    log::trace!(
                        "{name} finished frame {} in {:.1}ms",
                        frame.sequence(),
                        started.elapsed().as_secs_f64() * 1000.0
                    );
                    let reply = Reply {
                        sequence: frame.sequence(),
                        result,
                    };
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
            })
            .map_err(|source| InferenceError::Spawn {
                model: name,
                source,
            })?;

        Ok(Self {
            name,
            requests: Some(request_tx),
            replies: reply_rx,
            in_flight: None,
            handle: Some(handle),
        })
    }

    /// Hands `frame` to the worker. Returns `false` when the worker is still
    /// busy with an earlier frame at `deadline`.
    fn submit(&mut self, frame: Arc<Frame>, deadline: Instant) -> Result<bool, InferenceError> {
        let sequence = frame.sequence();
        if let Some(stale) = self.in_flight {
            match self.replies.recv_deadline(deadline) {
                Ok(reply) => {
                    log::debug!(
                        "Discarding late {} result for frame {} (waited on by {stale})",
                        self.name,
                        reply.sequence
                    );
                    self.in_flight = None;
                }
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => return Err(self.stopped(sequence)),
            }
        }

        let sent = match &self.requests {
            Some(requests) => requests.send(frame).is_ok(),
            None => false,
        };
        if !sent {
            return Err(self.stopped(sequence));
        }
        self.in_flight = Some(sequence);
        Ok(true)
    }

    /// Waits for the reply to `sequence`. `Ok(None)` means the deadline
    /// passed; the request stays in flight and its result will be dropped.
    fn collect(&mut self, sequence: u64, deadline: Instant) -> Result<Option<R>, InferenceError> {
        loop {
            match self.replies.recv_deadline(deadline) {
                Ok(reply) if reply.sequence == sequence => {
                    self.in_flight = None;
                    return reply.result.map(Some).map_err(|message| InferenceError::Failed {
                        model: self.name,
                        sequence,
                        message,
                    });
                }
                Ok(reply) => {
                    log::debug!("Discarding late {} result for frame {}", self.name, reply.sequence);
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(self.stopped(sequence)),
            }
        }
    }

    fn stopped(&self, sequence: u64) -> InferenceError {
        InferenceError::Stopped {
            model: self.name,
            sequence,
        }
    }

    fn stop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{} worker panicked", self.name);
            }
        }
    }
}

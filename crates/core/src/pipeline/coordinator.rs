use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detection::domain::detection::FaceDetection;
use crate::feedback::dispatcher::{DispatchReport, FeedbackDispatcher};
use crate::feedback::domain::feedback_event::FeedbackEvent;
use crate::inference::engine::InferenceEngine;
use crate::pipeline::cycle_state::CycleState;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::prioritizer::{MatchedFace, ResultPrioritizer};
use crate::recognition::domain::face_matcher::FaceMatcher;
use crate::recognition::domain::gallery::FaceGallery;
use crate::shared::config::PipelineConfig;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::latest_slot::{LatestSlot, SlotTake};

const DEGRADED_NOTICE: &str = "Detection temporarily unavailable";
const RESTORED_NOTICE: &str = "Detection restored";

/// What one completed cycle produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sequence: u64,
    /// Events handed to the dispatcher, status notices included.
    pub events: usize,
    /// Events dropped because their frame outlived the cycle budget.
    pub stale: usize,
    pub dispatch: DispatchReport,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// The cycle ended early and nothing from its frame was announced.
    Aborted(PipelineError),
    /// The frame source is gone; no further cycles will run.
    SourceClosed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames the source delivered.
    pub frames: u64,
    pub cycles: u64,
    pub completed: u64,
    /// Announcements the sink accepted.
    pub dispatched: u64,
    pub aborted: u64,
    pub timeouts: u64,
    pub stalls: u64,
    pub failures: u64,
    /// Frames replaced in the slot before the coordinator took them.
    pub superseded: u64,
    pub stale: u64,
    /// Detections below the confidence threshold.
    pub rejected: u64,
}

/// Drives the perception cycle on the calling thread:
/// `Idle → CapturingFrame → Inferring → Matching → Dispatching → Idle`.
///
/// Frames arrive through a [`LatestSlot`], so while a frame is being
/// inferred newer frames replace each other and at most one waits. Any
/// stage failure aborts the cycle without announcing partial results.
pub struct PipelineCoordinator {
    frames: Arc<LatestSlot<Frame>>,
    engine: InferenceEngine,
    gallery: Arc<FaceGallery>,
    matcher: Box<dyn FaceMatcher>,
    prioritizer: ResultPrioritizer,
    dispatcher: FeedbackDispatcher,
    logger: Box<dyn PipelineLogger>,
    stall_timeout: Duration,
    inference_timeout: Duration,
    cycle_budget: Duration,
    degraded_after: u32,
    state: CycleState,
    consecutive_timeouts: u32,
    degraded: bool,
    /// Degraded, but the sink has not yet accepted the notice.
    degraded_unannounced: bool,
    stats: PipelineStats,
}

impl PipelineCoordinator {
    pub fn new(
        config: &PipelineConfig,
        frames: Arc<LatestSlot<Frame>>,
        engine: InferenceEngine,
        gallery: Arc<FaceGallery>,
        matcher: Box<dyn FaceMatcher>,
        dispatcher: FeedbackDispatcher,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            frames,
            engine,
            gallery,
            matcher,
            prioritizer: ResultPrioritizer::new(config.max_feedback_events_per_cycle),
            dispatcher,
            logger,
            stall_timeout: config.source_stall_timeout(),
            inference_timeout: config.inference_timeout(),
            cycle_budget: config.cycle_budget(),
            degraded_after: config.degraded_after_timeouts.max(1),
            state: CycleState::Idle,
            consecutive_timeouts: 0,
            degraded: false,
            degraded_unannounced: false,
            stats: PipelineStats::default(),
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames: self.frames.published(),
            superseded: self.frames.superseded(),
            ..self.stats
        }
    }

    /// Runs cycles until the source closes or `cancelled` is set.
    pub fn run(&mut self, cancelled: &AtomicBool) -> PipelineStats {
        while !cancelled.load(Ordering::Relaxed) {
            if let CycleOutcome::SourceClosed = self.run_cycle() {
                self.logger.info("Frame source closed");
                break;
            }
        }
        self.logger.summary();
        self.stats()
    }

    /// Runs one full cycle and returns to `Idle`.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.enter(CycleState::CapturingFrame);
        let waited = Instant::now();
        let frame = match self.frames.take_timeout(self.stall_timeout) {
            SlotTake::Value(frame) => Arc::new(frame),
            SlotTake::TimedOut | SlotTake::Stalled => {
                return self.abort(PipelineError::SourceStalled(waited.elapsed()));
            }
            SlotTake::Closed => {
                self.enter(CycleState::Idle);
                return CycleOutcome::SourceClosed;
            }
        };
        self.logger.timing(CycleState::CapturingFrame.stage(), ms(waited.elapsed()));
        self.logger
            .metric("frame_age_ms", ms(frame.age_at(Instant::now())));

        self.enter(CycleState::Inferring);
        let started = Instant::now();
        let result = self.engine.infer(frame.clone(), self.inference_timeout);
        self.logger.timing(CycleState::Inferring.stage(), ms(started.elapsed()));
        let output = match result {
            Ok(output) => output,
            Err(e) => return self.abort(e.into()),
        };
        self.stats.rejected += output.rejected as u64;
        self.logger.metric("objects", output.objects.len() as f64);
        self.logger.metric("faces", output.faces.len() as f64);

        let mut events = Vec::new();
        self.consecutive_timeouts = 0;
        if self.degraded {
            self.degraded = false;
            self.degraded_unannounced = false;
            self.logger.info(RESTORED_NOTICE);
            events.push(FeedbackEvent::status(
                RESTORED_NOTICE,
                "restored",
                frame.sequence(),
                Instant::now(),
            ));
        }

        self.enter(CycleState::Matching);
        let started = Instant::now();
        let faces = self.match_faces(output.faces);
        self.logger.timing(CycleState::Matching.stage(), ms(started.elapsed()));
        let ranked = self
            .prioritizer
            .prioritize(&output.objects, &faces, frame.captured_at());

        self.enter(CycleState::Dispatching);
        let now = Instant::now();
        let before = ranked.len();
        let fresh: Vec<FeedbackEvent> = ranked
            .into_iter()
            .filter(|e| now.saturating_duration_since(e.captured_at) <= self.cycle_budget)
            .collect();
        let stale = before - fresh.len();
        if stale > 0 {
            log::debug!("Frame {}: dropped {stale} stale event(s)", frame.sequence());
        }
        events.extend(fresh);
        CycleOutcome::Completed(self.finish(frame.sequence(), events, stale, now))
    }

    /// Stops the inference workers.
    pub fn shutdown(self) {
        self.engine.shutdown();
    }

    fn match_faces(&self, faces: Vec<FaceDetection>) -> Vec<MatchedFace> {
        if faces.is_empty() {
            return Vec::new();
        }
        let snapshot = self.gallery.snapshot();
        faces
            .into_iter()
            .map(|detection| {
                let recognition = self.matcher.match_face(&detection, &snapshot);
                MatchedFace {
                    detection,
                    recognition,
                }
            })
            .collect()
    }

    fn finish(
        &mut self,
        sequence: u64,
        events: Vec<FeedbackEvent>,
        stale: usize,
        now: Instant,
    ) -> CycleReport {
        let count = events.len();
        let started = Instant::now();
        let dispatch = self.dispatcher.dispatch_at(events, now);
        self.logger.timing(CycleState::Dispatching.stage(), ms(started.elapsed()));

        self.stats.cycles += 1;
        self.stats.completed += 1;
        self.stats.dispatched += dispatch.announced as u64;
        self.stats.stale += stale as u64;
        self.logger.cycle(self.stats.cycles);
        self.enter(CycleState::Idle);

        CycleReport {
            sequence,
            events: count,
            stale,
            dispatch,
        }
    }

    fn abort(&mut self, error: PipelineError) -> CycleOutcome {
        log::warn!("Cycle aborted: {error}");
        self.stats.cycles += 1;
        self.stats.aborted += 1;

        match &error {
            PipelineError::InferenceTimeout { sequence, .. } => {
                self.stats.timeouts += 1;
                self.logger.count("aborted.timeout");
                self.consecutive_timeouts += 1;
                if !self.degraded && self.consecutive_timeouts >= self.degraded_after {
                    self.degraded = true;
                    self.degraded_unannounced = true;
                    self.logger.info(DEGRADED_NOTICE);
                }
                if self.degraded_unannounced {
                    self.announce_degraded(*sequence);
                }
            }
            PipelineError::SourceStalled(_) => {
                self.stats.stalls += 1;
                self.logger.count("aborted.stall");
            }
            _ => {
                self.stats.failures += 1;
                self.logger.count("aborted.failure");
            }
        }

        self.logger.cycle(self.stats.cycles);
        self.enter(CycleState::Idle);
        CycleOutcome::Aborted(error)
    }

    /// Retried on every timeout until the sink accepts it.
    fn announce_degraded(&mut self, sequence: u64) {
        let now = Instant::now();
        let notice = FeedbackEvent::status(DEGRADED_NOTICE, "degraded", sequence, now);
        let report = self.dispatcher.dispatch_at(vec![notice], now);
        self.stats.dispatched += report.announced as u64;
        self.degraded_unannounced = report.announced == 0;
        if self.degraded_unannounced {
            log::debug!("Degraded notice not delivered, retrying on the next timeout");
        }
    }

    fn enter(&mut self, state: CycleState) {
        log::trace!("{:?} -> {state:?}", self.state);
        self.state = state;
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::shared::frame::Frame;
use crate::shared::latest_slot::LatestSlot;

/// Drives a [`FrameSource`] on its own thread at the target rate and hands
/// frames to the coordinator through a latest-wins slot.
///
/// The pump never waits for the consumer: a frame nobody took before the
/// next one arrives is simply replaced.
pub struct FramePump {
    handle: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
    slot: Arc<LatestSlot<Frame>>,
}

impl FramePump {
    pub fn spawn(
        source: Box<dyn FrameSource>,
        slot: Arc<LatestSlot<Frame>>,
        target_fps: u32,
    ) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let interval = Duration::from_secs_f64(1.0 / target_fps.max(1) as f64);
        let handle = {
            let slot = slot.clone();
            let cancelled = cancelled.clone();
            thread::Builder::new()
                .name("frame-pump".into())
                .spawn(move || pump(source, &slot, interval, &cancelled))
                .ok()
        };
        if handle.is_none() {
            log::error!("Failed to spawn frame pump thread");
            slot.close();
        }
        Self {
            handle,
            cancelled,
            slot,
        }
    }

    /// Stops the producer thread and closes the slot.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.slot.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Frame pump thread panicked");
            }
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pump(
    mut source: Box<dyn FrameSource>,
    slot: &LatestSlot<Frame>,
    interval: Duration,
    cancelled: &AtomicBool,
) {
    let mut next_tick = Instant::now();
    while !cancelled.load(Ordering::Relaxed) {
        match source.next_frame() {
            Ok(frame) => {
                if let Some(dropped) = slot.publish(frame) {
                    log::trace!("Frame {} superseded before pickup", dropped.sequence());
                }
            }
            Err(CaptureError::Stalled(waited)) => {
                log::warn!("Camera stalled ({waited:?} without a frame)");
                slot.mark_stalled();
            }
            Err(CaptureError::Ended) => {
                log::info!("Frame source ended");
                break;
            }
            Err(e) => {
                log::error!("{e}");
                break;
            }
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            // Running behind; don't try to catch up with a burst.
            next_tick = now;
        }
    }
    slot.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::latest_slot::SlotTake;
    use std::collections::VecDeque;

    struct ScriptedSource {
        script: VecDeque<Result<Frame, CaptureError>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Frame, CaptureError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Frame, CaptureError> {
            self.script.pop_front().unwrap_or(Err(CaptureError::Ended))
        }
    }

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![0u8; 3], 1, 1, 3, sequence)
    }

    fn drain(slot: &LatestSlot<Frame>) -> (Vec<u64>, usize) {
        let mut seen = Vec::new();
        let mut stalls = 0;
        loop {
            match slot.take_timeout(Duration::from_secs(5)) {
                SlotTake::Value(f) => seen.push(f.sequence()),
                SlotTake::Stalled => stalls += 1,
                SlotTake::TimedOut | SlotTake::Closed => return (seen, stalls),
            }
        }
    }

    #[test]
    fn test_pump_closes_slot_when_source_ends() {
        let slot = Arc::new(LatestSlot::new());
        let source = ScriptedSource::new(vec![Ok(frame(0)), Ok(frame(1)), Ok(frame(2))]);
        let pump = FramePump::spawn(Box::new(source), slot.clone(), 200);

        let (seen, _) = drain(&slot);
        pump.stop();

        assert!(slot.is_closed());
        assert_eq!(seen.last(), Some(&2));
        assert_eq!(slot.published(), 3);
    }

    #[test]
    fn test_pump_reports_stall_to_consumer() {
        let slot = Arc::new(LatestSlot::new());
        let source = ScriptedSource::new(vec![
            Err(CaptureError::Stalled(Duration::from_millis(500))),
            Err(CaptureError::Ended),
        ]);
        let pump = FramePump::spawn(Box::new(source), slot.clone(), 10);

        // The stall is raised before the source ends on the next tick.
        assert!(matches!(
            slot.take_timeout(Duration::from_secs(5)),
            SlotTake::Stalled
        ));
        pump.stop();
    }

    #[test]
    fn test_pump_stops_on_failure() {
        let slot = Arc::new(LatestSlot::new());
        let source = ScriptedSource::new(vec![Err(CaptureError::Failed("unplugged".into()))]);
        let pump = FramePump::spawn(Box::new(source), slot.clone(), 100);

        let (seen, _) = drain(&slot);
        pump.stop();

        assert!(seen.is_empty());
        assert!(slot.is_closed());
    }

    #[test]
    fn test_stop_interrupts_endless_source() {
        struct Endless(u64);
        impl FrameSource for Endless {
            fn next_frame(&mut self) -> Result<Frame, CaptureError> {
                self.0 += 1;
                Ok(frame(self.0))
            }
        }

        let slot = Arc::new(LatestSlot::new());
        let pump = FramePump::spawn(Box::new(Endless(0)), slot.clone(), 100);
        thread::sleep(Duration::from_millis(50));
        pump.stop();

        assert!(slot.is_closed());
        assert!(slot.published() > 0);
    }
}

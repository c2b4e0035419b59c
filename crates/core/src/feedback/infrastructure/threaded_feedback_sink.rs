use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

use crate::feedback::domain::feedback_event::{HapticPattern, Priority};
use crate::feedback::domain::feedback_sink::{FeedbackSink, SinkError};

struct Utterance {
    text: String,
    priority: Priority,
    interrupt: bool,
}

/// Runs a blocking sink on its own thread behind one-slot handoffs.
///
/// While the inner sink is speaking, further announcements report busy.
/// An interrupting announcement may take the single waiting slot so it is
/// spoken as soon as the current one ends.
pub struct ThreadedFeedbackSink {
    utterances: Option<Sender<Utterance>>,
    vibrations: Option<Sender<HapticPattern>>,
    speaking: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadedFeedbackSink {
    pub fn spawn(inner: Box<dyn FeedbackSink>) -> std::io::Result<Self> {
        let (utterance_tx, utterance_rx) = bounded::<Utterance>(1);
        let (vibration_tx, vibration_rx) = bounded::<HapticPattern>(1);
        let speaking = Arc::new(AtomicBool::new(false));

        let handle = {
            let speaking = speaking.clone();
            thread::Builder::new()
                .name("feedback-sink".into())
                .spawn(move || run(inner, utterance_rx, vibration_rx, &speaking))?
        };

        Ok(Self {
            utterances: Some(utterance_tx),
            vibrations: Some(vibration_tx),
            speaking,
            handle: Some(handle),
        })
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    fn shutdown(&mut self) {
        self.utterances = None;
        self.vibrations = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Feedback sink thread panicked");
            }
        }
    }
}

impl Drop for ThreadedFeedbackSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl FeedbackSink for ThreadedFeedbackSink {
    fn announce(&mut self, text: &str, priority: Priority, interrupt: bool) -> Result<(), SinkError> {
        if self.is_speaking() && !interrupt {
            return Err(SinkError::Busy);
        }
        let Some(utterances) = &self.utterances else {
            return Err(SinkError::Failed("feedback sink stopped".into()));
        };
        let utterance = Utterance {
            text: text.to_string(),
            priority,
            interrupt,
        };
        match utterances.try_send(utterance) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::Busy),
            Err(TrySendError::Disconnected(_)) => {
                Err(SinkError::Failed("feedback sink stopped".into()))
            }
        }
    }

    fn vibrate(&mut self, pattern: HapticPattern) -> Result<(), SinkError> {
        let Some(vibrations) = &self.vibrations else {
            return Err(SinkError::Failed("feedback sink stopped".into()));
        };
        match vibrations.try_send(pattern) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::Busy),
            Err(TrySendError::Disconnected(_)) => {
                Err(SinkError::Failed("feedback sink stopped".into()))
            }
        }
    }
}

fn run(
    mut inner: Box<dyn FeedbackSink>,
    utterances: Receiver<Utterance>,
    vibrations: Receiver<HapticPattern>,
    speaking: &AtomicBool,
) {
    loop {
        select! {
            recv(utterances) -> msg => match msg {
                Ok(u) => {
                    speaking.store(true, Ordering::Release);
                    if let Err(e) = inner.announce(&u.text, u.priority, u.interrupt) {
                        log::warn!("{e}");
                    }
                    speaking.store(false, Ordering::Release);
                }
                Err(_) => break,
            },
            recv(vibrations) -> msg => match msg {
                Ok(pattern) => {
                    if let Err(e) = inner.vibrate(pattern) {
                        log::debug!("{e}");
                    }
                }
                Err(_) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Blocks each announcement until the test releases it.
    struct GatedSink {
        gate: Receiver<()>,
        spoken: Sender<String>,
    }

    impl FeedbackSink for GatedSink {
        fn announce(&mut self, text: &str, _priority: Priority, _interrupt: bool) -> Result<(), SinkError> {
            let _ = self.gate.recv();
            let _ = self.spoken.send(text.to_string());
            Ok(())
        }

        fn vibrate(&mut self, _pattern: HapticPattern) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn gated() -> (ThreadedFeedbackSink, Sender<()>, Receiver<String>) {
        let (gate_tx, gate_rx) = bounded(8);
        let (spoken_tx, spoken_rx) = bounded(8);
        let sink = ThreadedFeedbackSink::spawn(Box::new(GatedSink {
            gate: gate_rx,
            spoken: spoken_tx,
        }))
        .unwrap();
        (sink, gate_tx, spoken_rx)
    }

    fn wait_until_speaking(sink: &ThreadedFeedbackSink) {
        for _ in 0..500 {
            if sink.is_speaking() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("sink never started speaking");
    }

    #[test]
    fn test_busy_while_speaking() {
        let (mut sink, gate, spoken) = gated();

        sink.announce("chair ahead", Priority::Obstacle, false).unwrap();
        wait_until_speaking(&sink);

        assert!(matches!(
            sink.announce("cup ahead", Priority::Informational, false),
            Err(SinkError::Busy)
        ));

        gate.send(()).unwrap();
        assert_eq!(spoken.recv_timeout(Duration::from_secs(5)).unwrap(), "chair ahead");
    }

    #[test]
    fn test_interrupt_takes_waiting_slot_once() {
        let (mut sink, gate, spoken) = gated();

        sink.announce("chair ahead", Priority::Obstacle, false).unwrap();
        wait_until_speaking(&sink);

        sink.announce("Danger! car directly ahead", Priority::Urgent, true)
            .unwrap();
        assert!(matches!(
            sink.announce("Danger! bus directly ahead", Priority::Urgent, true),
            Err(SinkError::Busy)
        ));

        gate.send(()).unwrap();
        gate.send(()).unwrap();
        assert_eq!(spoken.recv_timeout(Duration::from_secs(5)).unwrap(), "chair ahead");
        assert_eq!(
            spoken.recv_timeout(Duration::from_secs(5)).unwrap(),
            "Danger! car directly ahead"
        );
    }

    #[test]
    fn test_drop_joins_worker() {
        let (mut sink, gate, _spoken) = gated();
        sink.announce("chair ahead", Priority::Obstacle, false).unwrap();
        gate.send(()).unwrap();
        drop(sink);
    }
}

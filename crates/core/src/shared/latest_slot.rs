use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Outcome of waiting on a [`LatestSlot`].
#[derive(Debug, PartialEq)]
pub enum SlotTake<T> {
    Value(T),
    /// No value arrived before the deadline.
    TimedOut,
    /// The producer reported it cannot currently deliver.
    Stalled,
    /// The producer is gone and the slot is empty.
    Closed,
}

/// Single-slot "latest value wins" handoff between two threads.
///
/// Producers never block: publishing replaces any value the consumer has
/// not taken yet. Consumers therefore see at most one stale value, which
/// bounds backlog at one regardless of how slow they are.
pub struct LatestSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

struct SlotState<T> {
    value: Option<T>,
    stalled: bool,
    closed: bool,
    published: u64,
    superseded: u64,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                stalled: false,
                closed: false,
                published: 0,
                superseded: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Stores `value`, returning the unconsumed value it replaced.
    ///
    /// Publishing after `close` drops the value.
    pub fn publish(&self, value: T) -> Option<T> {
        let mut state = self.lock();
        if state.closed {
            return Some(value);
        }
        state.published += 1;
        state.stalled = false;
        let previous = state.value.replace(value);
        if previous.is_some() {
            state.superseded += 1;
        }
        drop(state);
        self.ready.notify_all();
        previous
    }

    /// Raises the stall flag; the next waiting `take_timeout` returns
    /// [`SlotTake::Stalled`] unless a value arrives first.
    pub fn mark_stalled(&self) {
        self.lock().stalled = true;
        self.ready.notify_all();
    }

    /// Stops accepting values. A value already in the slot can still be taken.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn try_take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Waits up to `timeout` for a value.
    pub fn take_timeout(&self, timeout: Duration) -> SlotTake<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(value) = state.value.take() {
                return SlotTake::Value(value);
            }
            if state.closed {
                return SlotTake::Closed;
            }
            if state.stalled {
                state.stalled = false;
                return SlotTake::Stalled;
            }
            let now = Instant::now();
            if now >= deadline {
                return SlotTake::TimedOut;
            }
            state = match self.ready.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Waits until a value arrives or the slot closes.
    pub fn take_blocking(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(value) = state.value.take() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            state = match self.ready.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Total values accepted by `publish`.
    pub fn published(&self) -> u64 {
        self.lock().published
    }

    /// Values replaced before anyone took them.
    pub fn superseded(&self) -> u64 {
        self.lock().superseded
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        // Every update under this lock is a plain field assignment, so a
        // poisoned guard still holds consistent state.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_publish_then_take() {
        let slot = LatestSlot::new();
        assert!(slot.publish(1).is_none());
        assert_eq!(slot.take_timeout(Duration::from_millis(10)), SlotTake::Value(1));
    }

    #[test]
    fn test_newer_value_supersedes_pending() {
        let slot = LatestSlot::new();
        slot.publish(1);
        assert_eq!(slot.publish(2), Some(1));
        assert_eq!(slot.publish(3), Some(2));

        assert_eq!(slot.try_take(), Some(3));
        assert_eq!(slot.try_take(), None);
        assert_eq!(slot.published(), 3);
        assert_eq!(slot.superseded(), 2);
    }

    #[test]
    fn test_backlog_never_exceeds_one() {
        let slot = LatestSlot::new();
        for i in 0..100 {
            slot.publish(i);
        }
        assert_eq!(slot.superseded(), 99);
        assert_eq!(slot.try_take(), Some(99));
        assert_eq!(slot.try_take(), None);
    }

    #[test]
    fn test_take_times_out_when_empty() {
        let slot: LatestSlot<u32> = LatestSlot::new();
        assert_eq!(slot.take_timeout(Duration::from_millis(5)), SlotTake::TimedOut);
    }

    #[test]
    fn test_stall_flag_is_reported_once() {
        let slot: LatestSlot<u32> = LatestSlot::new();
        slot.mark_stalled();
        assert_eq!(slot.take_timeout(Duration::from_millis(5)), SlotTake::Stalled);
        assert_eq!(slot.take_timeout(Duration::from_millis(5)), SlotTake::TimedOut);
    }

    #[test]
    fn test_publish_clears_stall() {
        let slot = LatestSlot::new();
        slot.mark_stalled();
        slot.publish(7);
        assert_eq!(slot.take_timeout(Duration::from_millis(5)), SlotTake::Value(7));
    }

    #[test]
    fn test_closed_slot_drains_then_reports_closed() {
        let slot = LatestSlot::new();
        slot.publish(1);
        slot.close();
        assert_eq!(slot.publish(2), Some(2));
        assert_eq!(slot.take_timeout(Duration::from_millis(5)), SlotTake::Value(1));
        assert_eq!(slot.take_timeout(Duration::from_millis(5)), SlotTake::Closed);
        assert_eq!(slot.take_blocking(), None);
    }

    #[test]
    fn test_waiting_consumer_wakes_on_publish() {
        let slot = Arc::new(LatestSlot::new());
        let producer = slot.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.publish(42);
        });

        assert_eq!(slot.take_timeout(Duration::from_secs(5)), SlotTake::Value(42));
        handle.join().unwrap();
    }

    #[test]
    fn test_take_blocking_wakes_on_close() {
        let slot: Arc<LatestSlot<u32>> = Arc::new(LatestSlot::new());
        let closer = slot.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });

        assert_eq!(slot.take_blocking(), None);
        handle.join().unwrap();
    }
}

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::recognition::domain::gallery::GallerySnapshot;
use crate::recognition::domain::gallery_store::GalleryStore;
use crate::shared::error::PipelineError;
use crate::shared::latest_slot::{LatestSlot, SlotTake};

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Attempts per snapshot before it is given up on.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

/// Writes gallery snapshots to a [`GalleryStore`] off the recognition path.
///
/// Only the newest snapshot matters: one published while an older one is
/// being retried replaces it.
pub struct GalleryPersister {
    handle: Option<JoinHandle<()>>,
    slot: Arc<LatestSlot<Arc<GallerySnapshot>>>,
}

impl GalleryPersister {
    pub fn spawn(
        store: Box<dyn GalleryStore>,
        slot: Arc<LatestSlot<Arc<GallerySnapshot>>>,
        policy: RetryPolicy,
    ) -> Self {
        let handle = {
            let slot = slot.clone();
            thread::Builder::new()
                .name("gallery-persister".into())
                .spawn(move || drain(store, &slot, policy))
                .ok()
        };
        if handle.is_none() {
            log::error!("Failed to spawn gallery persister thread; changes will not be saved");
        }
        Self { handle, slot }
    }

    /// Flushes the pending snapshot, if any, and stops the thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.slot.close();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Gallery persister thread panicked");
            }
        }
    }
}

impl Drop for GalleryPersister {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drain(
    mut store: Box<dyn GalleryStore>,
    slot: &LatestSlot<Arc<GallerySnapshot>>,
    policy: RetryPolicy,
) {
    while let Some(snapshot) = slot.take_blocking() {
        persist(store.as_mut(), snapshot, slot, policy);
    }
}

fn persist(
    store: &mut dyn GalleryStore,
    mut snapshot: Arc<GallerySnapshot>,
    slot: &LatestSlot<Arc<GallerySnapshot>>,
    policy: RetryPolicy,
) {
    let mut attempt = 1;
    let mut backoff = policy.initial_backoff;
    loop {
        let error = match store.save(&snapshot) {
            Ok(()) => {
                log::debug!(
                    "Saved gallery version {} ({} people)",
                    snapshot.version(),
                    snapshot.len()
                );
                return;
            }
            Err(e) => PipelineError::GalleryPersistence(e.to_string()),
        };

        if attempt >= policy.max_attempts {
            log::error!(
                "{error}; giving up on version {} after {attempt} attempts",
                snapshot.version()
            );
            return;
        }
        log::warn!("{error}; retrying in {backoff:?}");

        match slot.take_timeout(backoff) {
            SlotTake::Value(newer) => {
                snapshot = newer;
                attempt = 1;
                backoff = policy.initial_backoff;
                continue;
            }
            SlotTake::Closed => {
                // Shutting down: one last immediate try.
                attempt = policy.max_attempts.saturating_sub(1).max(attempt);
            }
            SlotTake::TimedOut | SlotTake::Stalled => {}
        }
        attempt += 1;
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::gallery::{FaceGallery, GalleryEntry, GalleryError};
    use std::sync::Mutex;

    /// Records saved versions; fails the first `failures` saves.
    struct FlakyStore {
        failures: u32,
        saved: Arc<Mutex<Vec<u64>>>,
        attempts: Arc<Mutex<u32>>,
    }

    impl GalleryStore for FlakyStore {
        fn load(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
            Ok(Vec::new())
        }

        fn save(&mut self, snapshot: &GallerySnapshot) -> Result<(), GalleryError> {
            *self.attempts.lock().unwrap() += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(GalleryError::Io {
                    path: "gallery.json".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.saved.lock().unwrap().push(snapshot.version());
            Ok(())
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_attempts,
        }
    }

    fn flaky(failures: u32) -> (FlakyStore, Arc<Mutex<Vec<u64>>>, Arc<Mutex<u32>>) {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let attempts = Arc::new(Mutex::new(0));
        let store = FlakyStore {
            failures,
            saved: saved.clone(),
            attempts: attempts.clone(),
        };
        (store, saved, attempts)
    }

    #[test]
    fn test_persists_published_snapshot() {
        let (store, saved, _) = flaky(0);
        let slot = Arc::new(LatestSlot::new());
        let persister = GalleryPersister::spawn(Box::new(store), slot.clone(), fast_policy(3));
        let mut gallery = FaceGallery::new();
        gallery.attach_persistence(slot);

        gallery.upsert("alice", vec![1.0]).unwrap();
        persister.stop();

        assert_eq!(saved.lock().unwrap().last(), Some(&1));
    }

    #[test]
    fn test_retries_until_success() {
        let (store, saved, attempts) = flaky(2);
        let slot = Arc::new(LatestSlot::new());
        let persister = GalleryPersister::spawn(Box::new(store), slot.clone(), fast_policy(5));

        let gallery = FaceGallery::new();
        gallery.upsert("alice", vec![1.0]).unwrap();
        slot.publish(gallery.snapshot());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while saved.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        persister.stop();

        assert_eq!(*attempts.lock().unwrap(), 3);
        assert_eq!(*saved.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let (mut store, saved, attempts) = flaky(10);
        let slot = Arc::new(LatestSlot::new());

        persist(&mut store, Arc::new(GallerySnapshot::default()), &slot, fast_policy(3));

        assert_eq!(*attempts.lock().unwrap(), 3);
        assert!(saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_newer_snapshot_replaces_the_one_being_retried() {
        let (mut store, saved, _) = flaky(1);
        let slot = Arc::new(LatestSlot::new());
        let gallery = FaceGallery::new();
        gallery.upsert("alice", vec![1.0]).unwrap();
        let first = gallery.snapshot();
        gallery.upsert("bob", vec![0.5]).unwrap();
        slot.publish(gallery.snapshot());

        persist(&mut store, first, &slot, fast_policy(3));

        assert_eq!(*saved.lock().unwrap(), vec![2]);
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::latest_slot::LatestSlot;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("person id must not be empty")]
    EmptyPersonId,
    #[error("embedding for {0} is empty")]
    EmptyEmbedding(String),
    #[error("embedding for {0} contains non-finite values")]
    NonFinite(String),
    #[error("embedding for {person_id} has {actual} dimensions, gallery uses {expected}")]
    DimensionMismatch {
        person_id: String,
        expected: usize,
        actual: usize,
    },
    #[error("gallery file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("gallery file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A known person and the reference embeddings recorded for them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    pub person_id: String,
    pub embeddings: Vec<Vec<f32>>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl GalleryEntry {
    fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(|e| e.len())
    }
}

/// Immutable view of the whole gallery at one point in time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GallerySnapshot {
    entries: BTreeMap<String, GalleryEntry>,
    version: u64,
}

impl GallerySnapshot {
    pub fn entries(&self) -> impl Iterator<Item = &GalleryEntry> {
        self.entries.values()
    }

    pub fn get(&self, person_id: &str) -> Option<&GalleryEntry> {
        self.entries.get(person_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding length shared by every entry, if any entry exists.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.values().next().and_then(GalleryEntry::dimension)
    }

    /// Incremented on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    /// A new reference embedding was added to an existing person.
    Extended,
    /// The exact embedding was already on record.
    Unchanged,
}

/// Concurrent store of known faces.
///
/// Copy-on-write: a mutation builds a new snapshot and swaps it in, so
/// readers holding an older `Arc<GallerySnapshot>` keep a consistent view
/// and never wait for writers beyond the pointer swap.
pub struct FaceGallery {
    current: RwLock<Arc<GallerySnapshot>>,
    persist: Option<Arc<LatestSlot<Arc<GallerySnapshot>>>>,
}

impl FaceGallery {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(GallerySnapshot::default())),
            persist: None,
        }
    }

    /// Builds a gallery from stored entries, skipping invalid or duplicate
    /// ones. Returns the gallery and the number of entries skipped.
    pub fn with_entries(entries: Vec<GalleryEntry>) -> (Self, usize) {
        let mut snapshot = GallerySnapshot::default();
        let mut skipped = 0;
        for entry in entries {
            if snapshot.entries.contains_key(&entry.person_id) {
                log::warn!("Skipping duplicate gallery entry for {}", entry.person_id);
                skipped += 1;
                continue;
            }
            let valid = !entry.embeddings.is_empty()
                && entry
                    .embeddings
                    .iter()
                    .all(|e| validate(&entry.person_id, e, snapshot.dimension()).is_ok())
                && entry.embeddings.iter().all(|e| Some(e.len()) == entry.dimension());
            if entry.person_id.trim().is_empty() || !valid {
                log::warn!("Skipping malformed gallery entry {:?}", entry.person_id);
                skipped += 1;
                continue;
            }
            snapshot.entries.insert(entry.person_id.clone(), entry);
        }
        let gallery = Self {
            current: RwLock::new(Arc::new(snapshot)),
            persist: None,
        };
        (gallery, skipped)
    }

    /// Every later mutation publishes its snapshot into `slot`.
    pub fn attach_persistence(&mut self, slot: Arc<LatestSlot<Arc<GallerySnapshot>>>) {
        self.persist = Some(slot);
    }

    pub fn upsert(&self, person_id: &str, embedding: Vec<f32>) -> Result<UpsertOutcome, GalleryError> {
        self.upsert_at(person_id, embedding, now_ms())
    }

    pub fn upsert_at(
        &self,
        person_id: &str,
        embedding: Vec<f32>,
        now_ms: u64,
    ) -> Result<UpsertOutcome, GalleryError> {
        if person_id.trim().is_empty() {
            return Err(GalleryError::EmptyPersonId);
        }

        let mut current = self.write();
        validate(person_id, &embedding, current.dimension())?;

        let outcome = match current.get(person_id) {
            Some(entry) if entry.embeddings.contains(&embedding) => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Extended,
            None => UpsertOutcome::Created,
        };
        if outcome == UpsertOutcome::Unchanged {
            return Ok(outcome);
        }

        let mut next = GallerySnapshot::clone(&current);
        next.version += 1;
        next.entries
            .entry(person_id.to_string())
            .and_modify(|entry| {
                entry.embeddings.push(embedding.clone());
                entry.updated_at_ms = now_ms;
            })
            .or_insert_with(|| GalleryEntry {
                person_id: person_id.to_string(),
                embeddings: vec![embedding],
                created_at_ms: now_ms,
                updated_at_ms: now_ms,
            });

        *current = Arc::new(next);
        self.publish(&current);
        log::debug!("Gallery upsert {person_id}: {outcome:?}");
        Ok(outcome)
    }

    /// Returns whether the person was present.
    pub fn remove(&self, person_id: &str) -> bool {
        let mut current = self.write();
        if !current.entries.contains_key(person_id) {
            return false;
        }
        let mut next = GallerySnapshot::clone(&current);
        next.version += 1;
        next.entries.remove(person_id);
        *current = Arc::new(next);
        self.publish(&current);
        log::debug!("Gallery removed {person_id}");
        true
    }

    pub fn snapshot(&self) -> Arc<GallerySnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn contains(&self, person_id: &str) -> bool {
        self.snapshot().get(person_id).is_some()
    }

    fn publish(&self, snapshot: &Arc<GallerySnapshot>) {
        if let Some(slot) = &self.persist {
            slot.publish(snapshot.clone());
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Arc<GallerySnapshot>> {
        // The guarded value is only ever replaced whole, never left half-built.
        match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for FaceGallery {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(person_id: &str, embedding: &[f32], dimension: Option<usize>) -> Result<(), GalleryError> {
    if embedding.is_empty() {
        return Err(GalleryError::EmptyEmbedding(person_id.to_string()));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(GalleryError::NonFinite(person_id.to_string()));
    }
    if let Some(expected) = dimension {
        if embedding.len() != expected {
            return Err(GalleryError::DimensionMismatch {
                person_id: person_id.to_string(),
                expected,
                actual: embedding.len(),
            });
        }
    }
    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

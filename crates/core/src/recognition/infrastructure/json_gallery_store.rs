use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::recognition::domain::gallery::{GalleryEntry, GalleryError, GallerySnapshot};
use crate::recognition::domain::gallery_store::GalleryStore;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct GalleryFileOut<'a> {
    version: u32,
    entries: Vec<&'a GalleryEntry>,
}

#[derive(Deserialize)]
struct GalleryFileIn {
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

/// Gallery persisted as a single JSON document, replaced atomically on
/// every save.
pub struct JsonGalleryStore {
    path: PathBuf,
}

impl JsonGalleryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/Narrator/gallery.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("Narrator").join("gallery.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> GalleryError {
        GalleryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl GalleryStore for JsonGalleryStore {
    fn load(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        let file: GalleryFileIn = serde_json::from_str(&json)?;

        let mut entries = Vec::with_capacity(file.entries.len());
        for (index, value) in file.entries.into_iter().enumerate() {
            match serde_json::from_value::<GalleryEntry>(value) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("Skipping malformed gallery entry #{index}: {e}"),
            }
        }
        Ok(entries)
    }

    fn save(&mut self, snapshot: &GallerySnapshot) -> Result<(), GalleryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let document = GalleryFileOut {
            version: FORMAT_VERSION,
            entries: snapshot.entries().collect(),
        };
        let json = serde_json::to_vec_pretty(&document)?;

        let temp_path = self.path.with_extension("json.part");
        let result = write_then_rename(&temp_path, &self.path, &json);
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result.map_err(|e| self.io_error(e))
    }
}

fn write_then_rename(temp_path: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::gallery::FaceGallery;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = JsonGalleryStore::new(tmp.path().join("gallery.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load_restores_entries() {
        let tmp = TempDir::new().unwrap();
        let mut store = JsonGalleryStore::new(tmp.path().join("nested").join("gallery.json"));
        let gallery = FaceGallery::new();
        gallery.upsert_at("alice", vec![0.6, 0.8], 100).unwrap();
        gallery.upsert_at("alice", vec![1.0, 0.0], 200).unwrap();
        gallery.upsert_at("bob", vec![0.0, 1.0], 300).unwrap();

        store.save(&gallery.snapshot()).unwrap();
        let entries = store.load().unwrap();

        assert_eq!(entries.len(), 2);
        let alice = entries.iter().find(|e| e.person_id == "alice").unwrap();
        assert_eq!(alice.embeddings, vec![vec![0.6, 0.8], vec![1.0, 0.0]]);
        assert_eq!(alice.created_at_ms, 100);
        assert_eq!(alice.updated_at_ms, 200);
        assert!(!store.path().with_extension("json.part").exists());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gallery.json");
        fs::write(
            &path,
            r#"{"version":1,"entries":[
                {"personId":"alice","embeddings":[[1.0,0.0]],"createdAtMs":1,"updatedAtMs":2},
                {"personId":"broken","embeddings":"nope"},
                42
            ]}"#,
        )
        .unwrap();

        let entries = JsonGalleryStore::new(&path).load().unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].person_id, "alice");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gallery.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonGalleryStore::new(&path).load(),
            Err(GalleryError::Serde(_))
        ));
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let tmp = TempDir::new().unwrap();
        let mut store = JsonGalleryStore::new(tmp.path().join("gallery.json"));
        let gallery = FaceGallery::new();
        gallery.upsert("alice", vec![1.0]).unwrap();
        store.save(&gallery.snapshot()).unwrap();

        gallery.remove("alice");
        store.save(&gallery.snapshot()).unwrap();

        assert!(store.load().unwrap().is_empty());
    }
}

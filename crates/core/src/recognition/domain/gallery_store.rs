use crate::recognition::domain::gallery::{GalleryEntry, GalleryError, GallerySnapshot};

/// Durable storage for the face gallery.
pub trait GalleryStore: Send {
    /// Reads every stored entry. A store that has never been written
    /// yields an empty list.
    fn load(&self) -> Result<Vec<GalleryEntry>, GalleryError>;

    /// Replaces the stored gallery with `snapshot`.
    fn save(&mut self, snapshot: &GallerySnapshot) -> Result<(), GalleryError>;
}

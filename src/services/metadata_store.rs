//! In-memory record of which photos exist, in which order, with which captions.
//!
//! Nothing here survives a restart. The store does no I/O; `PhotoService`
//! owns it behind a lock and decides when storage calls happen.

use crate::models::photo::{GalleryEntry, GallerySnapshot, PhotoRef};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MetadataStore {
    main_photo: Option<PhotoRef>,
    gallery: Vec<GalleryEntry>,
}

impl MetadataStore {
    pub fn snapshot(&self) -> GallerySnapshot {
        GallerySnapshot {
            main_photo: self.main_photo.clone(),
            gallery_photos: self.gallery.clone(),
        }
    }

    /// Install a new main photo, handing back the one it displaced.
    pub fn replace_main(&mut self, photo: PhotoRef) -> Option<PhotoRef> {
        self.main_photo.replace(photo)
    }

    pub fn gallery_len(&self) -> usize {
        self.gallery.len()
    }

    /// Append freshly stored photos in order.
    ///
    /// Each gets a new id and the caption `Photo {n}`, where `n` continues
    /// from the current gallery length.
    pub fn append(&mut self, photos: Vec<PhotoRef>) -> Vec<GalleryEntry> {
        let mut added = Vec::with_capacity(photos.len());
        for photo in photos {
            let entry = GalleryEntry {
                id: self.fresh_id(),
                photo,
                caption: format!("Photo {}", self.gallery.len() + 1),
            };
            self.gallery.push(entry.clone());
            added.push(entry);
        }
        added
    }

    pub fn find(&self, id: &str) -> Option<&GalleryEntry> {
        self.gallery.iter().find(|entry| entry.id == id)
    }

    /// Returns false when no entry has `id`.
    pub fn set_caption(&mut self, id: &str, caption: String) -> bool {
        match self.gallery.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.caption = caption;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<GalleryEntry> {
        let index = self.gallery.iter().position(|entry| entry.id == id)?;
        Some(self.gallery.remove(index))
    }

    /// Empty the store, returning what it held.
    pub fn clear(&mut self) -> (Option<PhotoRef>, Vec<GalleryEntry>) {
        (self.main_photo.take(), std::mem::take(&mut self.gallery))
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if self.find(&id).is_none() {
                return id;
            }
        }
    }
}

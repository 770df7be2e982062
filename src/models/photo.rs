//! Photo references and gallery entries as the front end sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handle to an image held by a storage backend.
///
/// `storage_id` alone must be enough for the backend that issued it to delete
/// the stored bytes again.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRef {
    /// URL (or served path) the front end loads the image from.
    pub reference: String,

    /// Backend-specific deletion key (file path, public id or object key).
    pub storage_id: String,

    /// Stored uploads outlive a page reload.
    pub permanent: bool,

    /// When the backend accepted the upload.
    pub uploaded_at: DateTime<Utc>,
}

impl PhotoRef {
    pub fn new(reference: impl Into<String>, storage_id: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            storage_id: storage_id.into(),
            permanent: true,
            uploaded_at: Utc::now(),
        }
    }
}

/// One captioned item of the gallery.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    /// Assigned once on upload, never changes.
    pub id: String,

    #[serde(flatten)]
    pub photo: PhotoRef,

    pub caption: String,
}

/// Everything the front end needs to render the page.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GallerySnapshot {
    pub main_photo: Option<PhotoRef>,
    pub gallery_photos: Vec<GalleryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gallery_entry_flattens_photo_fields() {
        let entry = GalleryEntry {
            id: "abc".into(),
            photo: PhotoRef::new("http://localhost:5005/uploads/a.jpg", "public/uploads/a.jpg"),
            caption: "Photo 1".into(),
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["id"], json!("abc"));
        assert_eq!(value["reference"], json!("http://localhost:5005/uploads/a.jpg"));
        assert_eq!(value["storageId"], json!("public/uploads/a.jpg"));
        assert_eq!(value["permanent"], json!(true));
        assert_eq!(value["caption"], json!("Photo 1"));
        assert!(value.get("photo").is_none());

        let back: GalleryEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn empty_snapshot_serializes_null_main_photo() {
        let value = serde_json::to_value(GallerySnapshot::default()).unwrap();
        assert_eq!(value, json!({ "mainPhoto": null, "galleryPhotos": [] }));
    }
}

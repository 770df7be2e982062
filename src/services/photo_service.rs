//! PhotoService: decode, store, record, and clean up photos.
//!
//! The service owns the injected [`MetadataStore`] behind a `RwLock` and
//! serializes every mutation with a single async mutex held for the whole
//! operation, storage I/O included. Readers only take the `RwLock` briefly, so
//! listing never waits on a slow upload.
//!
//! Storage deletes are advisory: a failed delete is logged and the metadata
//! change goes ahead anyway.

use crate::{
    models::{
        data_url::{DataUrlError, DecodedImage},
        photo::{GalleryEntry, GallerySnapshot, PhotoRef},
    },
    services::{
        metadata_store::MetadataStore,
        storage::{PhotoStorage, StorageError},
    },
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("invalid photo payload: {0}")]
    InvalidEncoding(#[from] DataUrlError),
    #[error("photo `{0}` not found")]
    NotFound(String),
    #[error("storage upload failed: {0}")]
    StorageUploadFailed(#[source] StorageError),
    #[error("{0}")]
    UnconfiguredStorage(String),
}

impl PhotoError {
    fn from_upload(err: StorageError) -> Self {
        match err {
            StorageError::Unconfigured(reason) => PhotoError::UnconfiguredStorage(reason),
            other => PhotoError::StorageUploadFailed(other),
        }
    }
}

pub type PhotoResult<T> = Result<T, PhotoError>;

/// Outcome of a gallery batch: what got appended, and where it stopped if a
/// storage upload failed partway.
#[derive(Debug)]
pub struct GalleryUpload {
    pub photos: Vec<GalleryEntry>,
    pub failure: Option<BatchFailure>,
}

#[derive(Debug)]
pub struct BatchFailure {
    /// 0-based position of the payload whose upload failed.
    pub index: usize,
    pub error: PhotoError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearSummary {
    pub removed: usize,
    pub failed_deletes: usize,
}

#[derive(Clone)]
pub struct PhotoService {
    store: Arc<RwLock<MetadataStore>>,
    mutations: Arc<Mutex<()>>,
    storage: Arc<dyn PhotoStorage>,
}

impl PhotoService {
    pub fn new(store: MetadataStore, storage: Arc<dyn PhotoStorage>) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            mutations: Arc::new(Mutex::new(())),
            storage,
        }
    }

    pub fn storage(&self) -> &Arc<dyn PhotoStorage> {
        &self.storage
    }

    fn ensure_configured(&self) -> PhotoResult<()> {
        self.storage.ensure_configured().map_err(|err| match err {
            StorageError::Unconfigured(reason) => PhotoError::UnconfiguredStorage(reason),
            other => PhotoError::UnconfiguredStorage(other.to_string()),
        })
    }

    pub async fn list_photos(&self) -> PhotoResult<GallerySnapshot> {
        self.ensure_configured()?;
        Ok(self.store.read().await.snapshot())
    }

    /// Store a new main photo and make it current.
    ///
    /// The previously current main photo stays in the backing store.
    pub async fn upload_main(&self, payload: &str) -> PhotoResult<PhotoRef> {
        self.ensure_configured()?;
        let image = DecodedImage::parse(payload)?;

        let _guard = self.mutations.lock().await;
        let name = format!("childhood-{}", Uuid::new_v4());
        let photo = self
            .storage
            .upload(&image, &name)
            .await
            .map_err(PhotoError::from_upload)?;

        let previous = self.store.write().await.replace_main(photo.clone());
        if let Some(previous) = previous {
            info!(
                "main photo replaced; previous object {} kept in {} storage",
                previous.storage_id,
                self.storage.backend()
            );
        }
        info!("main photo uploaded: {}", photo.reference);
        Ok(photo)
    }

    /// Upload a batch of gallery photos in order.
    ///
    /// Every payload is decoded before any storage call. Uploads stop at the
    /// first storage failure; photos already stored are still appended. Only a
    /// failure of the very first upload fails the call.
    pub async fn upload_gallery(&self, payloads: &[String]) -> PhotoResult<GalleryUpload> {
        self.ensure_configured()?;
        let images = payloads
            .iter()
            .map(|payload| DecodedImage::parse(payload))
            .collect::<Result<Vec<_>, _>>()?;

        let _guard = self.mutations.lock().await;
        let mut stored = Vec::with_capacity(images.len());
        let mut failure = None;
        for (index, image) in images.iter().enumerate() {
            let name = format!("gallery-{}", Uuid::new_v4());
            match self.storage.upload(image, &name).await {
                Ok(photo) => stored.push(photo),
                Err(err) if stored.is_empty() => return Err(PhotoError::from_upload(err)),
                Err(err) => {
                    warn!(
                        "gallery upload stopped at photo {} of {}: {}",
                        index + 1,
                        images.len(),
                        err
                    );
                    failure = Some(BatchFailure {
                        index,
                        error: PhotoError::from_upload(err),
                    });
                    break;
                }
            }
        }

        let mut store = self.store.write().await;
        let photos = store.append(stored);
        info!(
            "{} gallery photos uploaded ({} in gallery)",
            photos.len(),
            store.gallery_len()
        );
        Ok(GalleryUpload { photos, failure })
    }

    pub async fn update_caption(&self, id: &str, caption: String) -> PhotoResult<()> {
        self.ensure_configured()?;
        let _guard = self.mutations.lock().await;
        if !self.store.write().await.set_caption(id, caption) {
            return Err(PhotoError::NotFound(id.to_string()));
        }
        info!("caption updated for photo {}", id);
        Ok(())
    }

    /// Remove one gallery entry, deleting its bytes best-effort first.
    pub async fn delete_one(&self, id: &str) -> PhotoResult<GalleryEntry> {
        self.ensure_configured()?;
        let _guard = self.mutations.lock().await;
        let entry = self
            .store
            .read()
            .await
            .find(id)
            .cloned()
            .ok_or_else(|| PhotoError::NotFound(id.to_string()))?;

        self.delete_best_effort(&entry.photo).await;

        let removed = self
            .store
            .write()
            .await
            .remove(id)
            .ok_or_else(|| PhotoError::NotFound(id.to_string()))?;
        info!("photo {} deleted", id);
        Ok(removed)
    }

    /// Empty the store, then delete every photo it held best-effort.
    pub async fn clear_all(&self) -> PhotoResult<ClearSummary> {
        self.ensure_configured()?;
        let _guard = self.mutations.lock().await;
        let (main_photo, gallery) = self.store.write().await.clear();

        let targets: Vec<PhotoRef> = gallery
            .into_iter()
            .map(|entry| entry.photo)
            .chain(main_photo)
            .collect();
        let mut failed_deletes = 0;
        for photo in &targets {
            if !self.delete_best_effort(photo).await {
                failed_deletes += 1;
            }
        }

        info!(
            "all photos cleared ({} removed, {} storage deletes failed)",
            targets.len(),
            failed_deletes
        );
        Ok(ClearSummary {
            removed: targets.len(),
            failed_deletes,
        })
    }

    /// Returns whether the backend confirmed the delete.
    async fn delete_best_effort(&self, photo: &PhotoRef) -> bool {
        match self.storage.delete(&photo.storage_id).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "error deleting {} from {} storage: {}",
                    photo.storage_id,
                    self.storage.backend(),
                    err
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::{UnconfiguredStorage, testing::MemoryStorage};
    use std::collections::HashSet;

    const JPEG: &str = "data:image/jpeg;base64,AAAA";

    fn service_with(storage: MemoryStorage) -> (PhotoService, Arc<MemoryStorage>) {
        let storage = Arc::new(storage);
        let service = PhotoService::new(MetadataStore::default(), storage.clone());
        (service, storage)
    }

    fn payloads(n: usize) -> Vec<String> {
        (0..n).map(|_| JPEG.to_string()).collect()
    }

    #[tokio::test]
    async fn upload_main_then_list_round_trips_bytes() {
        let (service, storage) = service_with(MemoryStorage::default());

        let photo = service.upload_main(JPEG).await.unwrap();
        assert!(photo.permanent);

        let snapshot = service.list_photos().await.unwrap();
        let main = snapshot.main_photo.unwrap();
        assert_eq!(main, photo);
        assert_eq!(storage.get(&main.storage_id).unwrap().as_ref(), &[0u8, 0, 0]);
    }

    #[tokio::test]
    async fn malformed_main_payload_leaves_main_photo_unchanged() {
        let (service, storage) = service_with(MemoryStorage::default());
        let original = service.upload_main(JPEG).await.unwrap();

        let err = service.upload_main("AAAA").await.unwrap_err();
        assert!(matches!(err, PhotoError::InvalidEncoding(_)));
        assert_eq!(
            service.list_photos().await.unwrap().main_photo,
            Some(original)
        );
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn failed_main_upload_surfaces_storage_error() {
        let (service, _) = service_with(MemoryStorage::failing_uploads_from(0));
        let err = service.upload_main(JPEG).await.unwrap_err();
        assert!(matches!(err, PhotoError::StorageUploadFailed(_)));
        assert!(service.list_photos().await.unwrap().main_photo.is_none());
    }

    #[tokio::test]
    async fn replacing_main_photo_keeps_previous_object() {
        let (service, storage) = service_with(MemoryStorage::default());
        let first = service.upload_main(JPEG).await.unwrap();
        let second = service.upload_main(JPEG).await.unwrap();

        assert_ne!(first.storage_id, second.storage_id);
        assert!(storage.get(&first.storage_id).is_some());
        assert!(storage.deleted().is_empty());
    }

    #[tokio::test]
    async fn gallery_captions_and_caption_update() {
        let (service, _) = service_with(MemoryStorage::default());
        let upload = service.upload_gallery(&payloads(2)).await.unwrap();
        assert!(upload.failure.is_none());

        let captions: Vec<_> = upload.photos.iter().map(|p| p.caption.as_str()).collect();
        assert_eq!(captions, ["Photo 1", "Photo 2"]);

        service
            .update_caption(&upload.photos[0].id, "Rakhi Day".into())
            .await
            .unwrap();

        let gallery = service.list_photos().await.unwrap().gallery_photos;
        assert_eq!(gallery[0].id, upload.photos[0].id);
        assert_eq!(gallery[0].caption, "Rakhi Day");
        assert_eq!(gallery[1], upload.photos[1]);
    }

    #[tokio::test]
    async fn ids_stay_distinct_across_batches() {
        let (service, _) = service_with(MemoryStorage::default());
        let mut ids = HashSet::new();
        for n in [3, 1, 4] {
            let upload = service.upload_gallery(&payloads(n)).await.unwrap();
            ids.extend(upload.photos.into_iter().map(|p| p.id));
        }
        assert_eq!(ids.len(), 8);

        let gallery = service.list_photos().await.unwrap().gallery_photos;
        assert_eq!(gallery.len(), 8);
        assert_eq!(gallery[7].caption, "Photo 8");
    }

    #[tokio::test]
    async fn malformed_payload_in_batch_stores_nothing() {
        let (service, storage) = service_with(MemoryStorage::default());
        let batch = vec![JPEG.to_string(), "not a data url".to_string()];

        let err = service.upload_gallery(&batch).await.unwrap_err();
        assert!(matches!(err, PhotoError::InvalidEncoding(_)));
        assert_eq!(storage.len(), 0);
        assert!(service.list_photos().await.unwrap().gallery_photos.is_empty());
    }

    #[tokio::test]
    async fn partial_batch_keeps_successful_uploads() {
        let (service, storage) = service_with(MemoryStorage::failing_uploads_from(2));

        let upload = service.upload_gallery(&payloads(4)).await.unwrap();
        assert_eq!(upload.photos.len(), 2);
        let failure = upload.failure.unwrap();
        assert_eq!(failure.index, 2);
        assert!(matches!(failure.error, PhotoError::StorageUploadFailed(_)));

        assert_eq!(storage.len(), 2);
        assert_eq!(service.list_photos().await.unwrap().gallery_photos.len(), 2);
    }

    #[tokio::test]
    async fn batch_failing_on_first_upload_is_an_error() {
        let (service, _) = service_with(MemoryStorage::failing_uploads_from(0));
        let err = service.upload_gallery(&payloads(2)).await.unwrap_err();
        assert!(matches!(err, PhotoError::StorageUploadFailed(_)));
        assert!(service.list_photos().await.unwrap().gallery_photos.is_empty());
    }

    #[tokio::test]
    async fn update_caption_of_unknown_id_is_not_found() {
        let (service, _) = service_with(MemoryStorage::default());
        let err = service
            .update_caption("missing", "x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, PhotoError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn delete_one_removes_exactly_that_entry() {
        let (service, storage) = service_with(MemoryStorage::default());
        let upload = service.upload_gallery(&payloads(3)).await.unwrap();
        let target = &upload.photos[1];

        let removed = service.delete_one(&target.id).await.unwrap();
        assert_eq!(&removed, target);
        assert_eq!(storage.deleted(), [target.photo.storage_id.clone()]);

        let ids: Vec<_> = service
            .list_photos()
            .await
            .unwrap()
            .gallery_photos
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, [upload.photos[0].id.clone(), upload.photos[2].id.clone()]);

        let err = service.delete_one(&target.id).await.unwrap_err();
        assert!(matches!(err, PhotoError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_one_survives_storage_failure() {
        let (service, _) = service_with(MemoryStorage::failing_deletes());
        let upload = service.upload_gallery(&payloads(1)).await.unwrap();

        service.delete_one(&upload.photos[0].id).await.unwrap();
        assert!(service.list_photos().await.unwrap().gallery_photos.is_empty());
    }

    #[tokio::test]
    async fn clear_all_empties_store_even_when_deletes_fail() {
        let (service, storage) = service_with(MemoryStorage::failing_deletes());
        service.upload_main(JPEG).await.unwrap();
        service.upload_gallery(&payloads(2)).await.unwrap();

        let summary = service.clear_all().await.unwrap();
        assert_eq!(
            summary,
            ClearSummary {
                removed: 3,
                failed_deletes: 3
            }
        );
        assert_eq!(storage.deleted().len(), 3);
        assert_eq!(
            service.list_photos().await.unwrap(),
            GallerySnapshot::default()
        );
    }

    #[tokio::test]
    async fn clear_all_deletes_main_photo_bytes() {
        let (service, storage) = service_with(MemoryStorage::default());
        service.upload_main(JPEG).await.unwrap();
        service.upload_gallery(&payloads(1)).await.unwrap();

        let summary = service.clear_all().await.unwrap();
        assert_eq!(summary.failed_deletes, 0);
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn clear_all_deletes_exactly_what_the_store_held() {
        let (service, storage) = service_with(MemoryStorage::default());
        let main = service.upload_main(JPEG).await.unwrap();
        let gallery = service.upload_gallery(&payloads(2)).await.unwrap().photos;

        service.clear_all().await.unwrap();

        let mut expected: Vec<String> = gallery
            .iter()
            .map(|entry| entry.photo.storage_id.clone())
            .collect();
        expected.push(main.storage_id);
        assert_eq!(storage.deleted(), expected);
    }

    #[tokio::test]
    async fn unconfigured_storage_fails_every_operation() {
        let service = PhotoService::new(
            MetadataStore::default(),
            Arc::new(UnconfiguredStorage::new("cloudinary", "set CLOUDINARY_*")),
        );

        assert!(matches!(
            service.list_photos().await,
            Err(PhotoError::UnconfiguredStorage(_))
        ));
        assert!(matches!(
            service.upload_main("garbage").await,
            Err(PhotoError::UnconfiguredStorage(_))
        ));
        assert!(matches!(
            service.clear_all().await,
            Err(PhotoError::UnconfiguredStorage(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_batches_number_captions_without_gaps() {
        let (service, _) = service_with(MemoryStorage::default());
        let batch = payloads(5);
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                let batch = batch.clone();
                tokio::spawn(async move { service.upload_gallery(&batch).await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let captions: Vec<_> = service
            .list_photos()
            .await
            .unwrap()
            .gallery_photos
            .into_iter()
            .map(|p| p.caption)
            .collect();
        let expected: Vec<_> = (1..=20).map(|n| format!("Photo {}", n)).collect();
        assert_eq!(captions, expected);
    }
}

//! Firebase Storage backend.
//!
//! A Firebase Storage bucket is a Google Cloud Storage bucket, written here
//! through `object_store`'s GCS client with a service account. Each object
//! gets a `firebaseStorageDownloadTokens` metadata entry so it can be fetched
//! through the Firebase download URL, the same kind of link Firebase clients
//! hand out. The storage id is the object path.

use super::{
    PhotoStorage, StorageError, StorageResult, URL_COMPONENT, missing_vars, object_key,
};
use crate::{
    config::FirebaseSettings,
    models::{data_url::DecodedImage, photo::PhotoRef},
};
use async_trait::async_trait;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectStore, PutOptions, PutPayload,
    gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder},
    path::Path,
};
use percent_encoding::utf8_percent_encode;
use tracing::{debug, instrument};
use uuid::Uuid;

const DOWNLOAD_BASE: &str = "https://firebasestorage.googleapis.com/v0/b";
const DOWNLOAD_TOKEN_KEY: &str = "firebaseStorageDownloadTokens";

pub struct FirebaseStorage {
    store: GoogleCloudStorage,
    bucket: String,
    prefix: String,
}

impl FirebaseStorage {
    pub fn from_settings(settings: &FirebaseSettings) -> StorageResult<Self> {
        Self::connect(settings, ClientOptions::new())
    }

    fn connect(settings: &FirebaseSettings, options: ClientOptions) -> StorageResult<Self> {
        let mut missing = missing_vars(&[("FIREBASE_STORAGE_BUCKET", &settings.bucket)]);
        if settings.service_account_key.is_none() && settings.service_account_path.is_none() {
            missing.push("FIREBASE_SERVICE_ACCOUNT_KEY (or FIREBASE_SERVICE_ACCOUNT_PATH)");
        }
        let Some(bucket) = settings.bucket.as_ref().filter(|_| missing.is_empty()) else {
            return Err(StorageError::Unconfigured(format!(
                "Cloud storage not configured. Please set {}.",
                missing.join(", ")
            )));
        };

        let builder = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket)
            .with_client_options(options);
        let builder = match (&settings.service_account_key, &settings.service_account_path) {
            (Some(key), _) => builder.with_service_account_key(key),
            (None, Some(path)) => builder.with_service_account_path(path.to_string_lossy()),
            (None, None) => builder,
        };
        let store = builder.build().map_err(|err| {
            StorageError::Unconfigured(format!("Firebase storage could not be set up: {}", err))
        })?;

        Ok(Self {
            store,
            bucket: bucket.clone(),
            prefix: settings.prefix.clone(),
        })
    }

    /// Firebase download URL; the whole object path is a single encoded segment.
    fn download_url(&self, key: &str, token: &str) -> String {
        format!(
            "{}/{}/o/{}?alt=media&token={}",
            DOWNLOAD_BASE,
            self.bucket,
            utf8_percent_encode(key, URL_COMPONENT),
            token
        )
    }
}

#[async_trait]
impl PhotoStorage for FirebaseStorage {
    fn backend(&self) -> &'static str {
        "firebase"
    }

    #[instrument(skip(self, image), fields(bytes = image.bytes.len()))]
    async fn upload(&self, image: &DecodedImage, name: &str) -> StorageResult<PhotoRef> {
        let key = object_key(&self.prefix, &format!("{}.{}", name, image.extension()));
        let token = Uuid::new_v4().to_string();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, image.media_type.clone().into());
        attributes.insert(Attribute::Metadata(DOWNLOAD_TOKEN_KEY.into()), token.clone().into());
        let options = PutOptions {
            attributes,
            ..PutOptions::default()
        };

        self.store
            .put_opts(
                &Path::from(key.as_str()),
                PutPayload::from(image.bytes.clone()),
                options,
            )
            .await
            .map_err(|err| StorageError::UploadFailed {
                name: key.clone(),
                reason: err.to_string(),
            })?;
        debug!(key = %key, "uploaded to firebase storage");

        Ok(PhotoRef::new(self.download_url(&key, &token), key))
    }

    #[instrument(skip(self))]
    async fn delete(&self, storage_id: &str) -> StorageResult<()> {
        match self.store.delete(&Path::from(storage_id)).await {
            Ok(()) => debug!("deleted firebase object {}", storage_id),
            Err(object_store::Error::NotFound { .. }) => {
                debug!("firebase object {} already missing", storage_id)
            }
            Err(err) => {
                return Err(StorageError::DeleteFailed {
                    storage_id: storage_id.to_string(),
                    reason: err.to_string(),
                });
            }
        }
        Ok(())
    }
}

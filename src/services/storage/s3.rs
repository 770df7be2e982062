//! Amazon S3 (or S3-compatible) backend on top of `object_store`.
//!
//! Objects are written under `{prefix}/{file}` and the storage id is the object
//! key. Uploads carry a SHA-256 checksum that S3 verifies. Public read access
//! comes from the bucket policy; no canned ACL is sent.

use super::{
    PhotoStorage, StorageError, StorageResult, URL_PATH, missing_vars, object_key,
};
use crate::{
    config::S3Settings,
    models::{data_url::DecodedImage, photo::PhotoRef},
};
use async_trait::async_trait;
use object_store::{
    Attribute, Attributes, ObjectStore, PutOptions, PutPayload,
    aws::{AmazonS3, AmazonS3Builder, Checksum},
    path::Path,
};
use percent_encoding::utf8_percent_encode;
use tracing::{debug, instrument};

pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    prefix: String,
    endpoint: Option<String>,
}

impl S3Storage {
    pub fn from_settings(settings: &S3Settings) -> StorageResult<Self> {
        let missing = missing_vars(&[
            ("AWS_S3_BUCKET", &settings.bucket),
            ("AWS_ACCESS_KEY_ID", &settings.access_key_id),
            ("AWS_SECRET_ACCESS_KEY", &settings.secret_access_key),
        ]);
        let (Some(bucket), Some(access_key_id), Some(secret_access_key)) = (
            &settings.bucket,
            &settings.access_key_id,
            &settings.secret_access_key,
        ) else {
            return Err(StorageError::Unconfigured(format!(
                "Cloud storage not configured. Please set {}.",
                missing.join(", ")
            )));
        };

        let endpoint = settings
            .endpoint
            .as_ref()
            .map(|e| e.trim_end_matches('/').to_string());
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&settings.region)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key)
            .with_checksum_algorithm(Checksum::SHA256);
        if let Some(endpoint) = &endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        let store = builder.build().map_err(|err| {
            StorageError::Unconfigured(format!("S3 storage could not be set up: {}", err))
        })?;

        Ok(Self {
            store,
            bucket: bucket.clone(),
            region: settings.region.clone(),
            prefix: settings.prefix.clone(),
            endpoint,
        })
    }

    fn object_key(&self, file_name: &str) -> String {
        object_key(&self.prefix, file_name)
    }

    /// Virtual-hosted AWS URL, or path-style when an endpoint override is set.
    fn object_url(&self, key: &str) -> String {
        let key = utf8_percent_encode(key, URL_PATH);
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

#[async_trait]
impl PhotoStorage for S3Storage {
    fn backend(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self, image), fields(bytes = image.bytes.len()))]
    async fn upload(&self, image: &DecodedImage, name: &str) -> StorageResult<PhotoRef> {
        let key = self.object_key(&format!("{}.{}", name, image.extension()));

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, image.media_type.clone().into());
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
        debug!(key = %key, "uploaded to s3");

        Ok(PhotoRef::new(self.object_url(&key), key))
    }

    #[instrument(skip(self))]
    async fn delete(&self, storage_id: &str) -> StorageResult<()> {
        match self.store.delete(&Path::from(storage_id)).await {
            Ok(()) => debug!("deleted s3 object {}", storage_id),
            Err(object_store::Error::NotFound { .. }) => {
                debug!("s3 object {} already missing", storage_id)
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

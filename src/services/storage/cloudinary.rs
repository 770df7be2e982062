//! Cloudinary backend using the signed upload API.
//!
//! Uploads go to `{API_BASE}/{cloud}/image/upload` as multipart forms and are
//! deleted through `image/destroy`. The storage id is Cloudinary's `public_id`.

use super::{PhotoStorage, StorageError, StorageResult, missing_vars};
use crate::{
    config::{CloudinarySettings, SignatureAlgorithm},
    models::{data_url::DecodedImage, photo::PhotoRef},
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
    Client, Response,
    multipart::{Form, Part},
};
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

#[derive(Clone)]
pub struct CloudinaryStorage {
    client: Client,
    api_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
    signature_algorithm: SignatureAlgorithm,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryStorage {
    pub fn from_settings(settings: &CloudinarySettings) -> StorageResult<Self> {
        let missing = missing_vars(&[
            ("CLOUDINARY_CLOUD_NAME", &settings.cloud_name),
            ("CLOUDINARY_API_KEY", &settings.api_key),
            ("CLOUDINARY_API_SECRET", &settings.api_secret),
        ]);
        match (&settings.cloud_name, &settings.api_key, &settings.api_secret) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Ok(Self {
                client: Client::new(),
                api_base: API_BASE.to_string(),
                cloud_name: cloud_name.clone(),
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
                folder: settings.folder.clone(),
                signature_algorithm: settings.signature_algorithm,
            }),
            _ => Err(StorageError::Unconfigured(format!(
                "Cloud storage not configured. Please set {}.",
                missing.join(", ")
            ))),
        }
    }

    /// Point requests at another API root, such as a local test server.
    #[cfg(test)]
    pub(crate) fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", self.api_base, self.cloud_name, action)
    }

    /// Hex digest of the signed parameters followed by the API secret.
    fn sign(&self, params: &BTreeMap<&str, String>) -> String {
        let payload = format!("{}{}", signing_payload(params), self.api_secret);
        match self.signature_algorithm {
            SignatureAlgorithm::Sha1 => hex::encode(Sha1::digest(payload.as_bytes())),
            SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(payload.as_bytes())),
        }
    }

    /// Signed parameters plus `api_key` and `signature`, ready to send.
    fn signed_fields(&self, params: BTreeMap<&'static str, String>) -> Vec<(&'static str, String)> {
        let signature = self.sign(&params);
        let mut fields: Vec<_> = params.into_iter().collect();
        fields.push(("api_key", self.api_key.clone()));
        fields.push(("signature", signature));
        fields
    }
}

/// `key=value` pairs sorted by key and joined with `&`, skipping empty values.
fn signing_payload(params: &BTreeMap<&str, String>) -> String {
    params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// Pull Cloudinary's error message out of a failed response.
async fn failure_reason(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => format!("{}: {}", status, envelope.error.message),
        Err(_) => format!("{}: {}", status, body),
    }
}

#[async_trait]
impl PhotoStorage for CloudinaryStorage {
    fn backend(&self) -> &'static str {
        "cloudinary"
    }

    #[instrument(skip(self, image), fields(bytes = image.bytes.len()))]
    async fn upload(&self, image: &DecodedImage, name: &str) -> StorageResult<PhotoRef> {
        let mut params = BTreeMap::new();
        params.insert("folder", self.folder.clone());
        params.insert("overwrite", "true".to_string());
        params.insert("public_id", name.to_string());
        params.insert("timestamp", Utc::now().timestamp().to_string());

        let file = Part::bytes(image.bytes.to_vec())
            .file_name(format!("{}.{}", name, image.extension()))
            .mime_str(&image.media_type)?;
        let form = self
            .signed_fields(params)
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value))
            .part("file", file);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StorageError::UploadFailed {
                name: name.to_string(),
                reason: failure_reason(response).await,
            });
        }

        let uploaded: UploadResponse = response.json().await?;
        debug!(public_id = %uploaded.public_id, "uploaded to cloudinary");
        Ok(PhotoRef::new(uploaded.secure_url, uploaded.public_id))
    }

    #[instrument(skip(self))]
    async fn delete(&self, storage_id: &str) -> StorageResult<()> {
        let mut params = BTreeMap::new();
        params.insert("public_id", storage_id.to_string());
        params.insert("timestamp", Utc::now().timestamp().to_string());

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&self.signed_fields(params))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StorageError::DeleteFailed {
                storage_id: storage_id.to_string(),
                reason: failure_reason(response).await,
            });
        }

        let destroyed: DestroyResponse = response.json().await?;
        if destroyed.result != "ok" {
            return Err(StorageError::DeleteFailed {
                storage_id: storage_id.to_string(),
                reason: format!("cloudinary answered `{}`", destroyed.result),
            });
        }
        debug!("destroyed cloudinary asset {}", storage_id);
        Ok(())
    }
}

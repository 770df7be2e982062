//! Pluggable byte storage for uploaded photos.
//!
//! Every backend implements [`PhotoStorage`]. [`build_storage`] picks one from
//! the resolved settings at startup; a backend whose credentials are missing
//! is replaced by [`UnconfiguredStorage`], which fails every call before
//! touching the network or disk.

mod cloudinary;
mod firebase;
mod local;
mod s3;

pub use cloudinary::CloudinaryStorage;
pub use firebase::FirebaseStorage;
pub use local::LocalStorage;
pub use s3::S3Storage;

use crate::{
    config::{StorageBackend, StorageSettings},
    models::{data_url::DecodedImage, photo::PhotoRef},
};
use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use std::{io, sync::Arc};
use thiserror::Error;

/// Everything but RFC 3986 unreserved characters, `/` included.
const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// As [`URL_COMPONENT`], keeping `/` so keys read as URL paths.
const URL_PATH: &AsciiSet = &URL_COMPONENT.remove(b'/');

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Unconfigured(String),
    #[error("upload of `{name}` failed: {reason}")]
    UploadFailed { name: String, reason: String },
    #[error("delete of `{storage_id}` failed: {reason}")]
    DeleteFailed { storage_id: String, reason: String },
    #[error("storage id `{0}` does not belong to this backend")]
    InvalidStorageId(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Short backend name for logs and readiness output.
    fn backend(&self) -> &'static str;

    /// Fails fast when the backend cannot be used at all.
    fn ensure_configured(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Readiness check. Backends that can cheaply exercise their store do so.
    async fn probe(&self) -> StorageResult<()> {
        self.ensure_configured()
    }

    /// Persist `image` under `name` (no extension) and return a handle to it.
    ///
    /// Either the bytes are fully stored and reachable through the returned
    /// reference, or an error comes back and nothing is visible.
    async fn upload(&self, image: &DecodedImage, name: &str) -> StorageResult<PhotoRef>;

    /// Remove the bytes identified by a `storage_id` this backend issued.
    async fn delete(&self, storage_id: &str) -> StorageResult<()>;
}

/// Stand-in for a backend that was selected but lacks credentials.
#[derive(Debug, Clone)]
pub struct UnconfiguredStorage {
    backend: &'static str,
    reason: String,
}

impl UnconfiguredStorage {
    pub fn new(backend: &'static str, reason: impl Into<String>) -> Self {
        Self {
            backend,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PhotoStorage for UnconfiguredStorage {
    fn backend(&self) -> &'static str {
        self.backend
    }

    fn ensure_configured(&self) -> StorageResult<()> {
        Err(StorageError::Unconfigured(self.reason.clone()))
    }

    async fn upload(&self, _image: &DecodedImage, _name: &str) -> StorageResult<PhotoRef> {
        Err(StorageError::Unconfigured(self.reason.clone()))
    }

    async fn delete(&self, _storage_id: &str) -> StorageResult<()> {
        Err(StorageError::Unconfigured(self.reason.clone()))
    }
}

/// The active backend, plus the local store when uploads are served from disk.
pub struct StorageHandle {
    pub storage: Arc<dyn PhotoStorage>,
    pub local: Option<LocalStorage>,
}

pub fn build_storage(settings: &StorageSettings) -> StorageHandle {
    let built: StorageResult<Arc<dyn PhotoStorage>> = match settings.backend {
        StorageBackend::Local => {
            let local = LocalStorage::new(
                settings.local.uploads_dir.clone(),
                settings.local.public_url.clone(),
            );
            return StorageHandle {
                storage: Arc::new(local.clone()),
                local: Some(local),
            };
        }
        StorageBackend::Cloudinary => CloudinaryStorage::from_settings(&settings.cloudinary)
            .map(|s| Arc::new(s) as Arc<dyn PhotoStorage>),
        StorageBackend::S3 => {
            S3Storage::from_settings(&settings.s3).map(|s| Arc::new(s) as Arc<dyn PhotoStorage>)
        }
        StorageBackend::Firebase => FirebaseStorage::from_settings(&settings.firebase)
            .map(|s| Arc::new(s) as Arc<dyn PhotoStorage>),
    };

    let storage = built.unwrap_or_else(|err| {
        tracing::error!(backend = %settings.backend, "storage backend unusable: {}", err);
        Arc::new(UnconfiguredStorage::new(
            settings.backend.as_str(),
            err.to_string(),
        ))
    });

    StorageHandle {
        storage,
        local: None,
    }
}

/// `{prefix}/{file}`, or just the file name when there is no prefix.
fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", prefix, file_name)
    }
}

/// List the environment variables whose values are absent.
fn missing_vars(vars: &[(&'static str, &Option<String>)]) -> Vec<&'static str> {
    vars.iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory backend with failure injection, and a loopback HTTP stub for
    //! exercising the remote backends.

    use super::*;
    use axum::{
        Router,
        body::to_bytes,
        extract::Request,
        http::HeaderMap,
        response::Response,
    };
    use bytes::Bytes;
    use std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tokio::net::TcpListener;

    #[derive(Default)]
    pub struct MemoryStorage {
        objects: Mutex<HashMap<String, Bytes>>,
        uploads: AtomicUsize,
        /// Uploads numbered at or past this (0-based, counted over the
        /// storage's lifetime) fail.
        fail_uploads_from: Option<usize>,
        fail_deletes: bool,
        deletes: Mutex<Vec<String>>,
    }

    impl MemoryStorage {
        pub fn failing_uploads_from(n: usize) -> Self {
            Self {
                fail_uploads_from: Some(n),
                ..Self::default()
            }
        }

        pub fn failing_deletes() -> Self {
            Self {
                fail_deletes: true,
                ..Self::default()
            }
        }

        pub fn get(&self, storage_id: &str) -> Option<Bytes> {
            self.objects.lock().unwrap().get(storage_id).cloned()
        }

        pub fn len(&self) -> usize {
            self.objects.lock().unwrap().len()
        }

        pub fn deleted(&self) -> Vec<String> {
            self.deletes.lock().unwrap().clone()
        }
    }

    /// One request as it reached a [`StubServer`].
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: String,
        pub path: String,
        pub headers: HeaderMap,
        pub body: Bytes,
    }

    impl RecordedRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).and_then(|value| value.to_str().ok())
        }
    }

    /// Loopback HTTP server standing in for a remote storage API.
    pub struct StubServer {
        addr: SocketAddr,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl StubServer {
        /// Answer every request with `respond`, recording each one first.
        pub async fn start<F>(respond: F) -> Self
        where
            F: Fn(&RecordedRequest) -> Response + Clone + Send + Sync + 'static,
        {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let recorded = requests.clone();
            let app = Router::new().fallback(move |request: Request| {
                let respond = respond.clone();
                let recorded = recorded.clone();
                async move {
                    let (parts, body) = request.into_parts();
                    let body = to_bytes(body, usize::MAX).await.unwrap();
                    let request = RecordedRequest {
                        method: parts.method.to_string(),
                        path: parts.uri.path().to_string(),
                        headers: parts.headers,
                        body,
                    };
                    let response = respond(&request);
                    recorded.lock().unwrap().push(request);
                    response
                }
            });

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            Self { addr, requests }
        }

        pub fn base_url(&self) -> String {
            format!("http://{}", self.addr)
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PhotoStorage for MemoryStorage {
        fn backend(&self) -> &'static str {
            "memory"
        }

        async fn upload(&self, image: &DecodedImage, name: &str) -> StorageResult<PhotoRef> {
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            if self.fail_uploads_from.is_some_and(|from| n >= from) {
                return Err(StorageError::UploadFailed {
                    name: name.to_string(),
                    reason: "injected failure".into(),
                });
            }
            self.objects
                .lock()
                .unwrap()
                .insert(name.to_string(), image.bytes.clone());
            Ok(PhotoRef::new(format!("memory://{}", name), name))
        }

        async fn delete(&self, storage_id: &str) -> StorageResult<()> {
            self.deletes.lock().unwrap().push(storage_id.to_string());
            if self.fail_deletes {
                return Err(StorageError::DeleteFailed {
                    storage_id: storage_id.to_string(),
                    reason: "injected failure".into(),
                });
            }
            self.objects.lock().unwrap().remove(storage_id);
            Ok(())
        }
    }
}

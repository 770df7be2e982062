//! Local-disk backend: uploads land flat in one directory and are served
//! back under `/uploads/{file}`.

use super::{PhotoStorage, StorageError, StorageResult};
use crate::models::{data_url::DecodedImage, photo::PhotoRef};
use async_trait::async_trait;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Clone, Debug)]
pub struct LocalStorage {
    /// Directory holding every uploaded file.
    root: PathBuf,

    /// Base URL prepended to `/uploads/{file}` in references.
    public_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Map a served file name onto its path, refusing anything that could
    /// escape the uploads directory.
    pub fn resolve(&self, file_name: &str) -> StorageResult<PathBuf> {
        ensure_file_name_safe(file_name)?;
        Ok(self.root.join(file_name))
    }

    fn reference_for(&self, file_name: &str) -> String {
        format!("{}/uploads/{}", self.public_url, file_name)
    }

    /// Write `bytes` to `path` via a temp file + fsync + rename so a reader
    /// never sees a half-written upload.
    async fn write_atomically(&self, path: &Path, bytes: &[u8]) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        let tmp_path = self.root.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(())
    }
}

#[async_trait]
impl PhotoStorage for LocalStorage {
    fn backend(&self) -> &'static str {
        "local"
    }

    /// Write/read/delete a scratch file in the uploads directory.
    async fn probe(&self) -> StorageResult<()> {
        let tmp_path = self.root.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read? != b"readyz" {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "file content mismatch",
            )));
        }
        Ok(())
    }

    async fn upload(&self, image: &DecodedImage, name: &str) -> StorageResult<PhotoRef> {
        let file_name = format!("{}.{}", name, image.extension());
        let path = self.resolve(&file_name)?;

        self.write_atomically(&path, &image.bytes)
            .await
            .map_err(|err| StorageError::UploadFailed {
                name: file_name.clone(),
                reason: err.to_string(),
            })?;
        debug!("stored {} bytes at {}", image.bytes.len(), path.display());

        Ok(PhotoRef::new(
            self.reference_for(&file_name),
            path.display().to_string(),
        ))
    }

    async fn delete(&self, storage_id: &str) -> StorageResult<()> {
        let path = PathBuf::from(storage_id);
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StorageError::InvalidStorageId(storage_id.to_string()))?;
        if path.parent() != Some(self.root.as_path()) || ensure_file_name_safe(file_name).is_err()
        {
            return Err(StorageError::InvalidStorageId(storage_id.to_string()));
        }

        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", path.display());
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

/// Reject names that are empty, hidden, too long, or carry path separators,
/// parent references or control bytes.
fn ensure_file_name_safe(name: &str) -> StorageResult<()> {
    let unsafe_name = name.is_empty()
        || name.len() > MAX_FILE_NAME_LEN
        || name.starts_with('.')
        || name.contains("..")
        || name
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\');
    if unsafe_name {
        return Err(StorageError::InvalidStorageId(name.to_string()));
    }
    Ok(())
}

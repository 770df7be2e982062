use crate::services::{photo_service::PhotoService, storage::LocalStorage};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub photos: PhotoService,

    /// Present when uploads live on local disk and are served by this process.
    pub uploads: Option<LocalStorage>,
}

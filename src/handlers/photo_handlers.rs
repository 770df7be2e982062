//! HTTP handlers for `/api/photos`.
//!
//! One path, dispatched on the verb:
//! - `GET` lists the main photo and the gallery
//! - `POST` uploads a main photo (`type: "childhood"`) or a gallery batch
//! - `PUT ?photoId=` updates a caption
//! - `DELETE ?photoId=` removes one photo, plain `DELETE` clears everything

use crate::{
    errors::AppError,
    models::photo::{GalleryEntry, GallerySnapshot, PhotoRef},
    services::photo_service::GalleryUpload,
    state::AppState,
};
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/photos`. Every field is optional so that any JSON
/// object deserializes and shape checks produce a uniform 400.
#[derive(Debug, Default, Deserialize)]
pub struct UploadRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub photo: Option<String>,
    pub photos: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CaptionRequest {
    pub caption: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoQuery {
    pub photo_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MainUploadResponse {
    pub success: bool,
    pub photo: PhotoRef,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryUploadResponse {
    pub success: bool,
    pub photos: Vec<GalleryEntry>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Either kind of upload answer; both are plain JSON objects.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Main(MainUploadResponse),
    Gallery(GalleryUploadResponse),
}

impl From<GalleryUpload> for GalleryUploadResponse {
    fn from(upload: GalleryUpload) -> Self {
        let uploaded = upload.photos.len();
        match upload.failure {
            None => Self {
                success: true,
                photos: upload.photos,
                message: format!("{} photos uploaded successfully!", uploaded),
                failed_index: None,
                error: None,
            },
            Some(failure) => Self {
                success: false,
                message: format!(
                    "{} photos uploaded; upload stopped at photo {}",
                    uploaded,
                    failure.index + 1
                ),
                photos: upload.photos,
                failed_index: Some(failure.index),
                error: Some(failure.error.to_string()),
            },
        }
    }
}

/// `GET /api/photos`
pub async fn list_photos(State(state): State<AppState>) -> Result<Json<GallerySnapshot>, AppError> {
    tracing::debug!("returning photo metadata");
    Ok(Json(state.photos.list_photos().await?))
}

/// `POST /api/photos`
pub async fn upload_photos(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!("rejected upload body: {}", rejection.body_text());
        AppError::bad_request("Invalid upload data")
    })?;
    tracing::info!(
        kind = request.kind.as_deref().unwrap_or("<none>"),
        photo_len = request.photo.as_ref().map(String::len),
        photos = request.photos.as_ref().map(Vec::len),
        "upload request received"
    );

    match request {
        UploadRequest {
            kind: Some(kind),
            photo: Some(photo),
            ..
        } if kind == "childhood" && !photo.is_empty() => {
            let photo = state.photos.upload_main(&photo).await?;
            Ok(Json(UploadResponse::Main(MainUploadResponse {
                success: true,
                photo,
                message: "Main photo uploaded successfully!".into(),
            })))
        }
        UploadRequest {
            kind: Some(kind),
            photos: Some(photos),
            ..
        } if kind == "gallery" && !photos.is_empty() => {
            let upload = state.photos.upload_gallery(&photos).await?;
            Ok(Json(UploadResponse::Gallery(upload.into())))
        }
        _ => Err(AppError::bad_request("Invalid upload data")),
    }
}

/// `PUT /api/photos?photoId=<id>`
pub async fn update_caption(
    State(state): State<AppState>,
    Query(query): Query<PhotoQuery>,
    payload: Result<Json<CaptionRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = query
        .photo_id
        .ok_or_else(|| AppError::bad_request("photoId query parameter is required"))?;
    let Json(body) = payload?;

    state.photos.update_caption(&id, body.caption).await?;
    Ok(MessageResponse::ok("Caption updated successfully!"))
}

/// `DELETE /api/photos[?photoId=<id>]`
///
/// An empty `photoId` is looked up like any other id and yields 404; only a
/// request without the parameter clears everything.
pub async fn delete_photos(
    State(state): State<AppState>,
    Query(query): Query<PhotoQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    match query.photo_id {
        Some(id) => {
            state.photos.delete_one(&id).await?;
            Ok(MessageResponse::ok("Photo deleted successfully!"))
        }
        None => {
            let summary = state.photos.clear_all().await?;
            tracing::debug!(
                removed = summary.removed,
                failed_deletes = summary.failed_deletes,
                "gallery cleared"
            );
            Ok(MessageResponse::ok("All photos cleared successfully!"))
        }
    }
}

/// `OPTIONS /api/photos` outside of a CORS preflight.
pub async fn options() -> StatusCode {
    StatusCode::OK
}

/// Any other verb on `/api/photos`.
pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}

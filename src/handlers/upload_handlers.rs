//! Serves locally stored uploads at `/uploads/{file}`, streamed from disk.

use crate::{errors::AppError, state::AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use std::io;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// `GET /uploads/{file}`
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    let uploads = state
        .uploads
        .as_ref()
        .ok_or_else(|| AppError::not_found("Uploads are not served by this backend"))?;
    let path = uploads
        .resolve(&file)
        .map_err(|_| AppError::not_found("Upload not found"))?;

    let file_handle = File::open(&path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            AppError::not_found("Upload not found")
        } else {
            AppError::internal(err.to_string())
        }
    })?;
    let length = file_handle
        .metadata()
        .await
        .map_err(|err| AppError::internal(err.to_string()))?
        .len();

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file_handle)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    let content_type = mime_guess::from_path(&file).first_or_octet_stream();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type.essence_str())
            .map_err(|err| AppError::internal(err.to_string()))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    Ok(response)
}

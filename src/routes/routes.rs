//! Defines routes for the photo gallery API.
//!
//! ## Structure
//! - **Photo endpoints**
//!   - `GET    /api/photos` — main photo + gallery
//!   - `POST   /api/photos` — upload main photo or gallery batch
//!   - `PUT    /api/photos?photoId=` — update caption
//!   - `DELETE /api/photos[?photoId=]` — delete one / clear all
//!
//! - **Upload serving** (local backend)
//!   - `GET    /uploads/{file}`
//!
//! - **Probes**
//!   - `GET    /healthz`, `GET /readyz`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        photo_handlers::{
            delete_photos, list_photos, method_not_allowed, options, update_caption,
            upload_photos,
        },
        upload_handlers::serve_upload,
    },
    state::AppState,
};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Build and return the router for every gallery route.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/photos",
            get(list_photos)
                .post(upload_photos)
                .put(update_caption)
                .delete(delete_photos)
                .options(options)
                .fallback(method_not_allowed),
        )
        .route("/uploads/{file}", get(serve_upload))
}

/// CORS for the front end. `*` allows any origin without credentials; an
/// explicit list allows credentials for just those origins.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("ignoring CORS origin `{}`: {}", origin, err);
                None
            }
        })
        .collect();
    layer
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}

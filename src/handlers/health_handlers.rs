//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that probes the active storage backend

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness probe: always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Asks the storage backend to probe itself: the local backend does a
/// write/read/delete round trip in its uploads directory, remote backends
/// check that their credentials are present.
///
/// HTTP 200 when the probe passes, HTTP 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let storage = state.photos.storage();
    let storage_check = match storage.probe().await {
        Ok(()) => CheckStatus {
            ok: true,
            backend: storage.backend(),
            error: None,
        },
        Err(e) => CheckStatus {
            ok: false,
            backend: storage.backend(),
            error: Some(e.to_string()),
        },
    };

    let overall_ok = storage_check.ok;
    let mut checks = HashMap::new();
    checks.insert("storage", storage_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    backend: &'static str,
    error: Option<String>,
}

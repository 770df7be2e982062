use anyhow::Result;
use axum::{Router, extract::DefaultBodyLimit};
use std::{fs, io::ErrorKind};
use tokio::net::TcpListener;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::StorageBackend;
use services::{metadata_store::MetadataStore, photo_service::PhotoService, storage};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting photo-gallery with config: {:?}", cfg);

    // --- Ensure uploads directory exists ---
    let uploads_dir = &cfg.storage.local.uploads_dir;
    if cfg.storage.backend == StorageBackend::Local && !uploads_dir.exists() {
        fs::create_dir_all(uploads_dir)?;
        tracing::info!("Created uploads directory at {}", uploads_dir.display());
    }

    // --- Initialize core service ---
    let handle = storage::build_storage(&cfg.storage);
    let photos = PhotoService::new(MetadataStore::default(), handle.storage);
    let state = state::AppState {
        photos,
        uploads: handle.local,
    };

    // --- Build router ---
    let mut app: Router<state::AppState> = routes::routes::routes();
    if let Some(dir) = &cfg.static_dir {
        tracing::info!("Serving front end from {}", dir.display());
        app = app.fallback_service(
            ServeDir::new(dir).not_found_service(ServeFile::new(dir.join("index.html"))),
        );
    }
    let app: Router = app
        .with_state(state)
        .layer(DefaultBodyLimit::max(cfg.max_body_bytes))
        .layer(routes::routes::cors_layer(&cfg.cors_origins))
        .layer(TraceLayer::new_for_http());

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    let local_addr = listener.local_addr()?;
    tracing::info!("Server listening on http://{}", local_addr);
    tracing::info!("API available at http://{}/api/photos", local_addr);
    tracing::info!("Photo storage: {}", cfg.storage.backend);
    axum::serve(listener, app).await?;

    Ok(())
}

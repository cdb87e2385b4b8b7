//! Local asset server for dev mode.
//!
//! Serves the public directory at `/` so markup mounted into a foreign page
//! can load images from `http://localhost:<port>/...`. Every response is
//! CORS-open and uncached.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::BundleError;

/// `GET /health` body.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub ok: bool,
    #[serde(rename = "publicDir")]
    pub public_dir: String,
}

#[derive(Debug)]
struct ServerState {
    public_dir: PathBuf,
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        public_dir: state.public_dir.display().to_string(),
    })
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers(Any)
}

/// Router serving `public_dir`, with `/health` taking precedence over files.
pub fn router(public_dir: &Path) -> Router {
    let public_dir = std::path::absolute(public_dir).unwrap_or_else(|_| public_dir.to_path_buf());
    let state = Arc::new(ServerState {
        public_dir: public_dir.clone(),
    });

    Router::new()
        .route("/health", get(health))
        .fallback_service(ServeDir::new(&public_dir))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(cors_layer())
        .with_state(state)
}

/// Bind `port` on all interfaces and serve until the process stops.
pub async fn serve(public_dir: &Path, port: u16) -> Result<(), BundleError> {
    let app = router(public_dir);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| BundleError::ServerError(format!("failed to bind to {addr}: {e}")))?;

    tracing::info!(dir = %public_dir.display(), "serving");
    tracing::info!("http://localhost:{port}/");

    axum::serve(listener, app)
        .await
        .map_err(|e| BundleError::ServerError(format!("server error: {e}")))?;
    Ok(())
}

//! EchoMind server library logic.
//!
//! Serves the health check and the join-token endpoint clients call before
//! connecting to a LiveKit room.

pub mod api;
pub mod config;

use axum::{routing::get, Extension, Json, Router};
use echomind_voice::TokenIssuer;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Signs LiveKit join tokens.
    pub token_issuer: Arc<TokenIssuer>,
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/token",
            get(api::token_handler).post(api::token_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}

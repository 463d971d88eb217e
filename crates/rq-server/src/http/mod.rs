//! HTTP surface.

pub mod auth;
pub mod chat;
pub mod data_sources;
pub mod error;
pub mod models;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/available-models/", get(models::available_models))
        .route("/api/chat/history/:session_id/", get(chat::history))
        .route("/api/chat/", post(chat::chat))
        .route("/api/data-sources/", get(data_sources::list).post(data_sources::register))
        .route("/api/data-sources/:id", delete(data_sources::remove))
        .with_state(state)
}

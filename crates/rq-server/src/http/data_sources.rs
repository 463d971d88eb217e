//! Data-source registration, listing, and deletion.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::jobs::Job;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub repo_owner: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let sources = state.data_sources().list().await?;
    Ok(Json(sources))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<impl IntoResponse> {
    let source_type = body
        .source_type
        .ok_or_else(|| ApiError(rq_core::Error::MissingInput("source_type".into())))?;
    let repo_owner = body
        .repo_owner
        .ok_or_else(|| ApiError(rq_core::Error::MissingInput("repo_owner".into())))?;
    let repo_name = body
        .repo_name
        .ok_or_else(|| ApiError(rq_core::Error::MissingInput("repo_name".into())))?;

    if source_type != "github_repository" {
        return Err(ApiError(rq_core::Error::InvalidInput(format!(
            "source type '{source_type}' is not supported"
        ))));
    }

    let connection_details = serde_json::json!({
        "owner": repo_owner,
        "repo_name": repo_name,
        "repo_full_name": format!("{repo_owner}/{repo_name}"),
    });

    let store = state.data_sources();
    if store.find_by_connection(&connection_details).await?.is_some() {
        return Err(ApiError(rq_core::Error::Conflict(format!(
            "repository '{repo_owner}/{repo_name}' is already connected"
        ))));
    }

    let source = store.create(&repo_name, &source_type, &connection_details).await?;
    state.jobs.enqueue(&Job::IngestRepo { data_source_id: source.id }).await?;

    info!(id = %source.id, name = %source.name, "data source registered, ingestion queued");
    Ok((StatusCode::CREATED, Json(source)))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let store = state.data_sources();
    let source = store
        .get(id)
        .await?
        .ok_or_else(|| rq_core::Error::NotFound(format!("data source {id}")))?;

    // Cascade: graph nodes, vector namespace, then the registration row
    // (chat history and summaries follow via foreign keys).
    state.graph.cascade_delete(id).await?;
    state.vectors.delete_namespace(&id.to_string()).await?;
    store.delete(id).await?;

    info!(%id, name = %source.name, "data source deleted");
    Ok(Json(serde_json::json!({ "message": "Data source deleted successfully" })))
}

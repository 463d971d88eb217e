//! Usable-model listing: a configured model is available when it is active
//! and its referenced secret resolves.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AvailableModel {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub notes: String,
}

pub async fn available_models(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let mut available = Vec::new();

    for model in state.models().list_active().await? {
        let usable = match &model.api_key_name {
            None => true,
            Some(name) => state.secrets.get(name).await?.is_some(),
        };
        if usable {
            available.push(AvailableModel {
                id: model.model_id,
                name: model.display_name,
                provider: model.provider,
                notes: model.notes.unwrap_or_default(),
            });
        }
    }

    Ok(Json(available))
}

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::errors::AppError;
use crate::AppState;

/// Ids of the indexers configured in Jackett.
pub async fn get_trackers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.upstreams.jackett.indexer_ids().await?))
}

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TorrentQuery {
    pub torrent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MagnetQuery {
    pub magnet_link: String,
}

pub async fn get_torrents(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.upstreams.deluge.torrents().await?))
}

pub async fn pause_torrent(
    State(state): State<Arc<AppState>>,
    Path(torrent_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.upstreams.deluge.pause(&torrent_id).await?;
    Ok(Json(json!({ "status": "success" })))
}

/// Removes the torrent but keeps downloaded data on disk.
pub async fn remove_torrent(
    State(state): State<Arc<AppState>>,
    q: Result<Query<TorrentQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(q) = q?;
    if !state.upstreams.deluge.remove(&q.torrent_id).await? {
        return Err(AppError::BadRequest("Failed to delete torrent".into()));
    }
    Ok(Json(json!({ "status": "success" })))
}

pub async fn add_torrent(
    State(state): State<Arc<AppState>>,
    q: Result<Query<MagnetQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(q) = q?;
    match state.upstreams.deluge.add_magnet(&q.magnet_link).await? {
        Some(id) => Ok(Json(json!({ "status": "success", "torrent_id": id }))),
        None => Err(AppError::BadRequest("Failed to add torrent".into())),
    }
}

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::movies::TitleQuery;
use super::recommend;
use crate::errors::AppError;
use crate::media::{find_id_by_title, Media, MediaListing};
use crate::upstream::tmdb::MediaKind;
use crate::AppState;

const ALREADY_PRESENT: &str = "Serie already in watchlist or invalid title";

#[derive(Debug, Deserialize)]
pub struct AddSeriesQuery {
    pub title: String,
    pub year: Option<i64>,
}

pub async fn get_series(State(state): State<Arc<AppState>>) -> Result<Json<MediaListing>, AppError> {
    let library = state.upstreams.sonarr.library().await?;
    let series = library.iter().map(|s| Media::from_sonarr(s, true)).collect();
    Ok(Json(MediaListing::or_warn(series, "No series found")))
}

pub async fn recommend_series(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MediaListing>, AppError> {
    let library = state.upstreams.sonarr.library().await?;
    let listing =
        recommend::from_library(&state.upstreams.tmdb, &library, MediaKind::Tv, "series").await?;
    Ok(Json(listing))
}

pub async fn search_series(
    State(state): State<Arc<AppState>>,
    q: Result<Query<TitleQuery>, QueryRejection>,
) -> Result<Json<MediaListing>, AppError> {
    let Query(q) = q?;
    let found = state.upstreams.sonarr.lookup(&q.title).await?;
    let series = found.iter().map(|s| Media::from_sonarr(s, false)).collect();
    Ok(Json(MediaListing::or_warn(series, "No series found")))
}

pub async fn add_series(
    State(state): State<Arc<AppState>>,
    q: Result<Query<AddSeriesQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(q) = q?;
    let sonarr = &state.upstreams.sonarr;
    let Some(tvdb_id) = sonarr.tvdb_id(&q.title, q.year).await? else {
        tracing::warn!(title = %q.title, year = ?q.year, "no tvdb match");
        return Err(AppError::BadRequest(ALREADY_PRESENT.into()));
    };

    match sonarr.add(&q.title, tvdb_id).await {
        Ok(()) => Ok(Json(json!({
            "success": format!("Serie {} added to watchlist", q.title)
        }))),
        Err(e) if e.status() == Some(400) => Err(AppError::BadRequest(ALREADY_PRESENT.into())),
        Err(e) => Err(e.into()),
    }
}

pub async fn remove_series(
    State(state): State<Arc<AppState>>,
    q: Result<Query<TitleQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(q) = q?;
    let sonarr = &state.upstreams.sonarr;
    let library = sonarr.library().await?;
    let id = find_id_by_title(&library, &q.title)
        .ok_or_else(|| AppError::NotFound("Serie not found".into()))?;

    match sonarr.remove(id).await {
        Ok(()) => Ok(Json(json!({ "success": "Serie removed from watch list" }))),
        Err(e) if e.status() == Some(404) => Err(AppError::NotFound("Serie not found".into())),
        Err(e) => Err(e.into()),
    }
}

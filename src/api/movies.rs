use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::recommend;
use crate::errors::AppError;
use crate::media::{find_id_by_title, Media, MediaListing};
use crate::upstream::tmdb::MediaKind;
use crate::AppState;

const ALREADY_PRESENT: &str = "Movie already in watchlist or invalid title";

#[derive(Debug, Deserialize)]
pub struct TitleQuery {
    pub title: String,
}

pub async fn get_movies(State(state): State<Arc<AppState>>) -> Result<Json<MediaListing>, AppError> {
    let library = state.upstreams.radarr.library().await?;
    let movies = library.iter().map(|m| Media::from_radarr(m, true)).collect();
    Ok(Json(MediaListing::or_warn(movies, "No movies found")))
}

pub async fn recommend_movies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MediaListing>, AppError> {
    let library = state.upstreams.radarr.library().await?;
    let listing =
        recommend::from_library(&state.upstreams.tmdb, &library, MediaKind::Movie, "movies").await?;
    Ok(Json(listing))
}

pub async fn search_movies(
    State(state): State<Arc<AppState>>,
    q: Result<Query<TitleQuery>, QueryRejection>,
) -> Result<Json<MediaListing>, AppError> {
    let Query(q) = q?;
    let found = state.upstreams.radarr.lookup(&q.title).await?;
    let movies = found.iter().map(|m| Media::from_radarr(m, false)).collect();
    Ok(Json(MediaListing::or_warn(movies, "No movies found")))
}

pub async fn add_movie(
    State(state): State<Arc<AppState>>,
    q: Result<Query<TitleQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(q) = q?;
    let Some(tmdb_id) = state.upstreams.tmdb.search_movie_id(&q.title).await? else {
        tracing::warn!(title = %q.title, "no tmdb match");
        return Err(AppError::BadRequest(ALREADY_PRESENT.into()));
    };

    match state.upstreams.radarr.add(&q.title, tmdb_id).await {
        Ok(()) => Ok(Json(json!({
            "success": format!("Movie {} added to watchlist", q.title)
        }))),
        Err(e) if e.status() == Some(400) => Err(AppError::BadRequest(ALREADY_PRESENT.into())),
        Err(e) => Err(e.into()),
    }
}

pub async fn remove_movie(
    State(state): State<Arc<AppState>>,
    q: Result<Query<TitleQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(q) = q?;
    let radarr = &state.upstreams.radarr;
    let library = radarr.library().await?;
    let id = find_id_by_title(&library, &q.title)
        .ok_or_else(|| AppError::NotFound("Movie not found".into()))?;

    match radarr.remove(id).await {
        Ok(()) => Ok(Json(json!({ "success": "Movie removed from watch list" }))),
        Err(e) if e.status() == Some(404) => Err(AppError::NotFound("Movie not found".into())),
        Err(e) => Err(e.into()),
    }
}

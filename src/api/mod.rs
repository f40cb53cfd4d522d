use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id_middleware, security_headers_middleware};
use crate::AppState;

pub mod docs;
pub mod movies;
pub mod recommend;
pub mod series;
pub mod torrents;
pub mod trackers;

/// The Riverr API. Paths are relative; [`app_router`] mounts them under
/// `URL_PREFIX`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(info))
        // Radarr
        .route("/getmovies", get(movies::get_movies))
        .route("/recomovies", get(movies::recommend_movies))
        .route("/searchmovies", get(movies::search_movies))
        .route("/addmovies", post(movies::add_movie))
        .route("/removemovies", delete(movies::remove_movie))
        // Sonarr
        .route("/gettv", get(series::get_series))
        .route("/recotv", get(series::recommend_series))
        .route("/searchtv", get(series::search_series))
        .route("/addtv", post(series::add_series))
        .route("/removeseries", delete(series::remove_series))
        // Deluge
        .route("/gettorrents", get(torrents::get_torrents))
        .route("/pausetorrents/:torrent_id", get(torrents::pause_torrent))
        .route("/removetorrents", delete(torrents::remove_torrent))
        .route("/addtorrents", post(torrents::add_torrent))
        // Jackett
        .route("/gettrackers", get(trackers::get_trackers))
        // Docs
        .route("/specification", get(docs::specification))
        .route("/docs", get(docs::swagger_ui))
}

/// Full application: health checks at the root, the API under the prefix,
/// and the HTTP layers every response goes through.
pub fn app_router(state: Arc<AppState>) -> Router {
    let prefix = state.config.url_prefix.clone();

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check));

    // axum refuses to nest at the root path
    let app = if prefix.is_empty() {
        app.merge(api_router())
    } else {
        app.nest(&prefix, api_router())
    };

    app.fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware))
}

async fn info() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Riverr API." }))
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    if state.lifecycle.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn fallback_404() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "message": "Route not found",
                "type": "not_found_error",
                "code": "route_not_found",
            }
        })),
    )
}

use serde_json::Value;

use crate::errors::AppError;
use crate::media::{dominant_genre, Media, MediaListing};
use crate::upstream::tmdb::{MediaKind, TmdbClient};

/// Recommends popular TMDB titles from the library's dominant genre.
///
/// `noun` is the plural used in warnings ("movies", "series").
pub async fn from_library(
    tmdb: &TmdbClient,
    library: &[Value],
    kind: MediaKind,
    noun: &str,
) -> Result<MediaListing, AppError> {
    let Some(genre) = dominant_genre(library) else {
        return Ok(MediaListing::or_warn(vec![], format!("No {} found", noun)));
    };
    let nothing = format!("No {} to recommend for: {}", noun, genre);

    let Some(genre_id) = tmdb.genre_id(kind, &genre).await? else {
        tracing::debug!(genre = %genre, "genre unknown to tmdb");
        return Ok(MediaListing::or_warn(vec![], nothing));
    };

    let results = tmdb.discover(kind, genre_id).await?;
    let items = results
        .iter()
        .map(|r| Media::from_tmdb(r, kind == MediaKind::Tv, tmdb.poster_base()))
        .collect();
    Ok(MediaListing::or_warn(items, nothing))
}

use serde::Deserialize;
use serde_json::Value;

use super::{UpstreamClient, UpstreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    pub fn as_path(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Genre {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenreList {
    genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    results: Vec<Value>,
}

/// The Movie Database v3 API, authenticated with a bearer token.
#[derive(Clone)]
pub struct TmdbClient {
    api: UpstreamClient,
    poster_base: String,
}

impl TmdbClient {
    pub fn new(api: UpstreamClient, poster_base: String) -> Self {
        Self { api, poster_base }
    }

    pub fn poster_base(&self) -> &str {
        &self.poster_base
    }

    pub async fn genre_id(&self, kind: MediaKind, name: &str) -> Result<Option<i64>, UpstreamError> {
        let list: GenreList = self
            .api
            .get_json(
                &format!("genre/{}/list", kind.as_path()),
                &[("language", "en".into())],
            )
            .await?;
        Ok(list
            .genres
            .into_iter()
            .find(|g| g.name.eq_ignore_ascii_case(name))
            .map(|g| g.id))
    }

    /// Popular titles in a genre (second page, so the obvious hits are skipped).
    pub async fn discover(&self, kind: MediaKind, genre_id: i64) -> Result<Vec<Value>, UpstreamError> {
        let page: Page = self
            .api
            .get_json(
                &format!("discover/{}", kind.as_path()),
                &[
                    ("with_genres", genre_id.to_string()),
                    ("language", "en".into()),
                    ("page", "2".into()),
                    ("sort_by", "popularity.desc".into()),
                ],
            )
            .await?;
        Ok(page.results)
    }

    pub async fn search_movie_id(&self, title: &str) -> Result<Option<i64>, UpstreamError> {
        let page: Page = self
            .api
            .get_json(
                "search/movie",
                &[("query", title.to_string()), ("language", "en".into())],
            )
            .await?;
        Ok(page.results.first().and_then(|r| r["id"].as_i64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretValue;
    use crate::upstream::Auth;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tmdb(server: &MockServer) -> TmdbClient {
        TmdbClient::new(
            UpstreamClient::new(
                "tmdb",
                &server.uri(),
                Auth::Bearer(SecretValue::new("tmdb-token")),
                reqwest::Client::new(),
            ),
            "https://image.tmdb.org/t/p/original".into(),
        )
    }

    #[tokio::test]
    async fn test_genre_lookup_is_case_insensitive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/genre/tv/list"))
            .and(header("authorization", "Bearer tmdb-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "genres": [{"id": 18, "name": "Drama"}, {"id": 35, "name": "Comedy"}]
            })))
            .mount(&server)
            .await;

        let client = tmdb(&server);
        assert_eq!(client.genre_id(MediaKind::Tv, "comedy").await.unwrap(), Some(35));
        assert_eq!(client.genre_id(MediaKind::Tv, "Western").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_discover_requests_second_page_by_popularity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discover/movie"))
            .and(query_param("with_genres", "28"))
            .and(query_param("page", "2"))
            .and(query_param("sort_by", "popularity.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"original_title": "Heat"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = tmdb(&server).discover(MediaKind::Movie, 28).await.unwrap();
        assert_eq!(results[0]["original_title"], "Heat");
    }

    #[tokio::test]
    async fn test_search_without_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        assert_eq!(tmdb(&server).search_movie_id("zzz").await.unwrap(), None);
    }
}

use reqwest::Method;
use serde_json::{json, Value};

use super::{UpstreamClient, UpstreamError};

/// Radarr v3 API: the movie library.
#[derive(Clone)]
pub struct RadarrClient {
    api: UpstreamClient,
    root_folder: String,
    quality_profile: i64,
}

impl RadarrClient {
    pub fn new(api: UpstreamClient, root_folder: String, quality_profile: i64) -> Self {
        Self {
            api,
            root_folder,
            quality_profile,
        }
    }

    pub async fn library(&self) -> Result<Vec<Value>, UpstreamError> {
        self.api.get_json("movie", &[]).await
    }

    pub async fn lookup(&self, term: &str) -> Result<Vec<Value>, UpstreamError> {
        self.api
            .get_json("movie/lookup", &[("term", term.to_string())])
            .await
    }

    /// Adds a monitored movie. Radarr answers 400 when it is already present.
    pub async fn add(&self, title: &str, tmdb_id: i64) -> Result<(), UpstreamError> {
        let body = json!({
            "title": title,
            "tmdbId": tmdb_id,
            "qualityProfileId": self.quality_profile,
            "rootFolderPath": self.root_folder,
            "monitored": true,
        });
        self.api
            .send_ok(self.api.request(Method::POST, "movie").json(&body))
            .await?;
        tracing::info!(title, tmdb_id, "movie added to radarr");
        Ok(())
    }

    pub async fn remove(&self, id: i64) -> Result<(), UpstreamError> {
        self.api
            .send_ok(self.api.request(Method::DELETE, &format!("movie/{}", id)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretValue;
    use crate::upstream::Auth;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn radarr(server: &MockServer) -> RadarrClient {
        RadarrClient::new(
            UpstreamClient::new(
                "radarr",
                &server.uri(),
                Auth::ApiKeyHeader(SecretValue::new("k")),
                reqwest::Client::new(),
            ),
            "/movie".into(),
            1,
        )
    }

    #[tokio::test]
    async fn test_lookup_sends_term() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/lookup"))
            .and(query_param("term", "Avengers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"title": "Avengers"}])))
            .expect(1)
            .mount(&server)
            .await;

        let found = radarr(&server).lookup("Avengers").await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_add_posts_profile_and_root_folder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/movie"))
            .and(body_partial_json(json!({
                "tmdbId": 98,
                "qualityProfileId": 1,
                "rootFolderPath": "/movie",
                "monitored": true
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        radarr(&server).add("Gladiator", 98).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_add_surfaces_400() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = radarr(&server).add("Gladiator", 98).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }
}

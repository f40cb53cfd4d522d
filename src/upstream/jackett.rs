use serde::Deserialize;

use super::{UpstreamClient, UpstreamError};

#[derive(Debug, Deserialize)]
struct Indexer {
    id: String,
}

/// Jackett indexer listing.
#[derive(Clone)]
pub struct JackettClient {
    api: UpstreamClient,
}

impl JackettClient {
    pub fn new(api: UpstreamClient) -> Self {
        Self { api }
    }

    pub async fn indexer_ids(&self) -> Result<Vec<String>, UpstreamError> {
        let indexers: Vec<Indexer> = self.api.get_json("", &[]).await?;
        Ok(indexers.into_iter().map(|i| i.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretValue;
    use crate::upstream::Auth;
    use serde_json::json;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_indexer_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-Api-Key", "jackett-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "1337x", "name": "1337x"},
                {"id": "yts", "name": "YTS"}
            ])))
            .mount(&server)
            .await;

        let client = JackettClient::new(UpstreamClient::new(
            "jackett",
            &server.uri(),
            Auth::ApiKeyHeader(SecretValue::new("jackett-key")),
            reqwest::Client::new(),
        ));
        assert_eq!(client.indexer_ids().await.unwrap(), vec!["1337x", "yts"]);
    }
}

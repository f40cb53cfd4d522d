//! Authenticated HTTP clients for the upstream services.
//!
//! Every outbound call carries a credential taken from the validated
//! [`Credentials`]. No retries: a failed call fails the request that made it.

pub mod deluge;
pub mod jackett;
pub mod radarr;
pub mod sonarr;
pub mod tmdb;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::{ServiceEndpoint, UpstreamConfig};
use crate::credentials::Credentials;
use crate::secrets::SecretValue;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} did not answer in time")]
    Timeout { service: &'static str },

    #[error("{service} rejected the credentials (HTTP {status})")]
    Unauthorized { service: &'static str, status: u16 },

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("failed to decode {service} response: {reason}")]
    Decode { service: &'static str, reason: String },

    #[error("{service} request failed: {reason}")]
    Transport { service: &'static str, reason: String },

    #[error("{service} RPC error: {message}")]
    Rpc { service: &'static str, message: String },
}

impl UpstreamError {
    /// HTTP status the upstream answered with, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Unauthorized { status, .. } | UpstreamError::Status { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            UpstreamError::Timeout { service }
            | UpstreamError::Unauthorized { service, .. }
            | UpstreamError::Status { service, .. }
            | UpstreamError::Decode { service, .. }
            | UpstreamError::Transport { service, .. }
            | UpstreamError::Rpc { service, .. } => service,
        }
    }

    fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout { service }
        } else if err.is_decode() {
            UpstreamError::Decode {
                service,
                reason: err.without_url().to_string(),
            }
        } else {
            // strip the URL: query strings may carry keys
            UpstreamError::Transport {
                service,
                reason: err.without_url().to_string(),
            }
        }
    }
}

/// How a service expects its credential.
#[derive(Clone)]
pub enum Auth {
    /// `X-Api-Key: <key>` (Radarr, Sonarr, Jackett)
    ApiKeyHeader(SecretValue),
    /// `Authorization: Bearer <token>` (TMDB)
    Bearer(SecretValue),
    /// Session-based (Deluge logs in with its password and keeps a cookie)
    None,
}

/// Builds the shared reqwest client. `cookies` enables a per-client cookie jar.
pub fn build_http_client(cfg: &UpstreamConfig, cookies: bool) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(8)
        .timeout(cfg.timeout)
        .connect_timeout(cfg.connect_timeout)
        .cookie_store(cookies)
        .user_agent(concat!("riverr/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// A base URL plus credential for one upstream service.
#[derive(Clone)]
pub struct UpstreamClient {
    service: &'static str,
    base_url: String,
    auth: Auth,
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(service: &'static str, base_url: &str, auth: Auth, http: reqwest::Client) -> Self {
        Self {
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.auth {
            Auth::ApiKeyHeader(key) => builder.header("X-Api-Key", key.expose()),
            Auth::Bearer(token) => builder.bearer_auth(token.expose()),
            Auth::None => builder,
        }
    }

    /// Sends the request; 401/403 become [`UpstreamError::Unauthorized`],
    /// other statuses are returned to the caller untouched.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, UpstreamError> {
        let resp = builder.send().await.map_err(|e| {
            let err = UpstreamError::from_reqwest(self.service, e);
            tracing::warn!(service = self.service, "upstream request failed: {}", err);
            err
        })?;

        let status = resp.status();
        tracing::debug!(service = self.service, status = status.as_u16(), "upstream response");
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(service = self.service, status = status.as_u16(), "upstream rejected credentials");
            return Err(UpstreamError::Unauthorized {
                service: self.service,
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    /// Like [`send`](Self::send) but any non-2xx status is an error.
    pub async fn send_ok(&self, builder: RequestBuilder) -> Result<Response, UpstreamError> {
        let resp = self.send(builder).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                service: self.service,
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    pub async fn json<T: DeserializeOwned>(&self, resp: Response) -> Result<T, UpstreamError> {
        resp.json::<T>().await.map_err(|e| UpstreamError::Decode {
            service: self.service,
            reason: e.without_url().to_string(),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let resp = self
            .send_ok(self.request(Method::GET, path).query(query))
            .await?;
        self.json(resp).await
    }
}

/// All upstream services, wired with their credentials.
#[derive(Clone)]
pub struct Upstreams {
    pub radarr: radarr::RadarrClient,
    pub sonarr: sonarr::SonarrClient,
    pub tmdb: tmdb::TmdbClient,
    pub deluge: deluge::DelugeClient,
    pub jackett: jackett::JackettClient,
}

impl Upstreams {
    pub fn new(cfg: &UpstreamConfig, credentials: &Credentials) -> anyhow::Result<Self> {
        let http = build_http_client(cfg, false)?;
        let key = |endpoint: &ServiceEndpoint| {
            credentials
                .get(&endpoint.secret)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("secret '{}' was not exported", endpoint.secret))
        };

        Ok(Self {
            radarr: radarr::RadarrClient::new(
                UpstreamClient::new(
                    "radarr",
                    &cfg.radarr.base_url,
                    Auth::ApiKeyHeader(key(&cfg.radarr)?),
                    http.clone(),
                ),
                cfg.radarr_root_folder.clone(),
                cfg.radarr_quality_profile,
            ),
            sonarr: sonarr::SonarrClient::new(
                UpstreamClient::new(
                    "sonarr",
                    &cfg.sonarr.base_url,
                    Auth::ApiKeyHeader(key(&cfg.sonarr)?),
                    http.clone(),
                ),
                sonarr::SeriesDefaults {
                    root_folder: cfg.sonarr_root_folder.clone(),
                    quality_profile: cfg.sonarr_quality_profile,
                    language_profile: cfg.sonarr_language_profile,
                },
            ),
            tmdb: tmdb::TmdbClient::new(
                UpstreamClient::new(
                    "tmdb",
                    &cfg.tmdb.base_url,
                    Auth::Bearer(key(&cfg.tmdb)?),
                    http.clone(),
                ),
                cfg.tmdb_poster_url.clone(),
            ),
            deluge: deluge::DelugeClient::new(
                UpstreamClient::new(
                    "deluge",
                    &cfg.deluge.base_url,
                    Auth::None,
                    // deluge's session lives in a cookie; keep it off the shared client
                    build_http_client(cfg, true)?,
                ),
                key(&cfg.deluge)?,
            ),
            jackett: jackett::JackettClient::new(UpstreamClient::new(
                "jackett",
                &cfg.jackett.base_url,
                Auth::ApiKeyHeader(key(&cfg.jackett)?),
                http,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str, auth: Auth, timeout: Duration) -> UpstreamClient {
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap();
        UpstreamClient::new("radarr", base, auth, http)
    }

    #[test]
    fn test_url_joining() {
        let c = client("http://h:7878/api/v3/", Auth::None, Duration::from_secs(1));
        assert_eq!(c.url("movie"), "http://h:7878/api/v3/movie");
        assert_eq!(c.url("/movie/lookup"), "http://h:7878/api/v3/movie/lookup");
        assert_eq!(c.url(""), "http://h:7878/api/v3");
    }

    #[tokio::test]
    async fn test_api_key_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie"))
            .and(header("X-Api-Key", "radarr-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(
            &server.uri(),
            Auth::ApiKeyHeader(SecretValue::new("radarr-secret")),
            Duration::from_secs(5),
        );
        let v: Vec<serde_json::Value> = c.get_json("movie", &[]).await.unwrap();
        assert!(v.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let c = client(&server.uri(), Auth::Bearer(SecretValue::new("bad")), Duration::from_secs(5));
        let err = c.get_json::<serde_json::Value>("x", &[]).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unauthorized { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let c = client(&server.uri(), Auth::None, Duration::from_millis(50));
        let err = c.get_json::<serde_json::Value>("slow", &[]).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout { service: "radarr" }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let c = client(&server.uri(), Auth::None, Duration::from_secs(5));
        let err = c.get_json::<serde_json::Value>("x", &[]).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_hides_the_url() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let c = client(&format!("http://{}", addr), Auth::None, Duration::from_secs(2));
        let err = c
            .get_json::<serde_json::Value>("indexers", &[("apikey", "hunter2".to_string())])
            .await
            .unwrap_err();
        match err {
            UpstreamError::Transport { service, reason } => {
                assert_eq!(service, "radarr");
                assert!(!reason.contains("hunter2"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

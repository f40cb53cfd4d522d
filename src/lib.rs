//! Riverr: a home-media backend fronting Radarr, Sonarr, TMDB, Deluge and
//! Jackett.
//!
//! Startup resolves the upstream API keys from a secret source, validates
//! them and only then binds the HTTP listener. See [`server::Launcher`].

pub mod api;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod exporter;
pub mod lifecycle;
pub mod media;
pub mod middleware;
pub mod secrets;
pub mod server;
pub mod upstream;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: config::Config,
    pub credentials: credentials::Credentials,
    pub upstreams: upstream::Upstreams,
    pub lifecycle: lifecycle::Lifecycle,
    /// Rendered once at startup, served from `/specification`.
    pub openapi: serde_json::Value,
}

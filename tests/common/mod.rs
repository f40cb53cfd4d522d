//! Shared fixtures: a config whose upstreams all live on one wiremock server,
//! and an in-memory secret source holding every key the service needs.

#![allow(dead_code)]

use std::collections::HashMap;

use riverr::config::Config;
use riverr::secrets::memory::StaticSource;
use wiremock::MockServer;

pub const UPSTREAM_KEYS: [(&str, &str); 5] = [
    ("RADARR_KEY", "radarr-key"),
    ("SONARR_KEY", "sonarr-key"),
    ("TMDB_KEY", "tmdb-token"),
    ("DELUGE_KEY", "deluge-pw"),
    ("JACKETT_KEY", "jackett-key"),
];

/// Config bound to 127.0.0.1:0 with each upstream under its own path prefix
/// on `server` (`/radarr`, `/sonarr`, `/tmdb`, `/deluge`, `/jackett`).
pub fn config_for(server: &MockServer, extra: &[(&str, &str)]) -> Config {
    let uri = server.uri();
    let mut vars: HashMap<String, String> = HashMap::from([
        ("RIVERR_HOST".to_string(), "127.0.0.1".to_string()),
        ("RIVERR_PORT".to_string(), "0".to_string()),
        ("RIVERR_PUBLISH_ENV".to_string(), "false".to_string()),
        ("RIVERR_DELUGE_LOGIN_ON_STARTUP".to_string(), "false".to_string()),
        ("RADARR_URL".to_string(), format!("{}/radarr", uri)),
        ("SONARR_URL".to_string(), format!("{}/sonarr", uri)),
        ("TMDB_URL".to_string(), format!("{}/tmdb", uri)),
        ("DELUGE_URL".to_string(), format!("{}/deluge", uri)),
        ("JACKETT_URL".to_string(), format!("{}/jackett", uri)),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|name| vars.get(name).cloned()).expect("test config is valid")
}

/// Every upstream key plus `extra` pairs.
pub fn source_with(extra: &[(&'static str, &'static str)]) -> StaticSource {
    StaticSource::new(UPSTREAM_KEYS.iter().chain(extra.iter()).copied())
}

use std::net::IpAddr;
use std::time::Duration;

use anyhow::Context;

use crate::secrets::{RequiredSecrets, SecretError, SecretSource, SecretValue, SourceSpec};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_UPSTREAM_HOST: &str = "192.168.1.81";
pub const DEFAULT_EXPOSED_ADDRESS: &str = "https://myserver.com/";
pub const TMDB_POSTER_URL: &str = "https://image.tmdb.org/t/p/original";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// Path prefix all API routes are mounted under, e.g. `/riverr`. Empty for root.
    pub url_prefix: String,
    /// When set, the OpenAPI document advertises `exposed_address + url_prefix`.
    pub server_address: Option<String>,
    pub exposed_address: String,
    pub secret_source: SourceSpec,
    pub master_key: Option<SecretValue>,
    /// Upper bound on a `command:` source's run.
    pub secret_command_timeout: Duration,
    /// Extra names on top of the upstream keys, from `RIVERR_REQUIRED_SECRETS`.
    pub extra_secrets: RequiredSecrets,
    /// Also bind exported secrets into the process environment.
    pub publish_env: bool,
    pub drain_timeout: Duration,
    pub deluge_login_on_startup: bool,
    pub upstreams: UpstreamConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub base_url: String,
    /// Name of the secret that authenticates calls to this service.
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub radarr: ServiceEndpoint,
    pub sonarr: ServiceEndpoint,
    pub tmdb: ServiceEndpoint,
    pub deluge: ServiceEndpoint,
    pub jackett: ServiceEndpoint,
    pub tmdb_poster_url: String,
    pub radarr_root_folder: String,
    pub radarr_quality_profile: i64,
    pub sonarr_root_folder: String,
    pub sonarr_quality_profile: i64,
    pub sonarr_language_profile: i64,
}

impl UpstreamConfig {
    /// Names of the secrets the route handlers authenticate with.
    pub fn secret_names(&self) -> [&str; 5] {
        [
            &self.radarr.secret,
            &self.sonarr.secret,
            &self.tmdb.secret,
            &self.deluge.secret,
            &self.jackett.secret,
        ]
    }
}

impl Config {
    /// Everything that must resolve before the listener binds: the upstream
    /// keys plus any extra names.
    pub fn required_secrets(&self) -> RequiredSecrets {
        let upstream = RequiredSecrets::new(self.upstreams.secret_names())
            .unwrap_or_default();
        upstream.union(&self.extra_secrets)
    }

    pub fn build_secret_source(&self) -> Result<Box<dyn SecretSource>, SecretError> {
        self.secret_source
            .build(self.master_key.as_ref(), self.secret_command_timeout)
    }

    pub fn bind_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.host, self.port)
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("RIVERR_HOST")
            .unwrap_or_else(|| "0.0.0.0".into())
            .parse()
            .context("RIVERR_HOST is not an IP address")?;
        let port = match var("RIVERR_PORT") {
            Some(p) => p.parse().context("RIVERR_PORT is not a valid port")?,
            None => DEFAULT_PORT,
        };

        let secret_source = var("RIVERR_SECRET_SOURCE")
            .unwrap_or_default()
            .parse::<SourceSpec>()
            .context("invalid RIVERR_SECRET_SOURCE")?;
        let extra_secrets = var("RIVERR_REQUIRED_SECRETS")
            .unwrap_or_default()
            .parse::<RequiredSecrets>()
            .context("invalid RIVERR_REQUIRED_SECRETS")?;

        let upstream_host = var("RIVERR_UPSTREAM_HOST").unwrap_or_else(|| DEFAULT_UPSTREAM_HOST.into());
        let endpoint = |url_var: &str,
                        default_url: String,
                        key_var: &str,
                        default_key: &str|
         -> anyhow::Result<ServiceEndpoint> {
            let base_url = var(url_var).unwrap_or(default_url);
            url::Url::parse(&base_url).with_context(|| format!("{} is not a valid URL", url_var))?;
            Ok(ServiceEndpoint {
                base_url: base_url.trim_end_matches('/').to_string(),
                secret: var(key_var).unwrap_or_else(|| default_key.into()),
            })
        };

        let upstreams = UpstreamConfig {
            timeout: Duration::from_secs(parse_or(&var, "RIVERR_UPSTREAM_TIMEOUT_SECS", 30)?),
            connect_timeout: Duration::from_secs(5),
            radarr: endpoint(
                "RADARR_URL",
                format!("http://{}:7878/api/v3", upstream_host),
                "RIVERR_RADARR_SECRET",
                "RADARR_KEY",
            )?,
            sonarr: endpoint(
                "SONARR_URL",
                format!("http://{}:8989/api/v3", upstream_host),
                "RIVERR_SONARR_SECRET",
                "SONARR_KEY",
            )?,
            tmdb: endpoint(
                "TMDB_URL",
                "https://api.themoviedb.org/3".into(),
                "RIVERR_TMDB_SECRET",
                "TMDB_KEY",
            )?,
            deluge: endpoint(
                "DELUGE_URL",
                format!("http://{}:8112/json", upstream_host),
                "RIVERR_DELUGE_SECRET",
                "DELUGE_KEY",
            )?,
            jackett: endpoint(
                "JACKETT_URL",
                format!("http://{}:9117/api/v2.0/indexers", upstream_host),
                "RIVERR_JACKETT_SECRET",
                "JACKETT_KEY",
            )?,
            tmdb_poster_url: var("TMDB_POSTER_URL").unwrap_or_else(|| TMDB_POSTER_URL.into()),
            radarr_root_folder: var("RIVERR_RADARR_ROOT_FOLDER").unwrap_or_else(|| "/movie".into()),
            radarr_quality_profile: parse_or(&var, "RIVERR_RADARR_QUALITY_PROFILE", 1)?,
            sonarr_root_folder: var("RIVERR_SONARR_ROOT_FOLDER").unwrap_or_else(|| "/tv".into()),
            sonarr_quality_profile: parse_or(&var, "RIVERR_SONARR_QUALITY_PROFILE", 1)?,
            sonarr_language_profile: parse_or(&var, "RIVERR_SONARR_LANGUAGE_PROFILE", 1)?,
        };

        // secret names must be valid env var names
        RequiredSecrets::new(upstreams.secret_names()).context("invalid upstream secret name")?;

        Ok(Config {
            host,
            port,
            url_prefix: normalize_prefix(&var("URL_PREFIX").unwrap_or_default()),
            server_address: var("SERVER_ADDRESS"),
            exposed_address: var("RIVERR_EXPOSED_ADDRESS")
                .unwrap_or_else(|| DEFAULT_EXPOSED_ADDRESS.into()),
            secret_source,
            master_key: var("RIVERR_MASTER_KEY").map(SecretValue::new),
            secret_command_timeout: Duration::from_secs(parse_or(
                &var,
                "RIVERR_SECRET_COMMAND_TIMEOUT_SECS",
                30,
            )?),
            extra_secrets,
            publish_env: parse_bool(&var, "RIVERR_PUBLISH_ENV", true)?,
            drain_timeout: Duration::from_secs(parse_or(&var, "RIVERR_DRAIN_TIMEOUT_SECS", 30)?),
            deluge_login_on_startup: parse_bool(&var, "RIVERR_DELUGE_LOGIN_ON_STARTUP", true)?,
            upstreams,
        })
    }
}

/// Loads `.env` (if present) and reads the configuration from the environment.
pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    Config::from_lookup(|name| std::env::var(name).ok())
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value", name)),
        None => Ok(default),
    }
}

fn parse_bool<F>(var: &F, name: &str, default: bool) -> anyhow::Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be true or false, got '{}'", name, v),
        },
    }
}

/// `riverr/` → `/riverr`, `/` → ``.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

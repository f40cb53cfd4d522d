//! Deluge Web UI JSON-RPC client.
//!
//! The web UI authenticates with `auth.login` and hands back a session
//! cookie, kept in this client's own cookie jar. A call answered with
//! "Not authenticated" logs in again and is replayed once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{UpstreamClient, UpstreamError};
use crate::secrets::SecretValue;

const NOT_AUTHENTICATED: &str = "Not authenticated";

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Clone)]
pub struct DelugeClient {
    api: UpstreamClient,
    password: SecretValue,
    next_id: Arc<AtomicU64>,
}

impl DelugeClient {
    pub fn new(api: UpstreamClient, password: SecretValue) -> Self {
        Self {
            api,
            password,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub async fn login(&self) -> Result<(), UpstreamError> {
        let result = self
            .call_once("auth.login", json!([self.password.expose()]))
            .await?;
        if result.as_bool() == Some(true) {
            tracing::info!("authenticated to deluge");
            Ok(())
        } else {
            Err(UpstreamError::Rpc {
                service: self.api.service(),
                message: "auth.login was rejected".into(),
            })
        }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, UpstreamError> {
        match self.call_once(method, params.clone()).await {
            Err(UpstreamError::Rpc { message, .. }) if message.contains(NOT_AUTHENTICATED) => {
                tracing::debug!(method, "deluge session expired, logging in again");
                self.login().await?;
                self.call_once(method, params).await
            }
            other => other,
        }
    }

    async fn call_once(&self, method: &str, params: Value) -> Result<Value, UpstreamError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({ "id": id, "method": method, "params": params });
        let resp = self
            .api
            .send_ok(self.api.request(Method::POST, "").json(&payload))
            .await?;
        let body: RpcResponse = self.api.json(resp).await?;
        match body.error {
            Some(err) => Err(UpstreamError::Rpc {
                service: self.api.service(),
                message: err.message,
            }),
            None => Ok(body.result),
        }
    }

    /// Status of every torrent, keyed by torrent id.
    pub async fn torrents(&self) -> Result<Value, UpstreamError> {
        self.call("core.get_torrents_status", json!([{}, []])).await
    }

    pub async fn pause(&self, torrent_id: &str) -> Result<(), UpstreamError> {
        self.call("core.pause_torrent", json!([[torrent_id]])).await?;
        Ok(())
    }

    /// Removes a torrent, keeping its data. `false` when deluge refused.
    pub async fn remove(&self, torrent_id: &str) -> Result<bool, UpstreamError> {
        let result = self
            .call("core.remove_torrent", json!([torrent_id, false]))
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Adds a magnet link; the new torrent id, or `None` when deluge refused.
    pub async fn add_magnet(&self, magnet_link: &str) -> Result<Option<String>, UpstreamError> {
        let result = self
            .call("core.add_torrent_magnet", json!([magnet_link, {}]))
            .await?;
        Ok(result.as_str().map(str::to_string))
    }
}

use std::net::SocketAddr;

use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::credentials::StartupValidationError;
use crate::exporter::SecretResolutionError;
use crate::lifecycle::TransitionError;
use crate::secrets::SecretError;
use crate::upstream::UpstreamError;

/// Per-request failures, rendered as `{"error": {message, type, code}}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("service is shutting down")]
    Draining,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "not_found",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                msg.clone(),
            ),
            AppError::Draining => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable_error",
                "shutting_down",
                self.to_string(),
            ),
            AppError::Upstream(e) => upstream_parts(e),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

fn upstream_parts(e: &UpstreamError) -> (StatusCode, &'static str, &'static str, String) {
    tracing::warn!(service = e.service(), "upstream call failed: {}", e);
    match e {
        UpstreamError::Timeout { .. } => (
            StatusCode::GATEWAY_TIMEOUT,
            "timeout_error",
            "upstream_timeout",
            e.to_string(),
        ),
        UpstreamError::Unauthorized { .. } => (
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            "upstream_auth_rejected",
            e.to_string(),
        ),
        UpstreamError::Status { status: 404, .. } => (
            StatusCode::NOT_FOUND,
            "not_found_error",
            "upstream_not_found",
            "Route not found".to_string(),
        ),
        UpstreamError::Status { status: 400, .. } => (
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            "upstream_bad_request",
            e.to_string(),
        ),
        UpstreamError::Decode { .. } => (
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            "upstream_decode_failed",
            e.to_string(),
        ),
        UpstreamError::Status { .. } | UpstreamError::Transport { .. } | UpstreamError::Rpc { .. } => (
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            "upstream_failed",
            e.to_string(),
        ),
    }
}

/// Fatal failures while launching the service. Each maps to a process exit code.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("secret source unavailable: {0}")]
    SecretSource(#[from] SecretError),

    #[error(transparent)]
    SecretResolution(#[from] SecretResolutionError),

    #[error(transparent)]
    Validation(#[from] StartupValidationError),

    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),

    #[error("deluge handshake failed: {0}")]
    Handshake(UpstreamError),

    #[error(transparent)]
    Lifecycle(#[from] TransitionError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

impl StartupError {
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::SecretSource(_) | StartupError::SecretResolution(_) => 2,
            StartupError::Validation(_) | StartupError::Config(_) | StartupError::Handshake(_) => 3,
            StartupError::Lifecycle(_) | StartupError::Bind { .. } | StartupError::Serve(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_timeout_is_504() {
        let (status, body) = render(UpstreamError::Timeout { service: "radarr" }.into()).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"]["code"], "upstream_timeout");
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_flagged() {
        let (status, body) = render(
            UpstreamError::Unauthorized {
                service: "tmdb",
                status: 401,
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "upstream_auth_rejected");
        assert_eq!(body["error"]["type"], "upstream_error");
    }

    #[tokio::test]
    async fn test_upstream_404_is_route_not_found() {
        let (status, body) = render(
            UpstreamError::Status {
                service: "sonarr",
                status: 404,
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Route not found");
    }

    #[tokio::test]
    async fn test_internal_errors_are_opaque() {
        let (status, body) = render(anyhow::anyhow!("db password is hunter2").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "internal server error");
    }

    #[test]
    fn test_exit_codes() {
        let resolution = StartupError::SecretResolution(SecretResolutionError {
            source_name: "env".into(),
            failures: vec![SecretError::NotFound("KEY_B".into())],
        });
        assert_eq!(resolution.exit_code(), 2);

        let validation = StartupError::Validation(StartupValidationError {
            missing: vec!["KEY_B".into()],
            empty: vec![],
        });
        assert_eq!(validation.exit_code(), 3);

        let bind = StartupError::Bind {
            addr: "127.0.0.1:3000".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert_eq!(bind.exit_code(), 1);
    }
}

//! Forced-drain support.
//!
//! Graceful shutdown lets in-flight requests finish. When the drain deadline
//! passes, the [`KillSwitch`] is tripped and every request still running
//! behind [`drain_guard`] is cut short with a 503, so its connection can close.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::watch;

use crate::errors::AppError;

#[derive(Clone)]
pub struct KillSwitch {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl KillSwitch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn trip(&self) {
        self.tx.send_replace(true);
    }

    fn is_tripped(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

async fn tripped(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|killed| *killed).await.is_err() {
        // switch dropped without tripping
        std::future::pending::<()>().await;
    }
}

pub async fn drain_guard(State(switch): State<KillSwitch>, req: Request, next: Next) -> Response {
    if switch.is_tripped() {
        return AppError::Draining.into_response();
    }

    let rx = switch.subscribe();
    tokio::select! {
        resp = next.run(req) => resp,
        _ = tripped(rx) => {
            tracing::warn!("request cut short by forced drain");
            AppError::Draining.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(switch: KillSwitch) -> Router {
        Router::new()
            .route("/fast", get(|| async { "done" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    "too late"
                }),
            )
            .layer(axum::middleware::from_fn_with_state(switch, drain_guard))
    }

    fn get_req(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_untripped_switch_is_transparent() {
        let resp = app(KillSwitch::new()).oneshot(get_req("/fast")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_trip_cuts_in_flight_request() {
        let switch = KillSwitch::new();
        let pending = tokio::spawn(app(switch.clone()).oneshot(get_req("/slow")));

        tokio::time::sleep(Duration::from_millis(50)).await;
        switch.trip();

        let resp = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("request should end after trip")
            .unwrap()
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_requests_after_trip_are_refused() {
        let switch = KillSwitch::new();
        switch.trip();
        let resp = app(switch).oneshot(get_req("/fast")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

//! Launch sequence.
//!
//! ```text
//! export secrets → validate → wire upstreams → deluge login → bind → Ready
//! ```
//!
//! Nothing binds until every step before it has succeeded. After the
//! shutdown signal the listener stops accepting, in-flight requests get
//! `drain_timeout` to finish, and whatever is left is cut short.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::errors::StartupError;
use crate::exporter::{ExportReport, Exporter};
use crate::lifecycle::Lifecycle;
use crate::middleware::{drain_guard, KillSwitch};
use crate::secrets::SecretSource;
use crate::upstream::Upstreams;
use crate::AppState;

/// How long cut-short requests get to flush their 503 before the server task
/// is dropped outright.
const FORCE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Every in-flight request finished within the drain timeout.
    Drained,
    /// The drain timeout passed and the remaining requests were dropped.
    Forced,
}

enum Secrets {
    /// Resolved by the launcher itself.
    Source(Box<dyn SecretSource>),
    /// Already exported before the runtime started.
    Exported(ExportReport),
}

/// Runs the pre-bind steps. The launcher never writes the process
/// environment; publishing happens in [`Exporter::export`] before the
/// multi-threaded runtime exists.
pub struct Launcher {
    config: Config,
    secrets: Secrets,
    lifecycle: Lifecycle,
}

impl Launcher {
    pub fn new(config: Config, source: Box<dyn SecretSource>) -> Self {
        Self {
            config,
            secrets: Secrets::Source(source),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Launches from secrets that were exported earlier in the process.
    pub fn exported(config: Config, report: ExportReport) -> Self {
        Self {
            config,
            secrets: Secrets::Exported(report),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Builds the secret source named by `RIVERR_SECRET_SOURCE`.
    pub fn from_config(config: Config) -> Result<Self, StartupError> {
        let source = config.build_secret_source()?;
        Ok(Self::new(config, source))
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Runs every pre-bind step. Any failure leaves the lifecycle in
    /// `FailedStartup`.
    pub async fn prepare(self) -> Result<PreparedService, StartupError> {
        let lifecycle = self.lifecycle.clone();
        match self.prepare_inner().await {
            Ok(prepared) => Ok(prepared),
            Err(e) => {
                if let Err(t) = lifecycle.fail_startup() {
                    warn!("{}", t);
                }
                Err(e)
            }
        }
    }

    async fn prepare_inner(self) -> Result<PreparedService, StartupError> {
        self.lifecycle.begin_export()?;

        let required = self.config.required_secrets();
        let report = match self.secrets {
            Secrets::Exported(report) => report,
            Secrets::Source(source) => Exporter::new(source.as_ref(), &required).resolve().await?,
        };
        info!(
            source = %report.source,
            count = report.secrets.len(),
            exported_at = %report.exported_at,
            "secrets exported"
        );

        let credentials = Credentials::validate(&required, report.secrets)?;
        info!("startup validation passed");

        let upstreams =
            Upstreams::new(&self.config.upstreams, &credentials).map_err(StartupError::Config)?;

        if self.config.deluge_login_on_startup {
            upstreams
                .deluge
                .login()
                .await
                .map_err(StartupError::Handshake)?;
        }

        let openapi = api::docs::openapi_document(&self.config);
        Ok(PreparedService {
            state: Arc::new(AppState {
                config: self.config,
                credentials,
                upstreams,
                lifecycle: self.lifecycle,
                openapi,
            }),
        })
    }
}

/// A validated service that has not bound its listener yet.
pub struct PreparedService {
    state: Arc<AppState>,
}

impl PreparedService {
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn router(&self, kill: &KillSwitch) -> Router {
        api::app_router(self.state.clone())
            .layer(axum::middleware::from_fn_with_state(kill.clone(), drain_guard))
    }

    pub async fn bind(&self) -> Result<TcpListener, StartupError> {
        let addr = self.state.config.bind_addr();
        match TcpListener::bind(addr).await {
            Ok(listener) => Ok(listener),
            Err(source) => {
                if let Err(t) = self.state.lifecycle.fail_startup() {
                    warn!("{}", t);
                }
                Err(StartupError::Bind { addr, source })
            }
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<ServeOutcome, StartupError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<ServeOutcome, StartupError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let kill = KillSwitch::new();
        let router = self.router(&kill);
        let lifecycle = self.state.lifecycle.clone();
        let drain_timeout = self.state.config.drain_timeout;

        lifecycle.ready(&self.state.credentials)?;
        match listener.local_addr() {
            Ok(addr) => info!(%addr, prefix = %self.state.config.url_prefix, "Riverr API listening"),
            Err(e) => warn!("listening on an unknown address: {}", e),
        }

        let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
        let signal = async move {
            shutdown.await;
            let _ = signalled_tx.send(());
        };
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
        });

        tokio::select! {
            finished = &mut server => {
                // the server stopped on its own
                flatten(finished)?;
                lifecycle.begin_drain()?;
                lifecycle.stop()?;
                return Ok(ServeOutcome::Drained);
            }
            _ = signalled_rx => {}
        }

        lifecycle.begin_drain()?;
        info!(timeout_secs = drain_timeout.as_secs(), "shutdown signal received, draining");

        let outcome = match tokio::time::timeout(drain_timeout, &mut server).await {
            Ok(finished) => {
                flatten(finished)?;
                info!("all in-flight requests completed");
                ServeOutcome::Drained
            }
            Err(_) => {
                warn!(
                    timeout_secs = drain_timeout.as_secs(),
                    "drain timeout exceeded, dropping remaining requests"
                );
                kill.trip();
                if tokio::time::timeout(FORCE_GRACE, &mut server).await.is_err() {
                    server.abort();
                }
                ServeOutcome::Forced
            }
        };

        lifecycle.stop()?;
        Ok(outcome)
    }
}

fn flatten(
    finished: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), StartupError> {
    match finished {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(StartupError::Serve(e)),
        Err(e) => Err(StartupError::Serve(std::io::Error::new(
            std::io::ErrorKind::Other,
            e,
        ))),
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(?err, "failed to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}

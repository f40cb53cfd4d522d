use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riverr::cli::{self, Commands, VaultCommands};
use riverr::config::{self, Config};
use riverr::credentials::Credentials;
use riverr::errors::StartupError;
use riverr::exporter::{self, ExportFormat, ExportReport, Exporter};
use riverr::secrets::vault::{VaultCrypto, VaultFile};
use riverr::secrets::SourceSpec;
use riverr::server::{self, Launcher, ServeOutcome};

fn main() -> ExitCode {
    let args = cli::Cli::parse();

    // setenv is only sound while no other thread exists
    let exported = match args.command {
        None | Some(Commands::Serve { .. }) => export_before_runtime(),
        Some(_) => Ok(None),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: cannot start the tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let otel = init_tracing();
        let code = match run(args, exported).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                let code = e
                    .downcast_ref::<StartupError>()
                    .map_or(1, StartupError::exit_code);
                tracing::error!(exit_code = code, "{:#}", e);
                eprintln!("Error: {:#}", e);
                ExitCode::from(code)
            }
        };
        if otel {
            opentelemetry::global::shutdown_tracer_provider();
        }
        code
    })
}

/// Config plus secrets already published into the environment.
type Exported = (Config, ExportReport);

/// With `RIVERR_PUBLISH_ENV` on, resolves and publishes the secrets on a
/// single-threaded runtime that is gone before the server runtime starts.
fn export_before_runtime() -> Result<Option<Exported>, StartupError> {
    let cfg = load_config()?;
    if !cfg.publish_env {
        return Ok(None);
    }
    let source = cfg.build_secret_source()?;
    let required = cfg.required_secrets();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| StartupError::Config(e.into()))?;
    let report = runtime.block_on(Exporter::new(source.as_ref(), &required).export())?;
    Ok(Some((cfg, report)))
}

/// Registry with an env filter and fmt layer, plus OTLP export when
/// OTEL_EXPORTER_OTLP_ENDPOINT is set. Returns whether OTLP is active.
fn init_tracing() -> bool {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let mut otlp_error = None;
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "riverr"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Err(e) => {
                otlp_error = Some(e);
                None
            }
        }
    } else {
        None
    };
    let otel = telemetry_layer.is_some();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "riverr=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    if let Some(e) = otlp_error {
        tracing::warn!("OpenTelemetry disabled: {}", e);
    }
    otel
}

async fn run(args: cli::Cli, exported: Result<Option<Exported>, StartupError>) -> anyhow::Result<()> {
    match args.command {
        Some(Commands::Serve { port }) => serve(port, exported?).await,
        None => serve(None, exported?).await,
        Some(Commands::Export { format, output }) => export(format, output.as_deref()).await,
        Some(Commands::Check) => check().await,
        Some(Commands::Vault { file, command }) => handle_vault_command(file, command).await,
    }
}

fn load_config() -> Result<Config, StartupError> {
    config::load().map_err(StartupError::Config)
}

async fn serve(port: Option<u16>, exported: Option<Exported>) -> anyhow::Result<()> {
    let launcher = match exported {
        Some((mut cfg, report)) => {
            if let Some(port) = port {
                cfg.port = port;
            }
            log_start(&cfg);
            tracing::info!(count = report.secrets.len(), "secrets published to the environment");
            Launcher::exported(cfg, report)
        }
        None => {
            let mut cfg = load_config()?;
            if let Some(port) = port {
                cfg.port = port;
            }
            log_start(&cfg);
            Launcher::from_config(cfg)?
        }
    };

    let prepared = launcher.prepare().await?;
    match prepared.run(server::shutdown_signal()).await? {
        ServeOutcome::Drained => tracing::info!("shutdown complete"),
        ServeOutcome::Forced => tracing::warn!("shutdown complete after forced drain"),
    }
    Ok(())
}

fn log_start(cfg: &Config) {
    tracing::info!(
        addr = %cfg.bind_addr(),
        source = %cfg.secret_source,
        prefix = %cfg.url_prefix,
        "starting Riverr API"
    );
}

async fn export(format: ExportFormat, output: Option<&Path>) -> anyhow::Result<()> {
    let cfg = load_config()?;
    let source = cfg.build_secret_source().map_err(StartupError::from)?;
    let required = cfg.required_secrets();
    let report = Exporter::new(source.as_ref(), &required)
        .resolve()
        .await
        .map_err(StartupError::from)?;
    let rendered = exporter::render(&report.secrets, format);

    match output {
        Some(path) => {
            write_private(path, rendered.as_bytes())?;
            tracing::info!(path = %path.display(), count = report.secrets.len(), "secrets exported");
        }
        None => {
            std::io::stdout().write_all(rendered.as_bytes())?;
        }
    }
    Ok(())
}

async fn check() -> anyhow::Result<()> {
    let cfg = load_config()?;
    let source = cfg.build_secret_source().map_err(StartupError::from)?;
    let required = cfg.required_secrets();
    let report = Exporter::new(source.as_ref(), &required)
        .resolve()
        .await
        .map_err(StartupError::from)?;
    let credentials = Credentials::validate(&required, report.secrets).map_err(StartupError::from)?;

    println!("{} required secret(s) resolved from {}:", required.len(), report.source);
    for name in credentials.secrets().names() {
        println!("  {}", name);
    }
    Ok(())
}

fn write_private(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("cannot open {}", path.display()))?;
    file.write_all(contents)?;
    Ok(())
}

async fn handle_vault_command(file: Option<PathBuf>, command: VaultCommands) -> anyhow::Result<()> {
    let cfg = load_config()?;
    let path = match (file, &cfg.secret_source) {
        (Some(path), _) => path,
        (None, SourceSpec::Vault(path)) => path.clone(),
        (None, _) => anyhow::bail!("no vault file: pass --file or set RIVERR_SECRET_SOURCE=vault:<path>"),
    };
    let master_key = cfg
        .master_key
        .as_ref()
        .context("RIVERR_MASTER_KEY is required for vault commands")?;
    let crypto = VaultCrypto::new(master_key.expose())?;

    match command {
        VaultCommands::Put { name, value } => {
            let value = match value {
                Some(v) => v,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf.trim_end_matches(&['\r', '\n'][..]).to_string()
                }
            };
            let mut vault = VaultFile::load_or_default(&path).await?;
            vault.put(&crypto, &name, &value)?;
            vault.save(&path).await?;
            println!("stored {}", name);
        }
        VaultCommands::List => {
            let vault = VaultFile::load_or_default(&path).await?;
            for (name, sealed) in &vault.secrets {
                println!("{}\t{}", name, sealed.updated_at.to_rfc3339());
            }
        }
        VaultCommands::Remove { name } => {
            let mut vault = VaultFile::load(&path).await?;
            if !vault.remove(&name) {
                anyhow::bail!("no secret named '{}' in {}", name, path.display());
            }
            vault.save(&path).await?;
            println!("removed {}", name);
        }
    }
    Ok(())
}

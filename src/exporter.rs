//! Credential exporter: resolves the required secrets from a source and
//! publishes them before the listener starts.
//!
//! Resolution is all-or-nothing. Either every required name resolves to a
//! non-empty value and an [`ExportReport`] is returned, or a
//! [`SecretResolutionError`] lists every failure and nothing is bound.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::secrets::{RequiredSecrets, SecretError, SecretSet, SecretSource};

#[derive(Debug, Error)]
#[error("could not resolve {} required secret(s) from {source_name}: {}", .failures.len(), summarize(.failures))]
pub struct SecretResolutionError {
    pub source_name: String,
    pub failures: Vec<SecretError>,
}

impl SecretResolutionError {
    /// Names that failed to resolve, in requirement order.
    pub fn unresolved(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter_map(|f| match f {
                SecretError::NotFound(n) | SecretError::Empty(n) | SecretError::InvalidName(n) => {
                    Some(n.as_str())
                }
                SecretError::Source { .. } => None,
            })
            .collect()
    }
}

fn summarize(failures: &[SecretError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub source: String,
    pub secrets: SecretSet,
    pub exported_at: DateTime<Utc>,
}

pub struct Exporter<'a> {
    source: &'a dyn SecretSource,
    required: &'a RequiredSecrets,
}

impl<'a> Exporter<'a> {
    pub fn new(source: &'a dyn SecretSource, required: &'a RequiredSecrets) -> Self {
        Self { source, required }
    }

    /// Resolve every required secret. Never returns a partial set.
    pub async fn resolve(&self) -> Result<ExportReport, SecretResolutionError> {
        let source_name = self.source.describe();
        tracing::info!(
            source = %source_name,
            count = self.required.len(),
            "resolving required secrets"
        );

        let results = self.source.resolve_many(self.required.names()).await;

        let mut resolved = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(value) if !value.is_empty() => resolved.push((name, value)),
                Ok(_) => failures.push(SecretError::Empty(name)),
                Err(e) => failures.push(e),
            }
        }

        // a source that silently skips names must not pass
        for name in self.required.names() {
            let seen = resolved.iter().any(|(n, _)| n == name);
            let failed = failures.iter().any(|f| failure_names(f, name));
            if !seen && !failed {
                failures.push(SecretError::NotFound(name.clone()));
            }
        }

        // source-wide failures are reported once
        failures.dedup();

        if !failures.is_empty() {
            let err = SecretResolutionError {
                source_name,
                failures,
            };
            tracing::error!(unresolved = ?err.unresolved(), "secret export failed: {}", err);
            return Err(err);
        }

        tracing::info!(count = resolved.len(), "all required secrets resolved");
        Ok(ExportReport {
            source: source_name,
            secrets: resolved.into_iter().collect(),
            exported_at: Utc::now(),
        })
    }

    /// Resolve, then bind every secret into the process environment.
    ///
    /// `set_var` races with `getenv` on other threads, so run this on a
    /// single-threaded runtime before any multi-threaded one is built.
    pub async fn export(&self) -> Result<ExportReport, SecretResolutionError> {
        let report = self.resolve().await?;
        publish_to_process_env(&report.secrets);
        Ok(report)
    }
}

fn failure_names(failure: &SecretError, name: &str) -> bool {
    match failure {
        SecretError::NotFound(n) | SecretError::Empty(n) | SecretError::InvalidName(n) => n == name,
        SecretError::Source { .. } => true,
    }
}

/// Binds each secret as an environment variable. Additive only: names outside
/// the set are never touched, and re-binding the same set is a no-op in effect.
///
/// Only call while the process has no other threads reading the environment.
pub fn publish_to_process_env(secrets: &SecretSet) {
    for (name, value) in secrets.iter() {
        std::env::set_var(name, value.expose());
    }
    tracing::debug!(count = secrets.len(), "published secrets to process environment");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// `export KEY='value'` lines, suitable for `eval`
    Shell,
    /// `KEY="value"` lines, readable by dotenv loaders
    Dotenv,
    /// A flat JSON object
    Json,
}

/// Renders a resolved set for consumption by a later startup step.
pub fn render(secrets: &SecretSet, format: ExportFormat) -> String {
    match format {
        ExportFormat::Shell => {
            let mut out = String::new();
            for (name, value) in secrets.iter() {
                let _ = writeln!(out, "export {}={}", name, shell_quote(value.expose()));
            }
            out
        }
        ExportFormat::Dotenv => {
            let mut out = String::new();
            for (name, value) in secrets.iter() {
                let _ = writeln!(out, "{}=\"{}\"", name, dotenv_escape(value.expose()));
            }
            out
        }
        ExportFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = secrets
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.expose().to_string())))
                .collect();
            let mut out = serde_json::Value::Object(map).to_string();
            out.push('\n');
            out
        }
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn dotenv_escape(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('$', r"\$")
        .replace('\n', r"\n")
}

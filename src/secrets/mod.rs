//! Secret sources and the resolved, read-only secret set.
//!
//! A [`SecretSource`] yields `(name) -> value` pairs for a fixed set of
//! names. Sources never mutate the process environment; publishing is the
//! exporter's job.

pub mod command;
pub mod env;
pub mod file;
pub mod memory;
pub mod vault;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use zeroize::Zeroize;

static SECRET_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret '{0}' is not set")]
    NotFound(String),

    #[error("secret '{0}' is empty")]
    Empty(String),

    #[error("invalid secret name '{0}'")]
    InvalidName(String),

    #[error("secret source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },
}

impl SecretError {
    pub fn source_failure(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        SecretError::Source {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// An opaque credential. The buffer is zeroed on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for SecretValue {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(****)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

pub fn validate_name(name: &str) -> Result<(), SecretError> {
    if SECRET_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SecretError::InvalidName(name.to_string()))
    }
}

/// Wraps a raw value, rejecting empty strings.
pub(crate) fn non_empty(name: &str, value: String) -> Result<SecretValue, SecretError> {
    if value.is_empty() {
        Err(SecretError::Empty(name.to_string()))
    } else {
        Ok(SecretValue(value))
    }
}

/// The fixed set of secret names that must resolve before the service starts.
/// Sorted and de-duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequiredSecrets(Vec<String>);

impl RequiredSecrets {
    pub fn new<I, S>(names: I) -> Result<Self, SecretError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Vec::new();
        for name in names {
            let name = name.into();
            validate_name(&name)?;
            out.push(name);
        }
        out.sort();
        out.dedup();
        Ok(Self(out))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    /// Union of two requirement sets.
    pub fn union(&self, other: &RequiredSecrets) -> RequiredSecrets {
        let mut names = self.0.clone();
        names.extend(other.0.iter().cloned());
        names.sort();
        names.dedup();
        RequiredSecrets(names)
    }
}

impl FromStr for RequiredSecrets {
    type Err = SecretError;

    /// Parses a comma-separated list, e.g. `RADARR_KEY, SONARR_KEY`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequiredSecrets::new(s.split(',').map(str::trim).filter(|n| !n.is_empty()))
    }
}

/// Resolved secrets, keyed by name. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretSet {
    entries: BTreeMap<String, SecretValue>,
}

impl SecretSet {
    pub fn get(&self, name: &str) -> Option<&SecretValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, SecretValue)> for SecretSet {
    fn from_iter<T: IntoIterator<Item = (String, SecretValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Abstraction over external secret providers.
/// Implementations: process environment, dotenv file, encrypted vault file,
/// operator command, in-memory.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Short description used in logs and errors (never contains secret data).
    fn describe(&self) -> String;

    /// Resolve a single secret.
    async fn resolve(&self, name: &str) -> Result<SecretValue, SecretError>;

    /// Resolve several secrets. Sources that load everything at once
    /// (files, commands) override this to avoid repeated loads.
    async fn resolve_many(&self, names: &[String]) -> Vec<(String, Result<SecretValue, SecretError>)> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            out.push((name.clone(), self.resolve(name).await));
        }
        out
    }
}

/// Looks up `names` in a fully loaded `KEY=VALUE` map.
pub(crate) fn pick_from_map(
    map: &BTreeMap<String, String>,
    names: &[String],
) -> Vec<(String, Result<SecretValue, SecretError>)> {
    names
        .iter()
        .map(|name| {
            let resolved = match map.get(name) {
                Some(v) => non_empty(name, v.clone()),
                None => Err(SecretError::NotFound(name.clone())),
            };
            (name.clone(), resolved)
        })
        .collect()
}

/// Parses dotenv-formatted bytes (`KEY=VALUE`, comments, quoting, `export`
/// prefixes) into a map without touching the process environment.
pub(crate) fn parse_dotenv(
    bytes: &[u8],
    source_name: &str,
) -> Result<BTreeMap<String, String>, SecretError> {
    let mut map = BTreeMap::new();
    for item in dotenvy::from_read_iter(bytes) {
        let (key, value) =
            item.map_err(|e| SecretError::source_failure(source_name, format!("parse error: {}", e)))?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Which secret source to use, parsed from `RIVERR_SECRET_SOURCE`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceSpec {
    #[default]
    Env,
    File(PathBuf),
    Vault(PathBuf),
    Command(String),
}

impl FromStr for SourceSpec {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "env" {
            return Ok(SourceSpec::Env);
        }
        let (kind, arg) = s
            .split_once(':')
            .ok_or_else(|| SecretError::source_failure(s, "expected env, file:<path>, vault:<path> or command:<cmd>"))?;
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(SecretError::source_failure(s, "missing argument after ':'"));
        }
        match kind {
            "file" => Ok(SourceSpec::File(PathBuf::from(arg))),
            "vault" => Ok(SourceSpec::Vault(PathBuf::from(arg))),
            "command" => Ok(SourceSpec::Command(arg.to_string())),
            other => Err(SecretError::source_failure(s, format!("unknown source kind '{}'", other))),
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Env => f.write_str("env"),
            SourceSpec::File(p) => write!(f, "file:{}", p.display()),
            SourceSpec::Vault(p) => write!(f, "vault:{}", p.display()),
            // the command line itself may embed tokens
            SourceSpec::Command(_) => f.write_str("command"),
        }
    }
}

impl SourceSpec {
    /// Instantiate the configured source. `master_key` unlocks `vault:` sources;
    /// `command_timeout` bounds a `command:` run.
    pub fn build(
        &self,
        master_key: Option<&SecretValue>,
        command_timeout: Duration,
    ) -> Result<Box<dyn SecretSource>, SecretError> {
        Ok(match self {
            SourceSpec::Env => Box::new(env::EnvSource),
            SourceSpec::File(path) => Box::new(file::DotenvFileSource::new(path.clone())),
            SourceSpec::Vault(path) => {
                let key = master_key.ok_or_else(|| {
                    SecretError::source_failure(self.to_string(), "RIVERR_MASTER_KEY is not set")
                })?;
                let source = vault::VaultSource::new(path.clone(), key.expose())
                    .map_err(|e| SecretError::source_failure(self.to_string(), e.to_string()))?;
                Box::new(source)
            }
            SourceSpec::Command(cmd) => {
                Box::new(command::CommandSource::new(cmd.clone()).with_timeout(command_timeout))
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_secrets_sorted_and_deduped() {
        let req: RequiredSecrets = "SONARR_KEY, RADARR_KEY,SONARR_KEY,".parse().unwrap();
        assert_eq!(req.names(), &["RADARR_KEY".to_string(), "SONARR_KEY".to_string()]);
        assert!(req.contains("RADARR_KEY"));
        assert!(!req.contains("TMDB_KEY"));
    }

    #[test]
    fn test_required_secrets_rejects_bad_names() {
        let err = "GOOD_KEY, bad-key".parse::<RequiredSecrets>().unwrap_err();
        assert_eq!(err, SecretError::InvalidName("bad-key".into()));
        assert!(validate_name("1ABC").is_err());
        assert!(validate_name("_ok_9").is_ok());
    }

    #[test]
    fn test_secret_value_is_redacted() {
        let v = SecretValue::new("sk_live_123456789");
        assert_eq!(format!("{:?}", v), "SecretValue(****)");
        assert_eq!(v.to_string(), "****");
        assert_eq!(v.expose(), "sk_live_123456789");

        let set: SecretSet = [("KEY_A".to_string(), v)].into_iter().collect();
        assert!(!format!("{:?}", set).contains("sk_live"));
    }

    #[test]
    fn test_non_empty_rejects_empty_values() {
        assert_eq!(
            non_empty("KEY_A", String::new()).unwrap_err(),
            SecretError::Empty("KEY_A".into())
        );
    }

    #[test]
    fn test_parse_dotenv_handles_quotes_comments_and_export() {
        let input = b"# comment\nKEY_A=alpha\nexport KEY_B='beta gamma'\nKEY_C=\"c=d\"\n";
        let map = parse_dotenv(input, "test").unwrap();
        assert_eq!(map["KEY_A"], "alpha");
        assert_eq!(map["KEY_B"], "beta gamma");
        assert_eq!(map["KEY_C"], "c=d");
    }

    #[test]
    fn test_source_spec_parsing() {
        assert_eq!("env".parse::<SourceSpec>().unwrap(), SourceSpec::Env);
        assert_eq!("".parse::<SourceSpec>().unwrap(), SourceSpec::Env);
        assert_eq!(
            "file:/run/secrets/riverr.env".parse::<SourceSpec>().unwrap(),
            SourceSpec::File("/run/secrets/riverr.env".into())
        );
        assert_eq!(
            "vault:secrets.json".parse::<SourceSpec>().unwrap(),
            SourceSpec::Vault("secrets.json".into())
        );
        assert_eq!(
            "command:./export_keys.sh --all".parse::<SourceSpec>().unwrap(),
            SourceSpec::Command("./export_keys.sh --all".into())
        );
        assert!("s3:bucket".parse::<SourceSpec>().is_err());
        assert!("file:".parse::<SourceSpec>().is_err());
    }

    #[test]
    fn test_command_spec_display_hides_arguments() {
        let spec = SourceSpec::Command("fetch --token abc".into());
        assert_eq!(spec.to_string(), "command");
    }

    #[test]
    fn test_vault_spec_requires_master_key() {
        let spec = SourceSpec::Vault("secrets.json".into());
        assert!(matches!(
            spec.build(None, Duration::from_secs(1)),
            Err(SecretError::Source { .. })
        ));
    }
}

use std::env::VarError;

use async_trait::async_trait;

use super::{non_empty, SecretError, SecretSource, SecretValue};

/// Reads secrets from the process environment.
pub struct EnvSource;

#[async_trait]
impl SecretSource for EnvSource {
    fn describe(&self) -> String {
        "env".to_string()
    }

    async fn resolve(&self, name: &str) -> Result<SecretValue, SecretError> {
        match std::env::var(name) {
            Ok(value) => non_empty(name, value),
            Err(VarError::NotPresent) => Err(SecretError::NotFound(name.to_string())),
            Err(VarError::NotUnicode(_)) => Err(SecretError::source_failure(
                "env",
                format!("value of '{}' is not valid unicode", name),
            )),
        }
    }
}

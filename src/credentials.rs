//! Startup validation of exported secrets.
//!
//! [`Credentials`] can only be built by [`Credentials::validate`], so holding
//! one proves every required secret was present and non-empty.

use std::sync::Arc;

use thiserror::Error;

use crate::secrets::{RequiredSecrets, SecretSet, SecretValue};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("startup validation failed: missing {missing:?}, empty {empty:?}")]
pub struct StartupValidationError {
    pub missing: Vec<String>,
    pub empty: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    secrets: Arc<SecretSet>,
}

impl Credentials {
    pub fn validate(
        required: &RequiredSecrets,
        secrets: SecretSet,
    ) -> Result<Self, StartupValidationError> {
        let mut missing = Vec::new();
        let mut empty = Vec::new();
        for name in required.names() {
            match secrets.get(name) {
                None => missing.push(name.clone()),
                Some(v) if v.expose().trim().is_empty() => empty.push(name.clone()),
                Some(_) => {}
            }
        }

        if missing.is_empty() && empty.is_empty() {
            Ok(Self {
                secrets: Arc::new(secrets),
            })
        } else {
            Err(StartupValidationError { missing, empty })
        }
    }

    pub fn get(&self, name: &str) -> Option<&SecretValue> {
        self.secrets.get(name)
    }

    pub fn secrets(&self) -> &SecretSet {
        &self.secrets
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{non_empty, SecretError, SecretSource, SecretValue};

/// In-memory source for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    entries: BTreeMap<String, String>,
}

impl StaticSource {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl SecretSource for StaticSource {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn resolve(&self, name: &str) -> Result<SecretValue, SecretError> {
        match self.entries.get(name) {
            Some(v) => non_empty(name, v.clone()),
            None => Err(SecretError::NotFound(name.to_string())),
        }
    }
}

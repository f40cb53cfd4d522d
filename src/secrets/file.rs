use std::path::PathBuf;

use async_trait::async_trait;

use super::{parse_dotenv, pick_from_map, SecretError, SecretSource, SecretValue};

/// Reads secrets from a dotenv-format file. The file is parsed on every
/// resolution so a supervisor restart picks up rotated values.
pub struct DotenvFileSource {
    path: PathBuf,
}

impl DotenvFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Result<std::collections::BTreeMap<String, String>, SecretError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            SecretError::source_failure(self.describe(), format!("cannot read file: {}", e))
        })?;
        parse_dotenv(&bytes, &self.describe())
    }
}

#[async_trait]
impl SecretSource for DotenvFileSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn resolve(&self, name: &str) -> Result<SecretValue, SecretError> {
        let names = [name.to_string()];
        let map = self.load().await?;
        pick_from_map(&map, &names)
            .pop()
            .map(|(_, r)| r)
            .unwrap_or_else(|| Err(SecretError::NotFound(name.to_string())))
    }

    async fn resolve_many(&self, names: &[String]) -> Vec<(String, Result<SecretValue, SecretError>)> {
        match self.load().await {
            Ok(map) => pick_from_map(&map, names),
            Err(e) => names.iter().map(|n| (n.clone(), Err(e.clone()))).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("riverr-{}-{}.env", tag, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_file_source_resolves_many() {
        let path = temp_path("file-source");
        std::fs::write(&path, "KEY_A=alpha\nKEY_EMPTY=\n").unwrap();

        let source = DotenvFileSource::new(path.clone());
        let names = vec!["KEY_A".to_string(), "KEY_EMPTY".to_string(), "KEY_B".to_string()];
        let results = source.resolve_many(&names).await;

        assert_eq!(results[0].1.as_ref().unwrap().expose(), "alpha");
        assert_eq!(results[1].1, Err(SecretError::Empty("KEY_EMPTY".into())));
        assert_eq!(results[2].1, Err(SecretError::NotFound("KEY_B".into())));

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_missing_file_fails_every_name() {
        let source = DotenvFileSource::new(temp_path("missing"));
        let names = vec!["KEY_A".to_string(), "KEY_B".to_string()];
        let results = source.resolve_many(&names).await;
        assert!(results
            .iter()
            .all(|(_, r)| matches!(r, Err(SecretError::Source { .. }))));
    }
}

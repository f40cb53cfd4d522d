use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{parse_dotenv, pick_from_map, SecretError, SecretSource, SecretValue};

/// Runs an operator-supplied command through `sh -c` and parses its stdout
/// as `KEY=VALUE` lines. A non-zero exit status, or a run longer than the
/// timeout, fails every name.
pub struct CommandSource {
    command: String,
    timeout: Duration,
}

impl CommandSource {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(command: String) -> Self {
        Self {
            command,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, SecretError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // dropping the output future kills the child
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                SecretError::source_failure(
                    self.describe(),
                    format!("timed out after {}s", self.timeout.as_secs_f32()),
                )
            })?
            .map_err(|e| {
                SecretError::source_failure(self.describe(), format!("cannot spawn: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim();
            return Err(SecretError::source_failure(
                self.describe(),
                format!("exited with {}: {}", output.status, last_line),
            ));
        }

        parse_dotenv(&output.stdout, &self.describe())
    }
}

#[async_trait]
impl SecretSource for CommandSource {
    fn describe(&self) -> String {
        "command".to_string()
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

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_source_parses_stdout() {
        let source = CommandSource::new("printf 'KEY_A=one\\nexport KEY_B=two\\n'".into());
        let names = vec!["KEY_A".to_string(), "KEY_B".to_string(), "KEY_C".to_string()];
        let results = source.resolve_many(&names).await;
        assert_eq!(results[0].1.as_ref().unwrap().expose(), "one");
        assert_eq!(results[1].1.as_ref().unwrap().expose(), "two");
        assert_eq!(results[2].1, Err(SecretError::NotFound("KEY_C".into())));
    }

    #[tokio::test]
    async fn test_hung_command_times_out() {
        let source = CommandSource::new("sleep 30; echo KEY_A=x".into())
            .with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let results = source.resolve_many(&["KEY_A".to_string()]).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        match &results[0].1 {
            Err(SecretError::Source { reason, .. }) => assert!(reason.contains("timed out")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_command_failure_is_a_source_error() {
        let source = CommandSource::new("echo 'vault sealed' >&2; exit 3".into());
        let err = source.resolve("KEY_A").await.unwrap_err();
        match err {
            SecretError::Source { reason, .. } => assert!(reason.contains("vault sealed")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

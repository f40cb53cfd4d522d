//! Process lifecycle:
//!
//! ```text
//! NotStarted → ExportingSecrets → { Ready | FailedStartup }
//! Ready → Draining → Stopped
//! ```
//!
//! `FailedStartup` and `Stopped` are terminal. Entering `Ready` requires
//! validated [`Credentials`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::credentials::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    ExportingSecrets,
    Ready,
    FailedStartup,
    Draining,
    Stopped,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (NotStarted, ExportingSecrets)
                | (NotStarted, FailedStartup)
                | (ExportingSecrets, Ready)
                | (ExportingSecrets, FailedStartup)
                | (Ready, Draining)
                | (Draining, Stopped)
        )
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal lifecycle transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

/// Shared handle on the current phase. Cloning shares the same state.
#[derive(Clone)]
pub struct Lifecycle {
    phase: Arc<Mutex<Phase>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: Arc::new(Mutex::new(Phase::NotStarted)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Phase {
        *self.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.current() == Phase::Ready
    }

    pub fn begin_export(&self) -> Result<(), TransitionError> {
        self.transition(Phase::ExportingSecrets)
    }

    /// `Ready` is only reachable with validated credentials in hand.
    pub fn ready(&self, _validated: &Credentials) -> Result<(), TransitionError> {
        self.transition(Phase::Ready)
    }

    pub fn fail_startup(&self) -> Result<(), TransitionError> {
        self.transition(Phase::FailedStartup)
    }

    pub fn begin_drain(&self) -> Result<(), TransitionError> {
        self.transition(Phase::Draining)
    }

    pub fn stop(&self) -> Result<(), TransitionError> {
        self.transition(Phase::Stopped)
    }

    fn transition(&self, to: Phase) -> Result<(), TransitionError> {
        let mut current = self.lock();
        if !current.can_transition_to(to) {
            return Err(TransitionError { from: *current, to });
        }
        tracing::info!(from = ?*current, to = ?to, "lifecycle transition");
        *current = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{RequiredSecrets, SecretSet, SecretValue};

    fn creds() -> Credentials {
        let required: RequiredSecrets = "KEY_A".parse().unwrap();
        let set: SecretSet = [("KEY_A".to_string(), SecretValue::new("a"))]
            .into_iter()
            .collect();
        Credentials::validate(&required, set).unwrap()
    }

    #[test]
    fn test_happy_path() {
        let lc = Lifecycle::new();
        assert_eq!(lc.current(), Phase::NotStarted);
        lc.begin_export().unwrap();
        lc.ready(&creds()).unwrap();
        assert!(lc.is_ready());
        lc.begin_drain().unwrap();
        lc.stop().unwrap();
        assert_eq!(lc.current(), Phase::Stopped);
    }

    #[test]
    fn test_failed_startup_is_terminal() {
        let lc = Lifecycle::new();
        lc.begin_export().unwrap();
        lc.fail_startup().unwrap();
        let err = lc.ready(&creds()).unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: Phase::FailedStartup,
                to: Phase::Ready
            }
        );
        assert!(lc.begin_export().is_err());
    }

    #[test]
    fn test_cannot_skip_export() {
        let lc = Lifecycle::new();
        assert!(lc.ready(&creds()).is_err());
        assert_eq!(lc.current(), Phase::NotStarted);
    }

    #[test]
    fn test_cannot_drain_before_ready() {
        let lc = Lifecycle::new();
        lc.begin_export().unwrap();
        assert!(lc.begin_drain().is_err());
        assert!(lc.stop().is_err());
    }

    #[test]
    fn test_clones_share_phase() {
        let lc = Lifecycle::new();
        let other = lc.clone();
        lc.begin_export().unwrap();
        assert_eq!(other.current(), Phase::ExportingSecrets);
        assert!(other.begin_export().is_err());
    }
}

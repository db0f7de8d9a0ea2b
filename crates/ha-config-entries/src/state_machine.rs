//! Config Entry State Machine
//!
//! ```text
//! NotLoaded → SetupInProgress → Loaded
//!                            ↘ SetupError → SetupInProgress (after re-auth)
//!                            ↘ SetupRetry → SetupInProgress (auto-retry)
//!                            ↘ MigrationError (terminal)
//!
//! Loaded/SetupError/SetupRetry → UnloadInProgress → NotLoaded
//!                                                 ↘ FailedUnload (terminal)
//! ```

use std::time::Duration;

use crate::entry::ConfigEntryState;
use thiserror::Error;

/// Error when an invalid state transition is attempted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid state transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: ConfigEntryState,
    pub to: ConfigEntryState,
}

impl ConfigEntryState {
    /// States reachable in one step from `self`
    pub fn successors(self) -> &'static [ConfigEntryState] {
        use ConfigEntryState::*;

        match self {
            NotLoaded => &[SetupInProgress],
            SetupInProgress => &[Loaded, SetupError, SetupRetry, MigrationError],
            SetupError | SetupRetry => &[SetupInProgress, UnloadInProgress],
            Loaded => &[UnloadInProgress],
            UnloadInProgress => &[NotLoaded, FailedUnload],
            MigrationError | FailedUnload => &[],
        }
    }

    /// Validate a transition to `to`
    pub fn try_transition(self, to: ConfigEntryState) -> Result<ConfigEntryState, InvalidTransition> {
        if self.successors().contains(&to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    pub fn can_transition_to(self, to: ConfigEntryState) -> bool {
        self.successors().contains(&to)
    }
}

/// Delay before the next setup attempt.
///
/// 2^min(tries, 4) * 5 seconds plus up to 100ms jitter: 5s, 10s, 20s, 40s,
/// then 80s from the fourth retry on.
pub fn calculate_retry_delay(tries: u32) -> Duration {
    let base = 2_u64.pow(tries.min(4)) * 5;
    let jitter_ms = rand::random::<u64>() % 100;
    Duration::from_secs(base) + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConfigEntryState::*;

    #[test]
    fn test_setup_path() {
        assert!(NotLoaded.can_transition_to(SetupInProgress));
        assert!(SetupInProgress.can_transition_to(Loaded));
        assert!(SetupInProgress.can_transition_to(SetupRetry));
        assert!(!NotLoaded.can_transition_to(Loaded));
    }

    #[test]
    fn test_reload_path() {
        assert!(Loaded.can_transition_to(UnloadInProgress));
        assert!(UnloadInProgress.can_transition_to(NotLoaded));
        assert!(!Loaded.can_transition_to(SetupInProgress));
    }

    #[test]
    fn test_terminal_states() {
        for to in [NotLoaded, SetupInProgress, Loaded, UnloadInProgress] {
            assert!(MigrationError.try_transition(to).is_err());
            assert!(FailedUnload.try_transition(to).is_err());
        }
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = Loaded.try_transition(SetupError).unwrap_err();
        assert_eq!(err.from, Loaded);
        assert_eq!(err.to, SetupError);
    }

    #[test]
    fn test_retry_delay_backoff() {
        assert_eq!(calculate_retry_delay(0).as_secs(), 5);
        assert_eq!(calculate_retry_delay(1).as_secs(), 10);
        assert_eq!(calculate_retry_delay(3).as_secs(), 40);
        assert_eq!(calculate_retry_delay(4).as_secs(), 80);
        assert_eq!(calculate_retry_delay(12).as_secs(), 80);
    }
}

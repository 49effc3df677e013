use crate::error::{ArchiverError, ArchiverResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionState {
    /// Created, nothing attached
    Draft,
    /// Every convertible entity attached
    Populated,
    /// Waiting for remote validation
    Validating,
    /// Validated, waiting for the submit transition to become available
    SubmittableCheck,
    /// Submit requested
    Submitted,
    /// Waiting for processing results
    Processing,
    /// Processing results collected
    Completed,
    /// Validation left the submission unsubmittable
    Invalid,
    /// A poll exhausted its timeout
    TimedOut,
    /// The archive could not be reached or rejected a call
    Failed,
}

impl SubmissionState {
    /// No further transition possible
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        allowed_transitions(*self).is_empty()
    }

    /// State waits on the archive and is driven by the poller
    #[inline]
    #[must_use]
    pub fn is_polled(&self) -> bool {
        matches!(self, Self::Validating | Self::SubmittableCheck | Self::Processing)
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: SubmissionState) -> &'static [SubmissionState] {
    use SubmissionState::*;
    match from {
        Draft => &[Populated, Failed],
        Populated => &[Validating, Failed],
        Validating => &[SubmittableCheck, TimedOut, Failed],
        SubmittableCheck => &[Submitted, Invalid, TimedOut, Failed],
        Submitted => &[Processing, Failed],
        Processing => &[Completed, TimedOut, Failed],
        Completed | Invalid | TimedOut | Failed => &[],
    }
}

/// Check a transition against the table
///
/// # Errors
/// `ArchiverError::IllegalTransition` when `to` is not reachable from `from`
pub fn validate_transition(from: SubmissionState, to: SubmissionState) -> ArchiverResult<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ArchiverError::IllegalTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubmissionState::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [Draft, Populated, Validating, SubmittableCheck, Submitted, Processing, Completed];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_do_not_move() {
        for state in [Completed, Invalid, TimedOut, Failed] {
            assert!(state.is_terminal());
            assert!(validate_transition(state, Draft).is_err());
        }
        assert!(!Processing.is_terminal());
    }

    #[test]
    fn skipping_validation_is_illegal() {
        let err = validate_transition(Populated, Submitted).unwrap_err();
        assert!(err.is_fail_fast());
        assert_eq!(err.to_string(), "illegal submission transition: Populated -> Submitted");
    }

    #[test]
    fn only_submittable_check_can_turn_invalid() {
        for state in [Draft, Populated, Validating, Submitted, Processing] {
            assert!(validate_transition(state, Invalid).is_err());
        }
        assert!(validate_transition(SubmittableCheck, Invalid).is_ok());
    }
}

//! Submission lifecycle
//!
//! One submission moves through
//! `Draft → Populated → Validating → SubmittableCheck → Submitted → Processing → Completed`
//! and may end early in `Invalid`, `TimedOut` or `Failed`.
//!
//! - [`SubmissionLifecycle`] owns the transitions and exposes a single
//!   check-and-advance step
//! - [`Poller`] drives any [`CheckAndAdvance`] on a timer with a per-state timeout
//! - Failures are recorded on the [`Submission`], never returned

mod controller;
mod poller;
mod state;
mod submission;

pub use controller::{SubmissionLifecycle, ATTACH_FAILED, PROCESSING_FAILED};
pub use poller::{CheckAndAdvance, Poller, StepOutcome};
pub use state::{allowed_transitions, validate_transition, SubmissionState};
pub use submission::{Submission, SubmissionError, SubmissionErrorKind, SubmissionSummary};

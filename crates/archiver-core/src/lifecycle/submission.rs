use super::SubmissionState;
use crate::client::{ProcessingResult, SubmissionHandle, ValidationResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What went wrong at submission level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionErrorKind {
    /// Creating the submission or attaching an entity failed
    Population,
    /// Validation finished but the submission cannot be submitted
    Validation,
    /// The archive reported an item as failed
    Processing,
    /// A poll exhausted its timeout
    Timeout,
    /// A call to the archive failed
    Transport,
}

/// Structured submission-level error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionError {
    /// Error kind
    pub kind: SubmissionErrorKind,
    /// Human readable message
    pub message: String,
    /// Archive-reported detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl SubmissionError {
    /// Error without details
    pub fn new(kind: SubmissionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attach details
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// One remote archive transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Archive the submission lives in
    pub archive: String,
    /// Remote handle, once created
    pub handle: Option<SubmissionHandle>,
    /// Current state
    pub state: SubmissionState,
    /// Aliases of the attached entities, in attach order
    pub entities: Vec<String>,
    /// Latest validation results
    pub validation_results: Vec<ValidationResult>,
    /// Processing results collected on completion
    pub processing_results: Vec<ProcessingResult>,
    /// Accession issued per alias; `None` when the archive issued none
    pub accession_map: IndexMap<String, Option<String>>,
    /// Submission-level errors
    pub errors: Vec<SubmissionError>,
}

impl Submission {
    /// Draft submission for an archive
    pub fn new(archive: impl Into<String>) -> Self {
        Self {
            archive: archive.into(),
            handle: None,
            state: SubmissionState::Draft,
            entities: Vec::new(),
            validation_results: Vec::new(),
            processing_results: Vec::new(),
            accession_map: IndexMap::new(),
            errors: Vec::new(),
        }
    }

    /// Processing results were collected
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == SubmissionState::Completed
    }

    /// Validation left the submission unsubmittable
    #[inline]
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.state == SubmissionState::Invalid
    }

    /// Record a submission-level error
    pub fn add_error(&mut self, error: SubmissionError) {
        tracing::warn!(archive = %self.archive, kind = ?error.kind, "{}", error.message);
        self.errors.push(error);
    }

    /// Errors of one kind
    pub fn errors_of(&self, kind: SubmissionErrorKind) -> impl Iterator<Item = &SubmissionError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    /// Compact view for reports
    #[must_use]
    pub fn summary(&self) -> SubmissionSummary {
        SubmissionSummary {
            archive: self.archive.clone(),
            state: self.state,
            url: self.handle.as_ref().map(|h| h.url.clone()),
            entities: self.entities.len(),
            accessioned: self.accession_map.values().filter(|a| a.is_some()).count(),
            errors: self.errors.clone(),
        }
    }
}

/// Outcome of one submission as reported to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    /// Archive name
    pub archive: String,
    /// Final state
    pub state: SubmissionState,
    /// Remote submission URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Number of attached entities
    pub entities: usize,
    /// Number of entities with an accession
    pub accessioned: usize,
    /// Submission-level errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SubmissionError>,
}

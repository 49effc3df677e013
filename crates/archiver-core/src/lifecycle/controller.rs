use super::poller::{CheckAndAdvance, Poller, StepOutcome};
use super::state::validate_transition;
use super::submission::{Submission, SubmissionError, SubmissionErrorKind};
use super::SubmissionState;
use crate::client::{
    ArchiveClient, ProcessingResult, ProcessingStatus, SubmissionContents, SubmissionHandle, SUBMITTED_STATUS,
};
use crate::config::PollingOptions;
use crate::error::{ArchiverError, ArchiverResult, ClientError};
use archiver_entity::{EntityMap, EntityType, RemoteRef};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Entity error code for an attach that failed
pub const ATTACH_FAILED: &str = "attach_failed";
/// Entity error code for an item the archive reported as failed
pub const PROCESSING_FAILED: &str = "processing_failed";

/// Drives one submission from creation to accession extraction
///
/// Borrows the manifest's entity map for the whole run: attach records the
/// remote reference on each entity, completion writes accessions back.
pub struct SubmissionLifecycle<'a, C: ArchiveClient + ?Sized> {
    client: &'a C,
    entities: &'a mut EntityMap,
    submission: Submission,
    delete_failed: bool,
}

impl<'a, C: ArchiveClient + ?Sized> SubmissionLifecycle<'a, C> {
    /// Lifecycle for a new submission to `client`
    pub fn new(client: &'a C, entities: &'a mut EntityMap) -> Self {
        let submission = Submission::new(client.archive_name());
        Self {
            client,
            entities,
            submission,
            delete_failed: true,
        }
    }

    /// Delete the remote submission when population fails
    #[must_use]
    pub fn delete_failed_submissions(mut self, delete: bool) -> Self {
        self.delete_failed = delete;
        self
    }

    /// Submission as it stands
    #[inline]
    #[must_use]
    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> SubmissionState {
        self.submission.state
    }

    /// Give up the borrow and keep the submission
    #[must_use]
    pub fn into_submission(self) -> Submission {
        self.submission
    }

    /// Populate, then poll to a terminal state
    ///
    /// Returns `None` when none of the entities of `types` is convertible, in
    /// which case no remote submission is created.
    ///
    /// # Errors
    /// Only internal defects (`ArchiverError::IllegalTransition`); archive
    /// failures end up in the submission's error list
    pub async fn run(mut self, types: &[EntityType], polling: &PollingOptions) -> ArchiverResult<Option<Submission>> {
        if !self.populate(types).await? {
            return Ok(None);
        }
        Poller::new(*polling).drive(&mut self).await?;
        Ok(Some(self.into_submission()))
    }

    /// Create the submission and attach every convertible entity of `types`
    ///
    /// Returns `false` when there was nothing to attach.
    ///
    /// # Errors
    /// `ArchiverError::IllegalTransition` when called twice
    pub async fn populate(&mut self, types: &[EntityType]) -> ArchiverResult<bool> {
        let aliases = self.entities.convertible_aliases(types);
        if aliases.is_empty() {
            tracing::info!(archive = %self.submission.archive, "Nothing to submit");
            return Ok(false);
        }
        validate_transition(self.submission.state, SubmissionState::Populated)?;

        let handle = match self.client.create_submission().await {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(SubmissionErrorKind::Population, "could not create submission", &e)?;
                return Ok(true);
            }
        };
        tracing::info!(archive = %self.submission.archive, url = %handle.url, "Created submission");
        self.submission.handle = Some(handle.clone());

        let contents = match self.client.get_contents(&handle).await {
            Ok(contents) => contents,
            Err(e) => {
                self.fail(SubmissionErrorKind::Population, "could not read submission contents", &e)?;
                self.delete_after_failure(&handle).await;
                return Ok(true);
            }
        };

        for alias in aliases {
            if let Err(error) = self.attach(&contents, &alias).await {
                self.submission.add_error(error);
            }
        }

        if self.submission.entities.is_empty() {
            self.submission.add_error(SubmissionError::new(
                SubmissionErrorKind::Population,
                "no entity could be attached",
            ));
            self.transition(SubmissionState::Failed)?;
            self.delete_after_failure(&handle).await;
        } else {
            self.transition(SubmissionState::Populated)?;
        }
        Ok(true)
    }

    async fn attach(&mut self, contents: &SubmissionContents, alias: &str) -> Result<(), SubmissionError> {
        let Some(entity) = self.entities.find_by_alias_mut(alias) else {
            return Ok(());
        };
        let archive = &self.submission.archive;

        let Some(create_url) = contents.create_url(entity.entity_type) else {
            let message = format!("{} has no create url for {}", archive, entity.entity_type.submittable_type());
            entity.add_error(ATTACH_FAILED, message.clone(), None);
            return Err(SubmissionError::new(SubmissionErrorKind::Population, message));
        };

        match self
            .client
            .create_entity(create_url, &Value::Object(entity.conversion.clone()))
            .await
        {
            Ok(record) => {
                tracing::debug!(alias = %alias, url = %record.url, "Attached entity");
                entity.remote = Some(RemoteRef::from(&record));
                self.submission.entities.push(alias.to_string());
                Ok(())
            }
            Err(e) => {
                let message = format!("could not attach {alias}: {e}");
                entity.add_error(ATTACH_FAILED, e.to_string(), None);
                Err(SubmissionError::new(SubmissionErrorKind::Population, message))
            }
        }
    }

    async fn delete_after_failure(&self, handle: &SubmissionHandle) {
        if !self.delete_failed {
            return;
        }
        match self.client.delete_submission(handle).await {
            Ok(()) => tracing::info!(url = %handle.url, "Deleted failed submission"),
            Err(e) => tracing::warn!(url = %handle.url, "Could not delete failed submission: {}", e),
        }
    }

    fn transition(&mut self, to: SubmissionState) -> ArchiverResult<()> {
        validate_transition(self.submission.state, to)?;
        tracing::debug!(
            archive = %self.submission.archive,
            from = %self.submission.state,
            to = %to,
            "Submission transition"
        );
        self.submission.state = to;
        Ok(())
    }

    fn fail(&mut self, kind: SubmissionErrorKind, context: &str, error: &ClientError) -> ArchiverResult<()> {
        self.submission
            .add_error(SubmissionError::new(kind, format!("{context}: {error}")));
        self.transition(SubmissionState::Failed)
    }

    /// Retryable errors leave the step pending; anything else fails the submission
    fn on_client_error(&mut self, error: ClientError) -> ArchiverResult<StepOutcome> {
        if error.is_retryable() {
            tracing::warn!(archive = %self.submission.archive, state = %self.submission.state, "Retrying after: {}", error);
            return Ok(StepOutcome::Pending);
        }
        let state = self.submission.state;
        self.fail(SubmissionErrorKind::Transport, &format!("archive call failed in {state}"), &error)?;
        Ok(StepOutcome::Finished)
    }

    async fn validated(&mut self, handle: &SubmissionHandle) -> Result<bool, ClientError> {
        let results = self.client.get_validation_results(handle).await?;
        let complete = !results.is_empty() && results.iter().all(|r| r.is_complete());
        self.submission.validation_results = results;
        Ok(complete)
    }

    async fn check_validating(&mut self, handle: &SubmissionHandle) -> Result<bool, ClientError> {
        self.validated(handle).await
    }

    async fn check_submittable(&mut self, handle: &SubmissionHandle) -> Result<bool, ClientError> {
        if !self.validated(handle).await? {
            return Ok(false);
        }
        let status = self.client.get_submission_status(handle).await?;
        if !status.can_transition_to(SUBMITTED_STATUS) {
            return Ok(false);
        }
        self.client.update_submission_status(handle, SUBMITTED_STATUS).await?;
        Ok(true)
    }

    async fn check_processing(&mut self, handle: &SubmissionHandle) -> Result<bool, ClientError> {
        let results = self.client.get_processing_results(handle).await?;
        if results.is_empty() || !results.iter().all(|r| r.status.is_terminal()) {
            return Ok(false);
        }
        self.submission.processing_results = results;
        Ok(true)
    }

    /// Walk the processing results once, capturing every reported accession
    fn collect_accessions(&mut self) {
        let results: Vec<ProcessingResult> = self.submission.processing_results.clone();

        for result in results {
            self.submission
                .accession_map
                .insert(result.alias.clone(), result.accession.clone());

            if let Err(e) = self.entities.set_accession(&result.alias, result.accession.clone()) {
                tracing::warn!(alias = %result.alias, "Processing result for unknown entity: {}", e);
            }

            if result.status == ProcessingStatus::Error {
                let submittable = result.submittable_type.as_deref().unwrap_or("item");
                let message = format!(
                    "{} {} failed processing in {}",
                    submittable, result.alias, self.submission.archive
                );
                let details = (!result.errors.is_empty()).then(|| json!(result.errors));
                if let Some(entity) = self.entities.find_by_alias_mut(&result.alias) {
                    entity.add_error(PROCESSING_FAILED, message.clone(), details.clone());
                }
                let mut error = SubmissionError::new(SubmissionErrorKind::Processing, message);
                if let Some(details) = details {
                    error = error.with_details(details);
                }
                self.submission.add_error(error);
            }
        }
    }

    async fn validation_details(&self) -> Value {
        let mut details = Vec::new();
        for result in &self.submission.validation_results {
            let Some(url) = result.detail_url.as_deref() else {
                if !result.messages.is_empty() {
                    details.push(json!(result.messages));
                }
                continue;
            };
            match self.client.get_validation_detail(url).await {
                Ok(Some(detail)) => details.push(detail),
                Ok(None) => {}
                Err(e) => tracing::warn!(url = %url, "Could not fetch validation detail: {}", e),
            }
        }
        Value::Array(details)
    }
}

#[async_trait]
impl<'a, C: ArchiveClient + ?Sized> CheckAndAdvance for SubmissionLifecycle<'a, C> {
    async fn step(&mut self) -> ArchiverResult<StepOutcome> {
        let state = self.submission.state;
        if state.is_terminal() || state == SubmissionState::Draft {
            return Ok(StepOutcome::Finished);
        }
        let Some(handle) = self.submission.handle.clone() else {
            self.submission.add_error(SubmissionError::new(
                SubmissionErrorKind::Transport,
                format!("no remote submission in {state}"),
            ));
            self.transition(SubmissionState::Failed)?;
            return Ok(StepOutcome::Finished);
        };

        match state {
            SubmissionState::Populated => {
                self.transition(SubmissionState::Validating)?;
                Ok(StepOutcome::Advanced)
            }
            SubmissionState::Validating => match self.check_validating(&handle).await {
                Ok(true) => {
                    self.transition(SubmissionState::SubmittableCheck)?;
                    Ok(StepOutcome::Advanced)
                }
                Ok(false) => Ok(StepOutcome::Pending),
                Err(e) => self.on_client_error(e),
            },
            SubmissionState::SubmittableCheck => match self.check_submittable(&handle).await {
                Ok(true) => {
                    tracing::info!(archive = %self.submission.archive, url = %handle.url, "Submitted");
                    self.transition(SubmissionState::Submitted)?;
                    Ok(StepOutcome::Advanced)
                }
                Ok(false) => Ok(StepOutcome::Pending),
                Err(e) => self.on_client_error(e),
            },
            SubmissionState::Submitted => {
                self.transition(SubmissionState::Processing)?;
                Ok(StepOutcome::Advanced)
            }
            SubmissionState::Processing => match self.check_processing(&handle).await {
                Ok(true) => {
                    self.collect_accessions();
                    self.transition(SubmissionState::Completed)?;
                    tracing::info!(
                        archive = %self.submission.archive,
                        accessioned = self.submission.accession_map.values().filter(|a| a.is_some()).count(),
                        "Submission completed"
                    );
                    Ok(StepOutcome::Finished)
                }
                Ok(false) => Ok(StepOutcome::Pending),
                Err(e) => self.on_client_error(e),
            },
            SubmissionState::Draft
            | SubmissionState::Completed
            | SubmissionState::Invalid
            | SubmissionState::TimedOut
            | SubmissionState::Failed => Ok(StepOutcome::Finished),
        }
    }

    async fn on_timeout(&mut self, waited: Duration) -> ArchiverResult<()> {
        let state = self.submission.state;
        if state == SubmissionState::SubmittableCheck {
            let details = self.validation_details().await;
            self.submission.add_error(
                SubmissionError::new(
                    SubmissionErrorKind::Validation,
                    format!("{} submission is not submittable", self.submission.archive),
                )
                .with_details(details),
            );
            return self.transition(SubmissionState::Invalid);
        }

        let timeout = ArchiverError::Timeout {
            state,
            waited_secs: waited.as_secs(),
        };
        self.submission
            .add_error(SubmissionError::new(SubmissionErrorKind::Timeout, timeout.to_string()));
        self.transition(SubmissionState::TimedOut)
    }
}

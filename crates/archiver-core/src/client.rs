//! Collaborator contracts
//!
//! The archiver never speaks HTTP itself. Each archive, the metadata source
//! and the taxonomy service sit behind one of the traits below, injected as
//! `Arc<dyn Trait>`.

use crate::error::ClientResult;
use archiver_entity::{EntityType, RemoteRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Status name that moves a validated submission forward
pub const SUBMITTED_STATUS: &str = "Submitted";

/// Handle to a remote submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionHandle {
    /// URL of the submission resource
    pub url: String,
    /// Archive-side identifier, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Where each entity type is created within a submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionContents {
    /// Create URL per entity type
    pub create_urls: HashMap<EntityType, String>,
}

impl SubmissionContents {
    /// Create URL for an entity type
    #[inline]
    #[must_use]
    pub fn create_url(&self, entity_type: EntityType) -> Option<&str> {
        self.create_urls.get(&entity_type).map(String::as_str)
    }
}

/// Sub-resource created for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// URL of the created resource
    pub url: String,
    /// Identifier issued by the archive
    #[serde(default)]
    pub id: Option<String>,
    /// Response body
    #[serde(default)]
    pub body: Value,
}

impl From<&RemoteRecord> for RemoteRef {
    fn from(record: &RemoteRecord) -> Self {
        RemoteRef {
            url: record.url.clone(),
            id: record.id.clone(),
        }
    }
}

/// Validation state of one attached item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// `Pending`, `Complete`, ...
    pub validation_status: String,
    /// Where the per-validator detail lives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
    /// Messages reported inline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl ValidationResult {
    /// Result with the given status
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            validation_status: status.into(),
            detail_url: None,
            messages: Vec::new(),
        }
    }

    /// Attach a detail URL
    #[must_use]
    pub fn with_detail_url(mut self, url: impl Into<String>) -> Self {
        self.detail_url = Some(url.into());
        self
    }

    /// Validation finished for this item
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.validation_status == "Complete"
    }
}

/// Current submission status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStatus {
    /// Status the submission is in, when reported
    #[serde(default)]
    pub status: Option<String>,
    /// Statuses the submission may move to now
    #[serde(default)]
    pub available_transitions: Vec<String>,
}

impl SubmissionStatus {
    /// Whether `target` is among the available transitions
    #[must_use]
    pub fn can_transition_to(&self, target: &str) -> bool {
        self.available_transitions.iter().any(|s| s == target)
    }
}

/// Processing status of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    /// Accession issued
    Completed,
    /// Archive rejected the item
    Error,
    /// Anything else: still working
    #[serde(other)]
    Pending,
}

impl ProcessingStatus {
    /// No further change expected
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Processing outcome of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    /// Alias of the entity
    pub alias: String,
    /// Processing status
    pub status: ProcessingStatus,
    /// Accession, possibly present even on error
    #[serde(default)]
    pub accession: Option<String>,
    /// Archive collection name (`samples`, `sequencingRuns`, ...)
    #[serde(default)]
    pub submittable_type: Option<String>,
    /// Error messages reported by the archive
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Remote archive
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Name used in logs and error messages
    fn archive_name(&self) -> &str;

    /// Create an empty submission
    async fn create_submission(&self) -> ClientResult<SubmissionHandle>;

    /// Create URLs of a submission
    async fn get_contents(&self, handle: &SubmissionHandle) -> ClientResult<SubmissionContents>;

    /// Create one sub-resource
    async fn create_entity(&self, create_url: &str, payload: &Value) -> ClientResult<RemoteRecord>;

    /// Validation state of every attached item
    async fn get_validation_results(
        &self,
        handle: &SubmissionHandle,
    ) -> ClientResult<Vec<ValidationResult>>;

    /// Full validation report behind a detail URL
    async fn get_validation_detail(&self, _detail_url: &str) -> ClientResult<Option<Value>> {
        Ok(None)
    }

    /// Current status and available transitions
    async fn get_submission_status(&self, handle: &SubmissionHandle) -> ClientResult<SubmissionStatus>;

    /// Move the submission to a new status
    async fn update_submission_status(
        &self,
        handle: &SubmissionHandle,
        new_status: &str,
    ) -> ClientResult<()>;

    /// Processing state of every attached item
    async fn get_processing_results(
        &self,
        handle: &SubmissionHandle,
    ) -> ClientResult<Vec<ProcessingResult>>;

    /// Remove the submission
    async fn delete_submission(&self, handle: &SubmissionHandle) -> ClientResult<()>;
}

/// Upstream metadata store
///
/// Entity type arguments are collection names (`projects`, `biomaterials`,
/// `processes`, `protocols`, `files`).
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Manifest describing one bundle
    async fn get_manifest(&self, manifest_id: &str) -> ClientResult<Value>;

    /// Records reachable from `entity` through `relation`
    async fn get_related_entities(
        &self,
        entity: &Value,
        relation: &str,
        entity_type: &str,
    ) -> ClientResult<Vec<Value>>;

    /// Apply a patch to the record with this id
    async fn patch_entity_by_id(&self, entity_type: &str, id: &str, patch: &Value) -> ClientResult<Value>;

    /// Record by UUID
    async fn get_entity_by_uuid(&self, entity_type: &str, uuid: &str) -> ClientResult<Value>;

    /// Record by URL
    async fn get_entity_by_url(&self, url: &str) -> ClientResult<Value>;

    /// Flag the originating submission as archived
    async fn mark_submission_archived(&self, submission_uuid: &str) -> ClientResult<()>;
}

#[async_trait]
impl<T: MetadataSource + ?Sized> MetadataSource for Arc<T> {
    async fn get_manifest(&self, manifest_id: &str) -> ClientResult<Value> {
        (**self).get_manifest(manifest_id).await
    }

    async fn get_related_entities(
        &self,
        entity: &Value,
        relation: &str,
        entity_type: &str,
    ) -> ClientResult<Vec<Value>> {
        (**self).get_related_entities(entity, relation, entity_type).await
    }

    async fn patch_entity_by_id(&self, entity_type: &str, id: &str, patch: &Value) -> ClientResult<Value> {
        (**self).patch_entity_by_id(entity_type, id, patch).await
    }

    async fn get_entity_by_uuid(&self, entity_type: &str, uuid: &str) -> ClientResult<Value> {
        (**self).get_entity_by_uuid(entity_type, uuid).await
    }

    async fn get_entity_by_url(&self, url: &str) -> ClientResult<Value> {
        (**self).get_entity_by_url(url).await
    }

    async fn mark_submission_archived(&self, submission_uuid: &str) -> ClientResult<()> {
        (**self).mark_submission_archived(submission_uuid).await
    }
}

/// Taxonomy lookup
#[async_trait]
pub trait TaxonomyService: Send + Sync {
    /// Scientific name of an NCBI taxon, `None` when the taxon is unknown
    async fn scientific_name(&self, taxon_id: u64) -> ClientResult<Option<String>>;
}

/// UUID of a metadata record (`uuid.uuid`)
#[must_use]
pub fn record_uuid(record: &Value) -> Option<&str> {
    record.pointer("/uuid/uuid").and_then(Value::as_str)
}

/// Self link of a metadata record (`_links.self.href`)
#[must_use]
pub fn record_self_link(record: &Value) -> Option<&str> {
    record.pointer("/_links/self/href").and_then(Value::as_str)
}

/// Schema name of a metadata record: last segment of `content.describedBy`
/// (`.../type/biomaterial/15.5.0/donor_organism` is `donor_organism`)
#[must_use]
pub fn record_schema_name(record: &Value) -> Option<&str> {
    record
        .pointer("/content/describedBy")
        .and_then(Value::as_str)
        .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
        .filter(|name| !name.is_empty())
}

/// Identifier used to patch a record: `id`, else the last segment of the self link
#[must_use]
pub fn record_id(record: &Value) -> Option<String> {
    if let Some(id) = record.get("id") {
        match id {
            Value::String(s) if !s.is_empty() => return Some(s.clone()),
            Value::Number(n) => return Some(n.to_string()),
            _ => {}
        }
    }
    record_self_link(record)
        .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_processing_status_is_pending() {
        let result: ProcessingResult =
            serde_json::from_value(json!({"alias": "s1", "status": "Processing"})).unwrap();
        assert_eq!(result.status, ProcessingStatus::Pending);
        assert!(!result.status.is_terminal());

        let done: ProcessingResult =
            serde_json::from_value(json!({"alias": "s1", "status": "Completed", "accession": "SAMEA1"}))
                .unwrap();
        assert!(done.status.is_terminal());
        assert_eq!(done.accession.as_deref(), Some("SAMEA1"));
    }

    #[test]
    fn validation_result_uses_camel_case() {
        let result: ValidationResult =
            serde_json::from_value(json!({"validationStatus": "Complete", "detailUrl": "u"})).unwrap();
        assert!(result.is_complete());
        assert_eq!(result.detail_url.as_deref(), Some("u"));
    }

    #[test]
    fn record_id_prefers_id_then_self_link() {
        assert_eq!(record_id(&json!({"id": "abc"})).as_deref(), Some("abc"));
        assert_eq!(
            record_id(&json!({"_links": {"self": {"href": "https://ingest/biomaterials/5f1/"}}})).as_deref(),
            Some("5f1")
        );
        assert_eq!(record_id(&json!({"uuid": {"uuid": "u"}})), None);
    }

    #[test]
    fn status_transition_check() {
        let status = SubmissionStatus {
            status: Some("Draft".into()),
            available_transitions: vec!["Submitted".into()],
        };
        assert!(status.can_transition_to(SUBMITTED_STATUS));
        assert!(!SubmissionStatus::default().can_transition_to(SUBMITTED_STATUS));
    }
}

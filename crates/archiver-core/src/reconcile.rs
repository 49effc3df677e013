//! Accession write-back
//!
//! Every accessioned entity patches the source records it was built from.
//! Patches are independent: a failure is logged and reported, the remaining
//! entities are still patched, nothing is rolled back.

use crate::client::{record_id, MetadataSource};
use crate::error::ClientError;
use archiver_entity::{ArchiveEntity, EntityMap, EntityType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Patch carrying an accession in the shape the source schema expects
///
/// Study accessions live under the project accession field of the project
/// record; the source schema has no study accession field.
#[must_use]
pub fn accession_patch(entity_type: EntityType, accession: &str) -> Value {
    match entity_type {
        EntityType::Project => json!({ "content": { "biostudies_accessions": [accession] } }),
        EntityType::Study => json!({ "content": { "insdc_project_accessions": [accession] } }),
        EntityType::Sample => json!({ "content": { "biomaterial_core": { "biosamples_accession": accession } } }),
        EntityType::SequencingExperiment => {
            json!({ "content": { "insdc_experiment": { "insdc_experiment_accession": accession } } })
        }
        EntityType::SequencingRun => json!({ "content": { "insdc_run_accessions": [accession] } }),
    }
}

/// Source collection holding the records an entity type is built from
#[must_use]
pub fn source_collection(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Project | EntityType::Study => "projects",
        EntityType::Sample => "biomaterials",
        EntityType::SequencingExperiment => "processes",
        EntityType::SequencingRun => "files",
    }
}

/// A record that was patched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchedRecord {
    /// Entity alias
    pub alias: String,
    /// Source record UUID
    pub uuid: String,
    /// Accession written
    pub accession: String,
}

/// An entity or record that was not patched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileIssue {
    /// Entity alias
    pub alias: String,
    /// Source record UUID, when the issue concerns one record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Why
    pub reason: String,
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Records patched
    pub patched: Vec<PatchedRecord>,
    /// Patches that failed
    pub failed: Vec<ReconcileIssue>,
    /// Entities with nothing to write
    pub skipped: Vec<ReconcileIssue>,
    /// Originating submission flagged archived
    pub submission_archived: bool,
}

impl ReconciliationReport {
    /// Every attempted patch succeeded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes accessions back to the metadata source
pub struct AccessionReconciler<'a> {
    source: &'a dyn MetadataSource,
}

impl<'a> AccessionReconciler<'a> {
    /// Reconciler patching through `source`
    pub fn new(source: &'a dyn MetadataSource) -> Self {
        Self { source }
    }

    /// Patch every accessioned entity, then flag the submission archived
    pub async fn reconcile(&self, entities: &EntityMap, submission_uuid: Option<&str>) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();

        for entity in entities.iter() {
            let Some(accession) = entity.accession.as_deref() else {
                report.skipped.push(ReconcileIssue {
                    alias: entity.id.clone(),
                    uuid: None,
                    reason: entity
                        .missing_accession_reason()
                        .unwrap_or_else(|| "no accession".to_string()),
                });
                continue;
            };
            if entity.accessioned_metadata_uuids.is_empty() {
                report.skipped.push(ReconcileIssue {
                    alias: entity.id.clone(),
                    uuid: None,
                    reason: "no accessioned metadata".to_string(),
                });
                continue;
            }
            self.patch_entity(entity, accession, &mut report).await;
        }

        if let Some(uuid) = submission_uuid.filter(|_| !report.patched.is_empty()) {
            match self.source.mark_submission_archived(uuid).await {
                Ok(()) => report.submission_archived = true,
                Err(e) => tracing::warn!(submission = %uuid, "Could not flag submission archived: {}", e),
            }
        }

        tracing::info!(
            patched = report.patched.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Reconciled accessions"
        );
        report
    }

    async fn patch_entity(&self, entity: &ArchiveEntity, accession: &str, report: &mut ReconciliationReport) {
        let collection = source_collection(entity.entity_type);
        let patch = accession_patch(entity.entity_type, accession);

        for uuid in &entity.accessioned_metadata_uuids {
            match self.patch_record(collection, uuid, &patch).await {
                Ok(()) => report.patched.push(PatchedRecord {
                    alias: entity.id.clone(),
                    uuid: uuid.clone(),
                    accession: accession.to_string(),
                }),
                Err(e) => {
                    tracing::warn!(alias = %entity.id, uuid = %uuid, "Accession patch failed: {}", e);
                    report.failed.push(ReconcileIssue {
                        alias: entity.id.clone(),
                        uuid: Some(uuid.clone()),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn patch_record(&self, collection: &str, uuid: &str, patch: &Value) -> Result<(), ClientError> {
        let record = self.source.get_entity_by_uuid(collection, uuid).await?;
        let id = record_id(&record)
            .ok_or_else(|| ClientError::invalid_response("metadata source", format!("record {uuid} has no id")))?;
        self.source.patch_entity_by_id(collection, &id, patch).await?;
        tracing::debug!(collection = %collection, id = %id, "Patched accession");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientResult;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    mock! {
        Source {}

        #[async_trait]
        impl MetadataSource for Source {
            async fn get_manifest(&self, manifest_id: &str) -> ClientResult<Value>;
            async fn get_related_entities(&self, entity: &Value, relation: &str, entity_type: &str) -> ClientResult<Vec<Value>>;
            async fn patch_entity_by_id(&self, entity_type: &str, id: &str, patch: &Value) -> ClientResult<Value>;
            async fn get_entity_by_uuid(&self, entity_type: &str, uuid: &str) -> ClientResult<Value>;
            async fn get_entity_by_url(&self, url: &str) -> ClientResult<Value>;
            async fn mark_submission_archived(&self, submission_uuid: &str) -> ClientResult<()>;
        }
    }

    fn accessioned(entity_type: EntityType, alias: &str, uuid: &str, accession: &str) -> ArchiveEntity {
        let mut entity = ArchiveEntity::new(entity_type, alias);
        entity.add_metadata_uuid(uuid, true);
        entity.accession = Some(accession.to_string());
        entity
    }

    #[test]
    fn patch_shapes() {
        assert_eq!(
            accession_patch(EntityType::Sample, "SAMEA1"),
            json!({"content": {"biomaterial_core": {"biosamples_accession": "SAMEA1"}}})
        );
        assert_eq!(
            accession_patch(EntityType::SequencingRun, "ERR1"),
            json!({"content": {"insdc_run_accessions": ["ERR1"]}})
        );
        assert_eq!(
            accession_patch(EntityType::Project, "S-BSST1"),
            json!({"content": {"biostudies_accessions": ["S-BSST1"]}})
        );
        assert_eq!(
            accession_patch(EntityType::Study, "ERP1"),
            json!({"content": {"insdc_project_accessions": ["ERP1"]}})
        );
        assert_eq!(
            accession_patch(EntityType::SequencingExperiment, "ERX1"),
            json!({"content": {"insdc_experiment": {"insdc_experiment_accession": "ERX1"}}})
        );
    }

    #[test]
    fn study_patches_project_records() {
        assert_eq!(source_collection(EntityType::Study), "projects");
        assert_eq!(source_collection(EntityType::SequencingRun), "files");
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let mut source = MockSource::new();
        source
            .expect_get_entity_by_uuid()
            .returning(|_, uuid| Ok(json!({"_links": {"self": {"href": format!("https://ingest/biomaterials/id-{uuid}")}}})));
        source
            .expect_patch_entity_by_id()
            .with(eq("biomaterials"), eq("id-b1"), mockall::predicate::always())
            .returning(|_, _, _| Err(ClientError::status("ingest", 409, "conflict")));
        source
            .expect_patch_entity_by_id()
            .with(eq("biomaterials"), eq("id-b2"), eq(json!({"content": {"biomaterial_core": {"biosamples_accession": "SAMEA2"}}})))
            .times(1)
            .returning(|_, _, patch| Ok(patch.clone()));
        source
            .expect_mark_submission_archived()
            .with(eq("env-1"))
            .times(1)
            .returning(|_| Ok(()));

        let entities: EntityMap = [
            accessioned(EntityType::Sample, "s1", "b1", "SAMEA1"),
            accessioned(EntityType::Sample, "s2", "b2", "SAMEA2"),
            ArchiveEntity::new(EntityType::Sample, "s3"),
        ]
        .into_iter()
        .collect();

        let report = AccessionReconciler::new(&source).reconcile(&entities, Some("env-1")).await;
        assert_eq!(report.patched.len(), 1);
        assert_eq!(report.patched[0].uuid, "b2");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].alias, "s1");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, "not converted");
        assert!(report.submission_archived);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn nothing_patched_leaves_submission_alone() {
        let mut source = MockSource::new();
        source.expect_mark_submission_archived().never();

        let entities: EntityMap = [ArchiveEntity::new(EntityType::Project, "p1")].into_iter().collect();
        let report = AccessionReconciler::new(&source).reconcile(&entities, Some("env-1")).await;
        assert!(!report.submission_archived);
        assert!(report.is_clean());
    }
}

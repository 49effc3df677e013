//! Manifest orchestration
//!
//! Per manifest: aggregate, convert, run one submission per archive target,
//! write accessions back. Manifests are independent and run concurrently;
//! each owns its entity map.

use crate::aggregate::ManifestAggregator;
use crate::cache::{CachedMetadataSource, EntityLookupCache};
use crate::client::{ArchiveClient, MetadataSource, TaxonomyService};
use crate::config::ArchiverConfig;
use crate::convert::ConverterSet;
use crate::error::{ArchiverError, ArchiverResult};
use crate::lifecycle::{SubmissionLifecycle, SubmissionState, SubmissionSummary};
use crate::reconcile::{AccessionReconciler, ReconciliationReport};
use archiver_entity::{EntityReport, EntityType};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;

/// One archive and the entity types it accepts
#[derive(Clone)]
pub struct ArchiveTarget {
    /// Archive client
    pub client: Arc<dyn ArchiveClient>,
    /// Entity types submitted to this archive
    pub entity_types: Vec<EntityType>,
}

impl ArchiveTarget {
    /// Target accepting `entity_types`
    pub fn new(client: Arc<dyn ArchiveClient>, entity_types: impl Into<Vec<EntityType>>) -> Self {
        Self {
            client,
            entity_types: entity_types.into(),
        }
    }
}

impl std::fmt::Debug for ArchiveTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveTarget")
            .field("archive", &self.client.archive_name())
            .field("entity_types", &self.entity_types)
            .finish()
    }
}

/// What one manifest run produced
#[derive(Debug, Clone, Serialize)]
pub struct ManifestReport {
    /// Manifest id
    pub manifest_id: String,
    /// Submission the manifest came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_uuid: Option<String>,
    /// Per-type counts and per-entity issues and accessions
    pub entities: EntityReport,
    /// One summary per archive that received a submission
    pub submissions: Vec<SubmissionSummary>,
    /// Accession write-back
    pub reconciliation: ReconciliationReport,
}

impl ManifestReport {
    /// Every submission completed and every patch applied
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.submissions
            .iter()
            .all(|s| s.state == SubmissionState::Completed)
            && self.reconciliation.is_clean()
    }
}

/// Archives manifests into a set of archive targets
pub struct ArchiveOrchestrator {
    source: Arc<dyn MetadataSource>,
    converters: ConverterSet,
    targets: Vec<ArchiveTarget>,
    config: ArchiverConfig,
}

impl ArchiveOrchestrator {
    /// Orchestrator with the standard converters and no targets
    ///
    /// Metadata lookups go through an [`EntityLookupCache`] built from the
    /// config.
    ///
    /// # Errors
    /// Invalid configuration or a converter field table that does not compile
    pub fn new(
        source: Arc<dyn MetadataSource>,
        taxonomy: Arc<dyn TaxonomyService>,
        config: ArchiverConfig,
    ) -> ArchiverResult<Self> {
        config.validate()?;
        let converters = ConverterSet::new(taxonomy)?;
        let cache = EntityLookupCache::new(&config.cache);
        let source: Arc<dyn MetadataSource> = if cache.is_enabled() {
            Arc::new(CachedMetadataSource::new(source, cache))
        } else {
            source
        };

        Ok(Self {
            source,
            converters,
            targets: Vec::new(),
            config,
        })
    }

    /// Add an archive target; targets run in the order added
    #[must_use]
    pub fn with_target(mut self, target: ArchiveTarget) -> Self {
        self.targets.push(target);
        self
    }

    /// Replace the converters
    #[must_use]
    pub fn with_converters(mut self, converters: ConverterSet) -> Self {
        self.converters = converters;
        self
    }

    /// Configured targets
    #[inline]
    #[must_use]
    pub fn targets(&self) -> &[ArchiveTarget] {
        &self.targets
    }

    /// Archive one manifest
    ///
    /// # Errors
    /// Fail-fast conditions (cyclic derivation, field table defects) and
    /// metadata source failures during aggregation. Conversion and submission failures are part of the
    /// report.
    pub async fn archive_manifest(&self, manifest_id: &str) -> ArchiverResult<ManifestReport> {
        tracing::info!(manifest = %manifest_id, "Archiving manifest");

        let aggregation = ManifestAggregator::new(self.source.as_ref(), &self.config.alias_prefix)
            .aggregate(manifest_id)
            .await?;
        let mut entities = aggregation.entities;

        let converted = self.converters.convert_all(&mut entities).await?;
        tracing::info!(manifest = %manifest_id, converted, total = entities.len(), "Converted entities");

        let mut submissions = Vec::new();
        for target in &self.targets {
            let lifecycle = SubmissionLifecycle::new(target.client.as_ref(), &mut entities)
                .delete_failed_submissions(self.config.delete_failed_submissions);
            if let Some(submission) = lifecycle.run(&target.entity_types, &self.config.polling).await? {
                submissions.push(submission.summary());
            }
        }

        let reconciliation = AccessionReconciler::new(self.source.as_ref())
            .reconcile(&entities, aggregation.submission_uuid.as_deref())
            .await;

        Ok(ManifestReport {
            manifest_id: manifest_id.to_string(),
            submission_uuid: aggregation.submission_uuid,
            entities: entities.report(),
            submissions,
            reconciliation,
        })
    }

    /// Archive several manifests, at most `max_concurrent_manifests` at a time
    ///
    /// Results come back in completion order, paired with their manifest id.
    /// A fail-fast error in one manifest does not stop the others.
    pub async fn archive_manifests<I, S>(&self, manifest_ids: I) -> Vec<(String, ArchiverResult<ManifestReport>)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        stream::iter(manifest_ids.into_iter().map(Into::into))
            .map(|id: String| async move {
                let result = self.archive_manifest(&id).await;
                if let Err(e) = &result {
                    log_manifest_failure(&id, e);
                }
                (id, result)
            })
            .buffer_unordered(self.config.max_concurrent_manifests)
            .collect()
            .await
    }
}

fn log_manifest_failure(manifest_id: &str, error: &ArchiverError) {
    if error.is_fail_fast() {
        tracing::error!(manifest = %manifest_id, "Manifest rejected: {}", error);
    } else {
        tracing::warn!(manifest = %manifest_id, "Manifest failed: {}", error);
    }
}

impl std::fmt::Debug for ArchiveOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveOrchestrator")
            .field("converters", &self.converters)
            .field("targets", &self.targets)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

//! Run report

use crate::entity::{ArchiveEntity, EntityIssue};
use crate::types::EntityType;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-type totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    /// Entities of this type
    pub total: usize,
    /// Entities that produced a payload, whatever happened to them afterwards
    pub converted: usize,
    /// Entities with at least one error
    pub errored: usize,
    /// Entities with an accession
    pub accessioned: usize,
}

impl TypeCounts {
    pub(crate) fn record(&mut self, entity: &ArchiveEntity) {
        self.total += 1;
        if !entity.conversion.is_empty() {
            self.converted += 1;
        }
        if !entity.errors.is_empty() {
            self.errored += 1;
        }
        if entity.accession.is_some() {
            self.accessioned += 1;
        }
    }
}

/// One line of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    /// Alias
    pub id: String,
    /// Type
    pub entity_type: EntityType,
    /// Issued accession
    pub accession: Option<String>,
    /// Recorded errors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EntityIssue>,
    /// Recorded warnings
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EntityIssue>,
    /// Why there is no accession
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&ArchiveEntity> for EntitySummary {
    fn from(entity: &ArchiveEntity) -> Self {
        Self {
            id: entity.id.clone(),
            entity_type: entity.entity_type,
            accession: entity.accession.clone(),
            errors: entity.errors.clone(),
            warnings: entity.warnings.clone(),
            reason: entity.missing_accession_reason(),
        }
    }
}

/// Flat report over an [`crate::EntityMap`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityReport {
    /// Totals per type
    pub counts: BTreeMap<EntityType, TypeCounts>,
    /// One summary per entity
    pub entities: Vec<EntitySummary>,
}

impl EntityReport {
    /// Converted entities of one type
    #[must_use]
    pub fn converted(&self, entity_type: EntityType) -> usize {
        self.counts.get(&entity_type).map_or(0, |c| c.converted)
    }

    /// Summaries with errors or warnings
    pub fn with_issues(&self) -> impl Iterator<Item = &EntitySummary> {
        self.entities
            .iter()
            .filter(|s| !s.errors.is_empty() || !s.warnings.is_empty())
    }
}

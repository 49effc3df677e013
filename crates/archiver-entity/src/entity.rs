//! Archive entity
//!
//! One archivable unit built from source metadata. The entity carries its raw
//! source fragments, the payload produced by conversion, the remote reference
//! issued on attach and finally the accession.

use crate::types::EntityType;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error or warning attached to an entity or a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityIssue {
    /// Machine-readable code (e.g. `conversion_failed`)
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Optional structured detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl EntityIssue {
    /// Create an issue without details
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Remote resource created for an entity when it is attached to a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    /// URL of the remote sub-resource
    pub url: String,
    /// Identifier issued by the archive, when it reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// One archivable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntity {
    /// Stable alias (`{prefix}{type}_{uuid}[_{lane}]`)
    pub id: String,
    /// Entity type
    pub entity_type: EntityType,
    /// Named source fragments consumed by conversion
    pub source_data: Map<String, Value>,
    /// Relationship name to unresolved alias references
    pub links: IndexMap<String, Vec<String>>,
    /// Archive payload, empty until conversion succeeds
    pub conversion: Map<String, Value>,
    /// Accession issued once processing completes
    pub accession: Option<String>,
    /// Remote resource created on attach
    pub remote: Option<RemoteRef>,
    /// All source identifiers this entity summarizes
    pub metadata_uuids: IndexSet<String>,
    /// Source identifiers that receive the accession on reconciliation
    pub accessioned_metadata_uuids: IndexSet<String>,
    /// Errors in the order they were recorded
    pub errors: Vec<EntityIssue>,
    /// Warnings in the order they were recorded
    pub warnings: Vec<EntityIssue>,
}

impl ArchiveEntity {
    /// Create an empty entity
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type,
            source_data: Map::new(),
            links: IndexMap::new(),
            conversion: Map::new(),
            accession: None,
            remote: None,
            metadata_uuids: IndexSet::new(),
            accessioned_metadata_uuids: IndexSet::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Build the alias for a source record
    ///
    /// `lane` is appended when one source record fans out into several entities.
    #[must_use]
    pub fn alias(prefix: &str, entity_type: EntityType, uuid: &str, lane: Option<u32>) -> String {
        match lane {
            Some(lane) => format!("{prefix}{entity_type}_{uuid}_{lane}"),
            None => format!("{prefix}{entity_type}_{uuid}"),
        }
    }

    /// Attach a named source fragment
    #[must_use]
    pub fn with_source(mut self, name: impl Into<String>, fragment: Value) -> Self {
        self.source_data.insert(name.into(), fragment);
        self
    }

    /// Named source fragment
    #[inline]
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&Value> {
        self.source_data.get(name)
    }

    /// Record a relationship to another entity by alias; duplicates are ignored
    pub fn add_link(&mut self, relation: impl Into<String>, alias: impl Into<String>) {
        let alias = alias.into();
        let targets = self.links.entry(relation.into()).or_default();
        if !targets.contains(&alias) {
            targets.push(alias);
        }
    }

    /// Aliases linked under a relationship
    #[must_use]
    pub fn linked(&self, relation: &str) -> &[String] {
        self.links.get(relation).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record a source identifier, optionally marking it for accession write-back
    pub fn add_metadata_uuid(&mut self, uuid: impl Into<String>, accessioned: bool) {
        let uuid = uuid.into();
        if accessioned {
            self.accessioned_metadata_uuids.insert(uuid.clone());
        }
        self.metadata_uuids.insert(uuid);
    }

    /// Append an error
    pub fn add_error(&mut self, code: impl Into<String>, message: impl Into<String>, details: Option<Value>) {
        self.errors.push(EntityIssue {
            code: code.into(),
            message: message.into(),
            details,
        });
    }

    /// Append a warning
    pub fn add_warning(&mut self, code: impl Into<String>, message: impl Into<String>, details: Option<Value>) {
        self.warnings.push(EntityIssue {
            code: code.into(),
            message: message.into(),
            details,
        });
    }

    /// Non-empty conversion and no errors
    #[inline]
    #[must_use]
    pub fn is_convertible(&self) -> bool {
        !self.conversion.is_empty() && self.errors.is_empty()
    }

    /// Any error or warning recorded
    #[inline]
    #[must_use]
    pub fn has_issues(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }

    /// Why no accession is present, or `None` if one is
    #[must_use]
    pub fn missing_accession_reason(&self) -> Option<String> {
        if self.accession.is_some() {
            return None;
        }
        let reason = if let Some(first) = self.errors.first() {
            format!("{} error(s) recorded, first: {}", self.errors.len(), first.message)
        } else if self.conversion.is_empty() {
            "not converted".to_string()
        } else if self.remote.is_none() {
            "not submitted".to_string()
        } else {
            "no accession issued by archive".to_string()
        };
        Some(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alias_format() {
        assert_eq!(
            ArchiveEntity::alias("hca_", EntityType::Sample, "u1", None),
            "hca_sample_u1"
        );
        assert_eq!(
            ArchiveEntity::alias("", EntityType::SequencingRun, "u2", Some(3)),
            "sequencingRun_u2_3"
        );
    }

    #[test]
    fn convertible_requires_payload_and_no_errors() {
        let mut entity = ArchiveEntity::new(EntityType::Sample, "s1");
        assert!(!entity.is_convertible());

        entity.conversion.insert("alias".into(), json!("s1"));
        assert!(entity.is_convertible());

        entity.add_warning("w", "only a warning", None);
        assert!(entity.is_convertible());

        entity.add_error("conversion_failed", "no taxon", None);
        assert!(!entity.is_convertible());
    }

    #[test]
    fn links_are_deduplicated_in_order() {
        let mut entity = ArchiveEntity::new(EntityType::SequencingExperiment, "e1");
        entity.add_link("sampleUses", "s2");
        entity.add_link("sampleUses", "s1");
        entity.add_link("sampleUses", "s2");

        assert_eq!(entity.linked("sampleUses"), ["s2", "s1"]);
        assert!(entity.linked("studyRef").is_empty());
    }

    #[test]
    fn accessioned_uuids_are_subset() {
        let mut entity = ArchiveEntity::new(EntityType::SequencingRun, "r1");
        entity.add_metadata_uuid("f1", true);
        entity.add_metadata_uuid("f2", true);
        entity.add_metadata_uuid("p1", false);

        assert_eq!(entity.metadata_uuids.len(), 3);
        assert!(entity
            .accessioned_metadata_uuids
            .iter()
            .all(|u| entity.metadata_uuids.contains(u)));
    }

    #[test]
    fn missing_accession_reasons() {
        let mut entity = ArchiveEntity::new(EntityType::Project, "p");
        assert_eq!(entity.missing_accession_reason().as_deref(), Some("not converted"));

        entity.conversion.insert("title".into(), json!("t"));
        assert_eq!(entity.missing_accession_reason().as_deref(), Some("not submitted"));

        entity.remote = Some(RemoteRef { url: "u".into(), id: None });
        assert_eq!(
            entity.missing_accession_reason().as_deref(),
            Some("no accession issued by archive")
        );

        entity.accession = Some("S-BSST1".into());
        assert_eq!(entity.missing_accession_reason(), None);
    }
}

//! Entity type enumeration
//!
//! The set is closed: a new archive entity type needs a converter, a
//! reconciliation destination and a source collection, so it is a code change.

use crate::error::EntityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of archivable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    /// Study-level description (BioStudies)
    Project,
    /// Sequencing study (ENA)
    Study,
    /// Biological sample (BioSamples)
    Sample,
    /// Library preparation and sequencing assay (ENA)
    SequencingExperiment,
    /// Raw read files of one experiment, one per lane (ENA)
    SequencingRun,
}

impl EntityType {
    /// All types in processing order
    pub const ALL: [EntityType; 5] = [
        Self::Project,
        Self::Study,
        Self::Sample,
        Self::SequencingExperiment,
        Self::SequencingRun,
    ];

    /// Name used in aliases and serialized payloads
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Study => "study",
            Self::Sample => "sample",
            Self::SequencingExperiment => "sequencingExperiment",
            Self::SequencingRun => "sequencingRun",
        }
    }

    /// Collection name the archives use for this type
    #[inline]
    #[must_use]
    pub fn submittable_type(&self) -> &'static str {
        match self {
            Self::Project => "projects",
            Self::Study => "studies",
            Self::Sample => "samples",
            Self::SequencingExperiment => "sequencingExperiments",
            Self::SequencingRun => "sequencingRuns",
        }
    }

    /// Inverse of [`EntityType::submittable_type`]
    #[must_use]
    pub fn from_submittable_type(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.submittable_type() == name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EntityError::UnknownEntityType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        for t in EntityType::ALL {
            assert_eq!(t.to_string().parse::<EntityType>().unwrap(), t);
        }
    }

    #[test]
    fn serde_names_match_display() {
        for t in EntityType::ALL {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, serde_json::Value::String(t.to_string()));
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = "biomaterial".parse::<EntityType>().unwrap_err();
        assert_eq!(err, EntityError::UnknownEntityType("biomaterial".into()));
    }

    #[test]
    fn submittable_type_round_trips() {
        assert_eq!(
            EntityType::from_submittable_type("sequencingRuns"),
            Some(EntityType::SequencingRun)
        );
        assert_eq!(EntityType::from_submittable_type("files"), None);
    }
}

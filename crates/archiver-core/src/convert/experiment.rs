use super::{alias_refs, require_source, set_attribute, Converter, FieldTable};
use crate::error::{ConversionError, ConversionResult};
use archiver_entity::{ArchiveEntity, EntityType};
use archiver_mapping::path::get_path;
use archiver_mapping::{JsonMapper, MappingResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Relation naming the study an experiment belongs to
pub const STUDY_REF: &str = "studyRef";
/// Relation naming the samples an experiment sequenced
pub const SAMPLE_USES: &str = "sampleUses";

/// Assay process and its protocols to a sequence-archive experiment
#[derive(Debug)]
pub struct SequencingExperimentConverter {
    table: FieldTable,
}

impl SequencingExperimentConverter {
    /// Compile the field table
    ///
    /// # Errors
    /// Field table does not compile against the mapper's registry
    pub fn new(mapper: Arc<JsonMapper>) -> MappingResult<Self> {
        let table = json!({
            "title": ["process.content.process_core.process_id", "prefix", "Sequencing experiment "],
            "description": ["process.content.process_core.process_description"],
            "attributes.HCA Process UUID": ["process.uuid.uuid", "to_attribute"],
            "attributes.library_construction_method": [
                "library_preparation_protocol.content.library_construction_method", "concept_attribute"
            ],
            "attributes.nucleic_acid_source": ["library_preparation_protocol.content.nucleic_acid_source", "to_attribute"],
            "attributes.instrument_model": [
                "sequencing_protocol.content.instrument_manufacturer_model", "concept_attribute"
            ],
            "attributes.sequencing_approach": ["sequencing_protocol.content.method", "concept_attribute"]
        });
        Ok(Self {
            table: FieldTable::new(mapper, &table)?,
        })
    }
}

#[async_trait]
impl Converter for SequencingExperimentConverter {
    fn entity_type(&self) -> EntityType {
        EntityType::SequencingExperiment
    }

    async fn convert(&self, entity: &ArchiveEntity) -> ConversionResult<Map<String, Value>> {
        require_source(entity, "process")?;
        let library = require_source(entity, "library_preparation_protocol")?;
        let sequencing = require_source(entity, "sequencing_protocol")?;

        let samples: Vec<Value> = alias_refs(entity, SAMPLE_USES)
            .into_iter()
            .map(|sample| json!({ "sampleRef": sample }))
            .collect();
        if samples.is_empty() {
            return Err(ConversionError::MissingField(SAMPLE_USES.into()));
        }

        let mut payload = self.table.apply(entity)?;

        let paired = get_path(sequencing, "content.paired_end")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let single_cell = get_path(library, "content.nucleic_acid_source")
            .and_then(Value::as_str)
            .is_some_and(|source| source.eq_ignore_ascii_case("single cell"));

        set_attribute(&mut payload, "library_layout", if paired { "PAIRED" } else { "SINGLE" });
        set_attribute(&mut payload, "library_strategy", "RNA-Seq");
        set_attribute(
            &mut payload,
            "library_source",
            if single_cell { "TRANSCRIPTOMIC SINGLE CELL" } else { "TRANSCRIPTOMIC" },
        );
        set_attribute(&mut payload, "library_selection", "cDNA");

        if let Some(study) = alias_refs(entity, STUDY_REF).into_iter().next() {
            payload.insert(STUDY_REF.into(), study);
        }
        payload.insert(SAMPLE_USES.into(), Value::Array(samples));
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::archive_registry;

    fn experiment() -> ArchiveEntity {
        let mut entity = ArchiveEntity::new(EntityType::SequencingExperiment, "sequencingExperiment_a1")
            .with_source("process", json!({"uuid": {"uuid": "a1"}, "content": {"process_core": {"process_id": "assay_1"}}}))
            .with_source(
                "library_preparation_protocol",
                json!({"content": {"nucleic_acid_source": "single cell",
                                   "library_construction_method": {"text": "10X v2", "ontology": "EFO:0009310", "ontology_label": "10X 3' v2"}}}),
            )
            .with_source("sequencing_protocol", json!({"content": {"paired_end": true}}));
        entity.add_link(STUDY_REF, "study_p1");
        entity
    }

    fn converter() -> SequencingExperimentConverter {
        SequencingExperimentConverter::new(Arc::new(JsonMapper::new(Arc::new(archive_registry())))).unwrap()
    }

    #[tokio::test]
    async fn renders_refs_and_library_attributes() {
        let mut entity = experiment();
        entity.add_link(SAMPLE_USES, "sample_c1");

        let payload = converter().convert(&entity).await.unwrap();
        assert_eq!(payload["title"], json!("Sequencing experiment assay_1"));
        assert_eq!(payload["studyRef"], json!({"alias": "study_p1"}));
        assert_eq!(payload["sampleUses"], json!([{"sampleRef": {"alias": "sample_c1"}}]));
        assert_eq!(payload["attributes"]["library_layout"], json!([{"value": "PAIRED"}]));
        assert_eq!(
            payload["attributes"]["library_source"],
            json!([{"value": "TRANSCRIPTOMIC SINGLE CELL"}])
        );
    }

    #[tokio::test]
    async fn experiment_without_samples_fails() {
        let err = converter().convert(&experiment()).await.unwrap_err();
        assert!(matches!(err, ConversionError::MissingField(field) if field == SAMPLE_USES));
    }
}

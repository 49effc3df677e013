use super::{require_source, set_attribute, Converter, FieldTable};
use crate::client::{record_schema_name, TaxonomyService};
use crate::error::{ConversionError, ConversionResult};
use archiver_entity::{ArchiveEntity, EntityType};
use archiver_mapping::path::get_path;
use archiver_mapping::{JsonMapper, MappingResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Relation naming the samples a sample was derived from
pub const SAMPLE_RELATIONSHIPS: &str = "sampleRelationships";

const TAXON_PATH: &str = "content.biomaterial_core.ncbi_taxon_id";

/// Biomaterial record to a sample-archive sample
pub struct SampleConverter {
    table: FieldTable,
    taxonomy: Arc<dyn TaxonomyService>,
}

impl SampleConverter {
    /// Compile the field table
    ///
    /// # Errors
    /// Field table does not compile against the mapper's registry
    pub fn new(mapper: Arc<JsonMapper>, taxonomy: Arc<dyn TaxonomyService>) -> MappingResult<Self> {
        let table = json!({
            "title": ["biomaterial.content.biomaterial_core.biomaterial_name"],
            "description": ["biomaterial.content.biomaterial_core.biomaterial_description"],
            "accession": ["biomaterial.content.biomaterial_core.biosamples_accession"],
            "releaseDate": ["biomaterial.submissionDate", "date_only"],
            "attributes.Biomaterial Core - Biomaterial Id": ["biomaterial.content.biomaterial_core.biomaterial_id", "to_attribute"],
            "attributes.HCA Biomaterial UUID": ["biomaterial.uuid.uuid", "to_attribute"],
            "attributes.Sex": ["biomaterial.content.sex", "to_attribute"],
            "attributes.Is Living": ["biomaterial.content.is_living", "to_attribute"],
            "attributes.Organ": ["biomaterial.content.organ", "concept_attribute"],
            "attributes.Organ Part": ["biomaterial.content.organ_parts.0", "concept_attribute"],
            "attributes.Disease": ["biomaterial.content.diseases.0", "concept_attribute"],
            "attributes.Development Stage": ["biomaterial.content.development_stage", "concept_attribute"],
            "attributes.Cell Type": ["biomaterial.content.selected_cell_types.0", "concept_attribute"]
        });
        Ok(Self {
            table: FieldTable::new(mapper, &table)?,
            taxonomy,
        })
    }

    async fn taxon(&self, biomaterial: &Value) -> ConversionResult<(u64, String)> {
        let taxon_id = get_path(biomaterial, TAXON_PATH)
            .and_then(|v| match v {
                Value::Array(ids) => ids.first(),
                other => Some(other),
            })
            .and_then(Value::as_u64)
            .ok_or_else(|| ConversionError::MissingField(TAXON_PATH.into()))?;

        match self.taxonomy.scientific_name(taxon_id).await {
            Ok(Some(name)) => Ok((taxon_id, name)),
            Ok(None) => Err(ConversionError::taxonomy(taxon_id, "unknown taxon")),
            Err(e) => Err(ConversionError::taxonomy(taxon_id, e.to_string())),
        }
    }
}

impl std::fmt::Debug for SampleConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleConverter").field("table", &self.table).finish_non_exhaustive()
    }
}

#[async_trait]
impl Converter for SampleConverter {
    fn entity_type(&self) -> EntityType {
        EntityType::Sample
    }

    async fn convert(&self, entity: &ArchiveEntity) -> ConversionResult<Map<String, Value>> {
        let biomaterial = require_source(entity, "biomaterial")?;
        let (taxon_id, taxon) = self.taxon(biomaterial).await?;

        let mut payload = self.table.apply(entity)?;
        if !payload.contains_key("title") {
            let id = get_path(biomaterial, "content.biomaterial_core.biomaterial_id")
                .cloned()
                .ok_or_else(|| ConversionError::MissingField("biomaterial_core.biomaterial_id".into()))?;
            payload.insert("title".into(), id);
        }
        payload.insert("taxonId".into(), json!(taxon_id));
        payload.insert("taxon".into(), Value::String(taxon));

        if let Some(schema) = record_schema_name(biomaterial) {
            set_attribute(&mut payload, "HCA Biomaterial Type", schema);
        }

        let relationships: Vec<Value> = entity
            .linked(SAMPLE_RELATIONSHIPS)
            .iter()
            .map(|parent| json!({ "alias": parent, "relationshipNature": "derived from" }))
            .collect();
        if !relationships.is_empty() {
            payload.insert(SAMPLE_RELATIONSHIPS.into(), Value::Array(relationships));
        }
        Ok(payload)
    }
}

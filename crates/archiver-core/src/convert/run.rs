use super::{alias_refs, require_source, Converter, FieldTable};
use crate::error::{ConversionError, ConversionResult};
use archiver_entity::{ArchiveEntity, EntityType};
use archiver_mapping::{JsonMapper, MappingResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Relation naming the experiment a run belongs to
pub const ASSAY_REFS: &str = "assayRefs";

/// Sequence files of one assay lane to a sequence-archive run
#[derive(Debug)]
pub struct SequencingRunConverter {
    table: FieldTable,
}

impl SequencingRunConverter {
    /// Compile the field table
    ///
    /// # Errors
    /// Field table does not compile against the mapper's registry
    pub fn new(mapper: Arc<JsonMapper>) -> MappingResult<Self> {
        let table = json!({
            "title": ["process.content.process_core.process_id", "prefix", "Sequencing run "],
            "attributes.lane_index": ["lane_index", "to_attribute"],
            "files": {
                "$on": "files",
                "name": ["content.file_core.file_name"],
                "type": ["content.file_core.format", "lowercase"],
                "checksum": ["checksums.md5"],
                "readType": ["content.read_index"]
            }
        });
        Ok(Self {
            table: FieldTable::new(mapper, &table)?,
        })
    }
}

#[async_trait]
impl Converter for SequencingRunConverter {
    fn entity_type(&self) -> EntityType {
        EntityType::SequencingRun
    }

    async fn convert(&self, entity: &ArchiveEntity) -> ConversionResult<Map<String, Value>> {
        require_source(entity, "process")?;
        let files = require_source(entity, "files")?;
        if files.as_array().map_or(true, Vec::is_empty) {
            return Err(ConversionError::MissingField("files".into()));
        }

        let mut payload = self.table.apply(entity)?;
        if let Some(Value::Array(files)) = payload.get_mut("files") {
            for file in files.iter_mut().filter_map(Value::as_object_mut) {
                if file.contains_key("checksum") {
                    file.insert("checksumMethod".into(), json!("MD5"));
                }
            }
        }

        if let Some(assay) = alias_refs(entity, ASSAY_REFS).into_iter().next() {
            payload.insert(ASSAY_REFS.into(), Value::Array(vec![assay]));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::archive_registry;

    fn converter() -> SequencingRunConverter {
        SequencingRunConverter::new(Arc::new(JsonMapper::new(Arc::new(archive_registry())))).unwrap()
    }

    #[tokio::test]
    async fn maps_each_file_of_the_lane() {
        let mut entity = ArchiveEntity::new(EntityType::SequencingRun, "sequencingRun_a1_2")
            .with_source("process", json!({"content": {"process_core": {"process_id": "assay_1"}}}))
            .with_source("lane_index", json!(2))
            .with_source(
                "files",
                json!([
                    {"content": {"file_core": {"file_name": "r1.fastq.gz", "format": "FASTQ.GZ"}, "read_index": "read1"},
                     "checksums": {"md5": "aa"}},
                    {"content": {"file_core": {"file_name": "r2.fastq.gz", "format": "fastq.gz"}, "read_index": "read2"}}
                ]),
            );
        entity.add_link(ASSAY_REFS, "sequencingExperiment_a1");

        let payload = converter().convert(&entity).await.unwrap();
        assert_eq!(
            payload["files"],
            json!([
                {"name": "r1.fastq.gz", "type": "fastq.gz", "checksum": "aa", "checksumMethod": "MD5", "readType": "read1"},
                {"name": "r2.fastq.gz", "type": "fastq.gz", "readType": "read2"}
            ])
        );
        assert_eq!(payload["attributes"]["lane_index"], json!([{"value": 2}]));
        assert_eq!(payload["assayRefs"], json!([{"alias": "sequencingExperiment_a1"}]));
    }

    #[tokio::test]
    async fn run_without_files_fails() {
        let entity = ArchiveEntity::new(EntityType::SequencingRun, "r")
            .with_source("process", json!({}))
            .with_source("files", json!([]));
        assert!(matches!(
            converter().convert(&entity).await,
            Err(ConversionError::MissingField(_))
        ));
    }
}

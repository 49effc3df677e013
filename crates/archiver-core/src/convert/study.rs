use super::{alias_refs, require_source, set_attribute, Converter, FieldTable};
use crate::error::{ConversionError, ConversionResult};
use archiver_entity::{ArchiveEntity, EntityType};
use archiver_mapping::{JsonMapper, MappingResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Relation naming the project a study belongs to
pub const PROJECT_REF: &str = "projectRef";

/// Project record to a sequence-archive study
#[derive(Debug)]
pub struct StudyConverter {
    table: FieldTable,
}

impl StudyConverter {
    /// Compile the field table
    ///
    /// # Errors
    /// Field table does not compile against the mapper's registry
    pub fn new(mapper: Arc<JsonMapper>) -> MappingResult<Self> {
        let table = json!({
            "title": ["project.content.project_core.project_title"],
            "description": ["project.content.project_core.project_description"],
            "attributes.study_abstract": ["project.content.project_core.project_description", "to_attribute"],
            "attributes.HCA Project UUID": ["project.uuid.uuid", "to_attribute"]
        });
        Ok(Self {
            table: FieldTable::new(mapper, &table)?,
        })
    }
}

#[async_trait]
impl Converter for StudyConverter {
    fn entity_type(&self) -> EntityType {
        EntityType::Study
    }

    async fn convert(&self, entity: &ArchiveEntity) -> ConversionResult<Map<String, Value>> {
        require_source(entity, "project")?;
        let mut payload = self.table.apply(entity)?;
        if !payload.contains_key("title") {
            return Err(ConversionError::MissingField("project_core.project_title".into()));
        }

        set_attribute(&mut payload, "study_type", "Transcriptome Analysis");
        if let Some(project) = alias_refs(entity, PROJECT_REF).into_iter().next() {
            payload.insert(PROJECT_REF.into(), project);
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::archive_registry;

    #[tokio::test]
    async fn study_references_its_project() {
        let converter =
            StudyConverter::new(Arc::new(JsonMapper::new(Arc::new(archive_registry())))).unwrap();
        let mut entity = ArchiveEntity::new(EntityType::Study, "study_p1").with_source(
            "project",
            json!({"uuid": {"uuid": "p1"}, "content": {"project_core": {"project_title": "Atlas"}}}),
        );
        entity.add_link(PROJECT_REF, "project_p1");

        let payload = converter.convert(&entity).await.unwrap();
        assert_eq!(payload["projectRef"], json!({"alias": "project_p1"}));
        assert_eq!(payload["attributes"]["study_type"], json!([{"value": "Transcriptome Analysis"}]));
        assert_eq!(payload["alias"], json!("study_p1"));
    }

    #[tokio::test]
    async fn untitled_project_cannot_become_study() {
        let converter =
            StudyConverter::new(Arc::new(JsonMapper::new(Arc::new(archive_registry())))).unwrap();
        let entity = ArchiveEntity::new(EntityType::Study, "s").with_source("project", json!({"content": {}}));
        assert!(matches!(
            converter.convert(&entity).await,
            Err(ConversionError::MissingField(_))
        ));
    }
}

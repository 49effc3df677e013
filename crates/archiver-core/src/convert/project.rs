use super::{date_only, require_source, with_default_arrays, Converter, FieldTable};
use crate::error::{ConversionError, ConversionResult};
use archiver_entity::{ArchiveEntity, EntityType};
use archiver_mapping::{JsonMapper, MappingResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Arrays a project may omit; anchored tables need them present
const OPTIONAL_LISTS: [&str; 3] = ["content.contributors", "content.publications", "content.funders"];

/// Project record to a study-archive project
#[derive(Debug)]
pub struct ProjectConverter {
    table: FieldTable,
}

impl ProjectConverter {
    /// Compile the field table
    ///
    /// # Errors
    /// Field table does not compile against the mapper's registry
    pub fn new(mapper: Arc<JsonMapper>) -> MappingResult<Self> {
        let table = json!({
            "title": ["project.content.project_core.project_title"],
            "description": ["project.content.project_core.project_description"],
            "releaseDate": ["project.releaseDate", "date_only"],
            "attributes.Project Short Name": ["project.content.project_core.project_short_name", "to_attribute"],
            "attributes.HCA Project UUID": ["project.uuid.uuid", "to_attribute"],
            "contacts": {
                "$on": "project.content.contributors",
                "firstName": ["name", "name_part", "first"],
                "middleInitials": ["name", "name_part", "middle"],
                "lastName": ["name", "name_part", "last"],
                "email": ["email"],
                "affiliation": ["institution"],
                "address": ["address"],
                "role": ["project_role", "concept_label"]
            },
            "publications": {
                "$on": "project.content.publications",
                "articleTitle": ["title"],
                "authors": ["authors", "join", ", "],
                "doi": ["doi"],
                "pubmedId": ["pmid", "to_string"]
            },
            "fundings": {
                "$on": "project.content.funders",
                "grantId": ["grant_id"],
                "grantTitle": ["grant_title"],
                "organization": ["organization"]
            }
        });
        Ok(Self {
            table: FieldTable::new(mapper, &table)?,
        })
    }
}

#[async_trait]
impl Converter for ProjectConverter {
    fn entity_type(&self) -> EntityType {
        EntityType::Project
    }

    async fn convert(&self, entity: &ArchiveEntity) -> ConversionResult<Map<String, Value>> {
        let project = with_default_arrays(require_source(entity, "project")?, &OPTIONAL_LISTS);
        let mut payload = self.table.apply_to(entity, &json!({ "project": &project }))?;

        // unreleased projects fall back to the date the metadata was submitted
        if !payload.contains_key("releaseDate") {
            let submitted = date_only(project.get("submissionDate"), &[])?
                .ok_or_else(|| ConversionError::MissingField("releaseDate".into()))?;
            payload.insert("releaseDate".into(), submitted);
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::archive_registry;
    use pretty_assertions::assert_eq;

    fn converter() -> ProjectConverter {
        ProjectConverter::new(Arc::new(JsonMapper::new(Arc::new(archive_registry())))).unwrap()
    }

    #[tokio::test]
    async fn converts_full_project() {
        let entity = ArchiveEntity::new(EntityType::Project, "project_p1").with_source(
            "project",
            json!({
                "uuid": {"uuid": "p1"},
                "releaseDate": "2019-06-01T00:00:00Z",
                "content": {
                    "project_core": {
                        "project_short_name": "Liver",
                        "project_title": "Liver atlas",
                        "project_description": "Cells of the liver"
                    },
                    "contributors": [{"name": "Jane,,Doe", "email": "j@x.org", "institution": "EBI"}],
                    "publications": [{"title": "Paper", "authors": ["Doe J", "Roe R"], "pmid": 123}]
                }
            }),
        );

        let payload = converter().convert(&entity).await.unwrap();
        assert_eq!(
            Value::Object(payload),
            json!({
                "alias": "project_p1",
                "title": "Liver atlas",
                "description": "Cells of the liver",
                "releaseDate": "2019-06-01",
                "attributes": {
                    "Project Short Name": [{"value": "Liver"}],
                    "HCA Project UUID": [{"value": "p1"}]
                },
                "contacts": [{"firstName": "Jane", "lastName": "Doe", "email": "j@x.org", "affiliation": "EBI"}],
                "publications": [{"articleTitle": "Paper", "authors": "Doe J, Roe R", "pubmedId": "123"}],
                "fundings": []
            })
        );
    }

    #[tokio::test]
    async fn unreleased_project_uses_submission_date() {
        let entity = ArchiveEntity::new(EntityType::Project, "p").with_source(
            "project",
            json!({
                "submissionDate": "2018-11-20T09:15:00.000Z",
                "content": {"project_core": {"project_title": "T"}}
            }),
        );
        let payload = converter().convert(&entity).await.unwrap();
        assert_eq!(payload["releaseDate"], json!("2018-11-20"));
    }

    #[tokio::test]
    async fn project_without_any_date_is_rejected() {
        let entity = ArchiveEntity::new(EntityType::Project, "p")
            .with_source("project", json!({"content": {"project_core": {"project_title": "T"}}}));
        let err = converter().convert(&entity).await.unwrap_err();
        assert!(matches!(err, ConversionError::MissingField(ref field) if field == "releaseDate"));
    }

    #[tokio::test]
    async fn missing_source_is_conversion_error() {
        let entity = ArchiveEntity::new(EntityType::Project, "p");
        assert!(converter().convert(&entity).await.is_err());
    }
}

//! Manifest aggregation
//!
//! Turns the records of one manifest into archive entities:
//! - one `project` and one `study` per project record
//! - one `sample` per biomaterial, derived-from relations checked through the
//!   dependency graph and ordered parents first
//! - one `sequencingExperiment` per assay process of the sequence files
//! - one `sequencingRun` per assay process and lane
//!
//! No archive I/O happens here; only the metadata source is read.

use crate::client::{record_schema_name, record_uuid, MetadataSource};
use crate::convert::{ASSAY_REFS, PROJECT_REF, SAMPLE_RELATIONSHIPS, SAMPLE_USES, STUDY_REF};
use crate::error::ArchiverResult;
use archiver_entity::{ArchiveEntity, EntityMap, EntityType};
use archiver_graph::DependencyGraph;
use archiver_mapping::path::get_path;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Manifest key of the submission the bundle came from
pub const ENVELOPE_UUID: &str = "envelopeUuid";

const PROJECT_MAP: &str = "fileProjectMap";
const BIOMATERIAL_MAP: &str = "fileBiomaterialMap";
const PROCESS_MAP: &str = "fileProcessMap";
const PROTOCOL_MAP: &str = "fileProtocolMap";
const FILE_MAP: &str = "fileFilesMap";

const DERIVED_BY: &str = "derivedByProcesses";
const INPUT_BIOMATERIALS: &str = "inputBiomaterials";
const PROTOCOLS: &str = "protocols";

/// Entities of one manifest
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Submission the manifest belongs to, when the manifest names one
    pub submission_uuid: Option<String>,
    /// Entities in processing order
    pub entities: EntityMap,
}

/// Builds entities from a manifest
pub struct ManifestAggregator<'a> {
    source: &'a dyn MetadataSource,
    alias_prefix: &'a str,
}

impl<'a> ManifestAggregator<'a> {
    /// Aggregator reading from `source`, aliases prefixed with `alias_prefix`
    pub fn new(source: &'a dyn MetadataSource, alias_prefix: &'a str) -> Self {
        Self { source, alias_prefix }
    }

    fn alias(&self, entity_type: EntityType, uuid: &str, lane: Option<u32>) -> String {
        ArchiveEntity::alias(self.alias_prefix, entity_type, uuid, lane)
    }

    /// Aggregate one manifest
    ///
    /// # Errors
    /// `ArchiverError::Client` when the source cannot be read,
    /// `ArchiverError::Graph` when biomaterials derive from each other in a cycle
    pub async fn aggregate(&self, manifest_id: &str) -> ArchiverResult<Aggregation> {
        let manifest = self.source.get_manifest(manifest_id).await?;
        let submission_uuid = manifest
            .get(ENVELOPE_UUID)
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut entities = EntityMap::new();

        let projects = self.fetch_listed(&manifest, PROJECT_MAP, "projects").await?;
        let study_alias = self.add_projects(&projects, &mut entities);

        let biomaterials = self.fetch_listed(&manifest, BIOMATERIAL_MAP, "biomaterials").await?;
        entities.extend(self.build_samples(&biomaterials).await?);

        let files = self.fetch_listed(&manifest, FILE_MAP, "files").await?;
        let processes = listed_uuids(&manifest, PROCESS_MAP);
        let protocols = listed_uuids(&manifest, PROTOCOL_MAP);
        self.add_sequencing(&files, &processes, &protocols, study_alias.as_deref(), &mut entities)
            .await?;

        tracing::info!(
            manifest = %manifest_id,
            entities = entities.len(),
            "Aggregated manifest"
        );
        Ok(Aggregation {
            submission_uuid,
            entities,
        })
    }

    /// Fetch every record listed under a manifest key, in manifest order
    async fn fetch_listed(&self, manifest: &Value, key: &str, collection: &str) -> ArchiverResult<Vec<Value>> {
        let mut records = Vec::new();
        for uuid in listed_uuids(manifest, key) {
            records.push(self.source.get_entity_by_uuid(collection, &uuid).await?);
        }
        Ok(records)
    }

    /// Returns the alias of the first study
    fn add_projects(&self, projects: &[Value], entities: &mut EntityMap) -> Option<String> {
        let mut first_study = None;

        for record in projects {
            let Some(uuid) = record_uuid(record) else {
                tracing::warn!("Skipping project record without uuid");
                continue;
            };

            let project_alias = self.alias(EntityType::Project, uuid, None);
            let mut project = ArchiveEntity::new(EntityType::Project, project_alias.clone())
                .with_source("project", record.clone());
            project.add_metadata_uuid(uuid, true);

            let study_alias = self.alias(EntityType::Study, uuid, None);
            let mut study = ArchiveEntity::new(EntityType::Study, study_alias.clone())
                .with_source("project", record.clone());
            study.add_link(PROJECT_REF, project_alias);
            study.add_metadata_uuid(uuid, true);

            entities.insert(project);
            entities.insert(study);
            first_study.get_or_insert(study_alias);
        }
        first_study
    }

    /// Samples ordered so every sample follows the samples it derives from;
    /// samples outside any derivation come last in discovery order
    async fn build_samples(&self, biomaterials: &[Value]) -> ArchiverResult<Vec<ArchiveEntity>> {
        let in_manifest: HashSet<&str> = biomaterials.iter().filter_map(record_uuid).collect();
        let mut graph: DependencyGraph<String> = DependencyGraph::new();
        let mut samples: IndexMap<String, ArchiveEntity> = IndexMap::new();

        for record in biomaterials {
            let Some(uuid) = record_uuid(record) else {
                tracing::warn!("Skipping biomaterial record without uuid");
                continue;
            };
            let alias = self.alias(EntityType::Sample, uuid, None);
            let mut sample = ArchiveEntity::new(EntityType::Sample, alias.clone())
                .with_source("biomaterial", record.clone());
            sample.add_metadata_uuid(uuid, true);

            for process in self.source.get_related_entities(record, DERIVED_BY, "processes").await? {
                let parents = self
                    .source
                    .get_related_entities(&process, INPUT_BIOMATERIALS, "biomaterials")
                    .await?;
                for parent in &parents {
                    let Some(parent_uuid) = record_uuid(parent) else {
                        continue;
                    };
                    if !in_manifest.contains(parent_uuid) {
                        tracing::debug!(alias = %alias, parent = %parent_uuid, "Parent biomaterial outside manifest");
                        continue;
                    }
                    let parent_alias = self.alias(EntityType::Sample, parent_uuid, None);
                    graph.add_edge(alias.clone(), parent_alias.clone())?;
                    sample.add_link(SAMPLE_RELATIONSHIPS, parent_alias);
                }
            }
            samples.insert(alias, sample);
        }

        let mut ordered = Vec::with_capacity(samples.len());
        for alias in graph.dependencies_first() {
            if let Some(sample) = samples.shift_remove(&alias) {
                ordered.push(sample);
            }
        }
        ordered.extend(samples.into_values());
        Ok(ordered)
    }

    async fn add_sequencing(
        &self,
        files: &[Value],
        processes: &[String],
        protocols: &[String],
        study_alias: Option<&str>,
        entities: &mut EntityMap,
    ) -> ArchiverResult<()> {
        let mut assays: IndexMap<String, (Value, Vec<Value>)> = IndexMap::new();

        for file in files.iter().filter(|f| is_sequence_file(f)) {
            let derived_by = self.source.get_related_entities(file, DERIVED_BY, "processes").await?;
            let Some(process) = derived_by
                .into_iter()
                .find(|p| record_uuid(p).is_some_and(|u| processes.is_empty() || processes.iter().any(|m| m == u)))
            else {
                tracing::warn!(file = ?record_uuid(file), "Sequence file without assay process");
                continue;
            };
            let Some(process_uuid) = record_uuid(&process).map(str::to_string) else {
                continue;
            };
            assays
                .entry(process_uuid)
                .or_insert_with(|| (process, Vec::new()))
                .1
                .push(file.clone());
        }

        for (process_uuid, (process, assay_files)) in assays {
            let experiment_alias = self.alias(EntityType::SequencingExperiment, &process_uuid, None);
            let mut experiment = ArchiveEntity::new(EntityType::SequencingExperiment, experiment_alias.clone())
                .with_source("process", process.clone());
            experiment.add_metadata_uuid(process_uuid.as_str(), true);

            for protocol in self.source.get_related_entities(&process, PROTOCOLS, "protocols").await? {
                let listed = record_uuid(&protocol)
                    .is_some_and(|u| protocols.is_empty() || protocols.iter().any(|m| m == u));
                match record_schema_name(&protocol) {
                    Some(name @ ("library_preparation_protocol" | "sequencing_protocol")) if listed => {
                        let name = name.to_string();
                        experiment = experiment.with_source(name, protocol);
                    }
                    _ => {}
                }
            }

            if let Some(study) = study_alias {
                experiment.add_link(STUDY_REF, study);
            }
            for input in self
                .source
                .get_related_entities(&process, INPUT_BIOMATERIALS, "biomaterials")
                .await?
            {
                let Some(input_uuid) = record_uuid(&input) else {
                    continue;
                };
                let sample_alias = self.alias(EntityType::Sample, input_uuid, None);
                if entities.get(EntityType::Sample, &sample_alias).is_some() {
                    experiment.add_link(SAMPLE_USES, sample_alias);
                } else {
                    experiment.add_warning(
                        "sample_not_in_manifest",
                        format!("input biomaterial {input_uuid} is not part of the manifest"),
                        None,
                    );
                }
            }
            entities.insert(experiment);

            for run in self.build_runs(&process_uuid, &process, assay_files, &experiment_alias) {
                entities.insert(run);
            }
        }
        Ok(())
    }

    /// One run per lane; a single lane keeps the unsuffixed alias
    fn build_runs(&self, process_uuid: &str, process: &Value, files: Vec<Value>, experiment_alias: &str) -> Vec<ArchiveEntity> {
        let mut lanes: BTreeMap<Option<u32>, Vec<Value>> = BTreeMap::new();
        for file in files {
            lanes.entry(lane_index(&file)).or_default().push(file);
        }
        let fan_out = lanes.len() > 1;

        lanes
            .into_iter()
            .map(|(lane, files)| {
                let alias = self.alias(EntityType::SequencingRun, process_uuid, lane.filter(|_| fan_out));
                let mut run = ArchiveEntity::new(EntityType::SequencingRun, alias)
                    .with_source("process", process.clone());
                if let Some(lane) = lane {
                    run = run.with_source("lane_index", Value::from(lane));
                }
                for uuid in files.iter().filter_map(record_uuid) {
                    run.add_metadata_uuid(uuid, true);
                }
                run.add_metadata_uuid(process_uuid, false);
                run.add_link(ASSAY_REFS, experiment_alias);
                run.with_source("files", Value::Array(files))
            })
            .collect()
    }
}

/// UUIDs listed under a manifest map, in manifest order
fn listed_uuids(manifest: &Value, key: &str) -> Vec<String> {
    match manifest.get(key) {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn is_sequence_file(record: &Value) -> bool {
    record_schema_name(record).map_or(true, |name| name == "sequence_file")
}

fn lane_index(file: &Value) -> Option<u32> {
    get_path(file, "content.lane_index")
        .and_then(Value::as_u64)
        .and_then(|lane| u32::try_from(lane).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manifest_maps_list_uuids_in_order() {
        let manifest = json!({
            "fileProjectMap": {"p2": ["f1"], "p1": ["f1"]},
            "fileFilesMap": ["f1", "f2"]
        });
        assert_eq!(listed_uuids(&manifest, PROJECT_MAP), vec!["p2", "p1"]);
        assert_eq!(listed_uuids(&manifest, FILE_MAP), vec!["f1", "f2"]);
        assert!(listed_uuids(&manifest, PROCESS_MAP).is_empty());
    }

    #[test]
    fn only_sequence_files_are_sequenced() {
        assert!(is_sequence_file(&json!({"content": {"describedBy": "https://s/type/file/9.0.0/sequence_file"}})));
        assert!(!is_sequence_file(&json!({"content": {"describedBy": "https://s/type/file/9.0.0/analysis_file"}})));
        assert!(is_sequence_file(&json!({"content": {}})));
    }

    #[test]
    fn lane_index_is_optional() {
        assert_eq!(lane_index(&json!({"content": {"lane_index": 3}})), Some(3));
        assert_eq!(lane_index(&json!({"content": {}})), None);
    }
}

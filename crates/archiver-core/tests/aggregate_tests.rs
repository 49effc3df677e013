//! Manifest aggregation over the in-memory metadata source

use archiver_core::convert::{ASSAY_REFS, PROJECT_REF, SAMPLE_RELATIONSHIPS, SAMPLE_USES, STUDY_REF};
use archiver_core::{ArchiverError, ManifestAggregator};
use archiver_entity::EntityType;
use archiver_test_utils::{
    biomaterial_record, process_record, project_record, sequence_file_record, single_cell_source,
    FakeMetadataSource, ENVELOPE_UUID, MANIFEST_ID,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn ids<'a>(entities: impl Iterator<Item = &'a archiver_entity::ArchiveEntity>) -> Vec<String> {
    entities.map(|e| e.id.clone()).collect()
}

#[tokio::test]
async fn samples_follow_the_samples_they_derive_from() {
    let source = single_cell_source();
    let aggregation = ManifestAggregator::new(&source, "").aggregate(MANIFEST_ID).await.unwrap();

    assert_eq!(aggregation.submission_uuid.as_deref(), Some(ENVELOPE_UUID));
    assert_eq!(
        ids(aggregation.entities.entities_of(EntityType::Sample)),
        vec!["sample_d1", "sample_b1", "sample_cs1"]
    );

    let cells = aggregation.entities.get(EntityType::Sample, "sample_cs1").unwrap();
    assert_eq!(cells.linked(SAMPLE_RELATIONSHIPS), ["sample_b1".to_string()]);
    assert!(cells.accessioned_metadata_uuids.contains("cs1"));
    let donor = aggregation.entities.get(EntityType::Sample, "sample_d1").unwrap();
    assert!(donor.linked(SAMPLE_RELATIONSHIPS).is_empty());
}

#[tokio::test]
async fn project_yields_project_and_study() {
    let source = single_cell_source();
    let aggregation = ManifestAggregator::new(&source, "").aggregate(MANIFEST_ID).await.unwrap();

    let study = aggregation.entities.get(EntityType::Study, "study_p1").unwrap();
    assert_eq!(study.linked(PROJECT_REF), ["project_p1".to_string()]);
    assert!(study.accessioned_metadata_uuids.contains("p1"));
    assert!(aggregation.entities.get(EntityType::Project, "project_p1").is_some());
}

#[tokio::test]
async fn assay_becomes_experiment_with_protocols() {
    let source = single_cell_source();
    let aggregation = ManifestAggregator::new(&source, "").aggregate(MANIFEST_ID).await.unwrap();

    let experiment = aggregation
        .entities
        .get(EntityType::SequencingExperiment, "sequencingExperiment_a1")
        .unwrap();
    assert!(experiment.source("library_preparation_protocol").is_some());
    assert!(experiment.source("sequencing_protocol").is_some());
    assert_eq!(experiment.linked(SAMPLE_USES), ["sample_cs1".to_string()]);
    assert_eq!(experiment.linked(STUDY_REF), ["study_p1".to_string()]);
    assert!(experiment.warnings.is_empty());
}

#[tokio::test]
async fn runs_fan_out_per_lane() {
    let source = single_cell_source();
    let aggregation = ManifestAggregator::new(&source, "").aggregate(MANIFEST_ID).await.unwrap();

    assert_eq!(
        ids(aggregation.entities.entities_of(EntityType::SequencingRun)),
        vec!["sequencingRun_a1_1", "sequencingRun_a1_2"]
    );
    let lane_two = aggregation
        .entities
        .get(EntityType::SequencingRun, "sequencingRun_a1_2")
        .unwrap();
    assert_eq!(lane_two.source("lane_index"), Some(&json!(2)));
    assert_eq!(lane_two.source("files").and_then(|f| f.as_array()).map(Vec::len), Some(2));
    assert_eq!(lane_two.linked(ASSAY_REFS), ["sequencingExperiment_a1".to_string()]);
    let accessioned: Vec<&str> = lane_two.accessioned_metadata_uuids.iter().map(String::as_str).collect();
    assert_eq!(accessioned, vec!["f3", "f4"]);
}

#[tokio::test]
async fn alias_prefix_applies_to_every_entity() {
    let source = single_cell_source();
    let aggregation = ManifestAggregator::new(&source, "hca_").aggregate(MANIFEST_ID).await.unwrap();

    assert!(aggregation.entities.iter().all(|e| e.id.starts_with("hca_")));
    let tissue = aggregation.entities.get(EntityType::Sample, "hca_sample_b1").unwrap();
    assert_eq!(tissue.linked(SAMPLE_RELATIONSHIPS), ["hca_sample_d1".to_string()]);
}

fn lane_source(lanes: &[u32]) -> FakeMetadataSource {
    let files: Vec<String> = (1..=lanes.len()).map(|i| format!("f{i}")).collect();
    let mut file_map = serde_json::Map::new();
    for file in &files {
        file_map.insert(file.clone(), json!([file]));
    }

    let mut source = FakeMetadataSource::new()
        .with_manifest(
            "m",
            json!({
                "fileProjectMap": {"p1": files},
                "fileBiomaterialMap": {"cs1": files},
                "fileProcessMap": {"a1": files},
                "fileFilesMap": file_map
            }),
        )
        .with_record("projects", project_record("p1"))
        .with_record("biomaterials", biomaterial_record("cs1", "cell_suspension", "cells_1", 9606))
        .with_record("processes", process_record("a1", "assay_1"))
        .with_relation("a1", "inputBiomaterials", &["cs1"]);
    for (file, lane) in files.iter().zip(lanes) {
        source = source
            .with_record("files", sequence_file_record(file, &format!("{file}.fastq.gz"), "read1", *lane))
            .with_relation(file, "derivedByProcesses", &["a1"]);
    }
    source
}

#[tokio::test]
async fn single_lane_keeps_plain_alias() {
    let source = lane_source(&[3, 3]);
    let aggregation = ManifestAggregator::new(&source, "").aggregate("m").await.unwrap();

    assert_eq!(
        ids(aggregation.entities.entities_of(EntityType::SequencingRun)),
        vec!["sequencingRun_a1"]
    );
}

#[tokio::test]
async fn experiment_without_protocols_is_still_aggregated() {
    let source = lane_source(&[1]);
    let aggregation = ManifestAggregator::new(&source, "").aggregate("m").await.unwrap();

    let experiment = aggregation
        .entities
        .get(EntityType::SequencingExperiment, "sequencingExperiment_a1")
        .unwrap();
    assert!(experiment.source("sequencing_protocol").is_none());
}

#[tokio::test]
async fn orphan_samples_come_last_in_manifest_order() {
    let source = FakeMetadataSource::new()
        .with_manifest("m", json!({"fileBiomaterialMap": {"o1": [], "b1": [], "o2": [], "d1": []}}))
        .with_record("biomaterials", biomaterial_record("o1", "donor_organism", "orphan_1", 9606))
        .with_record("biomaterials", biomaterial_record("o2", "donor_organism", "orphan_2", 9606))
        .with_record("biomaterials", biomaterial_record("b1", "specimen_from_organism", "liver_1", 9606))
        .with_record("biomaterials", biomaterial_record("d1", "donor_organism", "donor_1", 9606))
        .with_record("processes", process_record("c1", "collection_1"))
        .with_relation("b1", "derivedByProcesses", &["c1"])
        .with_relation("c1", "inputBiomaterials", &["d1"]);

    let aggregation = ManifestAggregator::new(&source, "").aggregate("m").await.unwrap();
    assert_eq!(
        ids(aggregation.entities.entities_of(EntityType::Sample)),
        vec!["sample_d1", "sample_b1", "sample_o1", "sample_o2"]
    );
}

#[tokio::test]
async fn parents_outside_the_manifest_are_ignored() {
    let source = FakeMetadataSource::new()
        .with_manifest("m", json!({"fileBiomaterialMap": {"b1": []}}))
        .with_record("biomaterials", biomaterial_record("b1", "specimen_from_organism", "liver_1", 9606))
        .with_record("biomaterials", biomaterial_record("d1", "donor_organism", "donor_1", 9606))
        .with_record("processes", process_record("c1", "collection_1"))
        .with_relation("b1", "derivedByProcesses", &["c1"])
        .with_relation("c1", "inputBiomaterials", &["d1"]);

    let aggregation = ManifestAggregator::new(&source, "").aggregate("m").await.unwrap();
    let tissue = aggregation.entities.get(EntityType::Sample, "sample_b1").unwrap();
    assert!(tissue.linked(SAMPLE_RELATIONSHIPS).is_empty());
    assert_eq!(aggregation.entities.len(), 1);
}

#[tokio::test]
async fn cyclic_derivation_fails_fast() {
    let source = FakeMetadataSource::new()
        .with_manifest("m", json!({"fileBiomaterialMap": {"x": [], "y": []}}))
        .with_record("biomaterials", biomaterial_record("x", "specimen_from_organism", "x", 9606))
        .with_record("biomaterials", biomaterial_record("y", "specimen_from_organism", "y", 9606))
        .with_record("processes", process_record("px", "px"))
        .with_record("processes", process_record("py", "py"))
        .with_relation("x", "derivedByProcesses", &["px"])
        .with_relation("px", "inputBiomaterials", &["y"])
        .with_relation("y", "derivedByProcesses", &["py"])
        .with_relation("py", "inputBiomaterials", &["x"]);

    let err = ManifestAggregator::new(&source, "").aggregate("m").await.unwrap_err();
    assert!(err.is_fail_fast());
    match err {
        ArchiverError::Graph(graph) => {
            assert_eq!(graph.cycle(), ["sample_y", "sample_x", "sample_y"].map(String::from));
        }
        other => panic!("expected a graph error, got {other}"),
    }
}

#[tokio::test]
async fn unknown_manifest_is_a_client_error() {
    let source = FakeMetadataSource::new();
    let err = ManifestAggregator::new(&source, "").aggregate("nope").await.unwrap_err();
    assert!(matches!(err, ArchiverError::Client(_)));
    assert!(!err.is_fail_fast());
}

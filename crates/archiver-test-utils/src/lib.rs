//! Testing utilities for the archiver workspace
//!
//! In-memory archive, metadata source and taxonomy service, plus a
//! single-cell manifest fixture.

#![allow(missing_docs)]

use archiver_core::client::{record_self_link, record_uuid};
use archiver_core::{
    ArchiveClient, ClientError, ClientResult, MetadataSource, ProcessingResult, ProcessingStatus, RemoteRecord,
    SubmissionContents, SubmissionHandle, SubmissionStatus, TaxonomyService, ValidationResult,
};
use archiver_entity::EntityType;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};

/// Pop the next scripted response; the last one repeats
fn next_sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[derive(Default)]
struct ArchiveState {
    validation: VecDeque<ClientResult<Vec<ValidationResult>>>,
    statuses: VecDeque<SubmissionStatus>,
    processing: VecDeque<Vec<ProcessingResult>>,
    details: HashMap<String, Value>,
    rejected: HashSet<String>,
    fail_contents: bool,
    created: Vec<(String, Value)>,
    status_updates: Vec<String>,
    deleted: Vec<String>,
    calls: Vec<&'static str>,
}

/// Scripted archive
///
/// Without a script, validation completes at once, `Submitted` is available
/// and every attached item is processed with accession `{prefix}{n}`.
pub struct FakeArchive {
    name: String,
    accession_prefix: String,
    state: Mutex<ArchiveState>,
}

impl FakeArchive {
    pub fn new(name: impl Into<String>, accession_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accession_prefix: accession_prefix.into(),
            state: Mutex::new(ArchiveState::default()),
        }
    }

    /// Queue a validation response
    pub fn with_validation(self, results: Vec<ValidationResult>) -> Self {
        self.state.lock().validation.push_back(Ok(results));
        self
    }

    /// Queue a failing validation call
    pub fn with_validation_error(self, error: ClientError) -> Self {
        self.state.lock().validation.push_back(Err(error));
        self
    }

    /// Queue a status response
    pub fn with_status(self, available: &[&str]) -> Self {
        self.state.lock().statuses.push_back(SubmissionStatus {
            status: Some("Draft".into()),
            available_transitions: available.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Queue a processing response
    pub fn with_processing(self, results: Vec<ProcessingResult>) -> Self {
        self.state.lock().processing.push_back(results);
        self
    }

    /// Validation detail served for a detail URL
    pub fn with_detail(self, url: impl Into<String>, detail: Value) -> Self {
        self.state.lock().details.insert(url.into(), detail);
        self
    }

    /// Refuse to create the entity with this alias
    pub fn rejecting(self, alias: impl Into<String>) -> Self {
        self.state.lock().rejected.insert(alias.into());
        self
    }

    /// Fail `get_contents`
    pub fn failing_contents(self) -> Self {
        self.state.lock().fail_contents = true;
        self
    }

    pub fn submission_url(&self) -> String {
        format!("https://{}/submissions/1", self.name)
    }

    /// Payloads created, in order
    pub fn created_payloads(&self) -> Vec<Value> {
        self.state.lock().created.iter().map(|(_, p)| p.clone()).collect()
    }

    /// Aliases created, in order
    pub fn created_aliases(&self) -> Vec<String> {
        self.state
            .lock()
            .created
            .iter()
            .filter_map(|(_, p)| p.get("alias").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn status_updates(&self) -> Vec<String> {
        self.state.lock().status_updates.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    /// Number of calls to one method
    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == method).count()
    }

    fn record(&self, method: &'static str) {
        self.state.lock().calls.push(method);
    }

    fn default_processing(&self, created: &[(String, Value)]) -> Vec<ProcessingResult> {
        created
            .iter()
            .enumerate()
            .map(|(i, (url, payload))| ProcessingResult {
                alias: payload["alias"].as_str().unwrap_or_default().to_string(),
                status: ProcessingStatus::Completed,
                accession: Some(format!("{}{}", self.accession_prefix, i + 1)),
                submittable_type: url.rsplit('/').next().map(str::to_string),
                errors: Vec::new(),
            })
            .collect()
    }
}

#[async_trait]
impl ArchiveClient for FakeArchive {
    fn archive_name(&self) -> &str {
        &self.name
    }

    async fn create_submission(&self) -> ClientResult<SubmissionHandle> {
        self.record("create_submission");
        Ok(SubmissionHandle {
            url: self.submission_url(),
            id: Some("1".into()),
        })
    }

    async fn get_contents(&self, handle: &SubmissionHandle) -> ClientResult<SubmissionContents> {
        self.record("get_contents");
        if self.state.lock().fail_contents {
            return Err(ClientError::status(self.name.clone(), 500, "contents unavailable"));
        }
        let create_urls = EntityType::ALL
            .into_iter()
            .map(|t| (t, format!("{}/{}", handle.url, t.submittable_type())))
            .collect();
        Ok(SubmissionContents { create_urls })
    }

    async fn create_entity(&self, create_url: &str, payload: &Value) -> ClientResult<RemoteRecord> {
        self.record("create_entity");
        let alias = payload.get("alias").and_then(Value::as_str).unwrap_or_default().to_string();
        let mut state = self.state.lock();
        if state.rejected.contains(&alias) {
            return Err(ClientError::status(self.name.clone(), 422, format!("{alias} rejected")));
        }
        state.created.push((create_url.to_string(), payload.clone()));
        let id = state.created.len().to_string();
        Ok(RemoteRecord {
            url: format!("{create_url}/{id}"),
            id: Some(id),
            body: payload.clone(),
        })
    }

    async fn get_validation_results(&self, handle: &SubmissionHandle) -> ClientResult<Vec<ValidationResult>> {
        self.record("get_validation_results");
        let mut state = self.state.lock();
        match next_sticky(&mut state.validation) {
            Some(scripted) => scripted,
            None => Ok(state
                .created
                .iter()
                .enumerate()
                .map(|(i, _)| ValidationResult::new("Complete").with_detail_url(format!("{}/validation/{i}", handle.url)))
                .collect()),
        }
    }

    async fn get_validation_detail(&self, detail_url: &str) -> ClientResult<Option<Value>> {
        self.record("get_validation_detail");
        Ok(self.state.lock().details.get(detail_url).cloned())
    }

    async fn get_submission_status(&self, _handle: &SubmissionHandle) -> ClientResult<SubmissionStatus> {
        self.record("get_submission_status");
        let mut state = self.state.lock();
        Ok(next_sticky(&mut state.statuses).unwrap_or_else(|| SubmissionStatus {
            status: Some("Draft".into()),
            available_transitions: vec!["Submitted".into()],
        }))
    }

    async fn update_submission_status(&self, _handle: &SubmissionHandle, new_status: &str) -> ClientResult<()> {
        self.record("update_submission_status");
        self.state.lock().status_updates.push(new_status.to_string());
        Ok(())
    }

    async fn get_processing_results(&self, _handle: &SubmissionHandle) -> ClientResult<Vec<ProcessingResult>> {
        self.record("get_processing_results");
        let mut state = self.state.lock();
        match next_sticky(&mut state.processing) {
            Some(scripted) => Ok(scripted),
            None => Ok(self.default_processing(&state.created)),
        }
    }

    async fn delete_submission(&self, handle: &SubmissionHandle) -> ClientResult<()> {
        self.record("delete_submission");
        self.state.lock().deleted.push(handle.url.clone());
        Ok(())
    }
}

/// Processing result helper
pub fn processed(alias: &str, status: ProcessingStatus, accession: Option<&str>) -> ProcessingResult {
    ProcessingResult {
        alias: alias.to_string(),
        status,
        accession: accession.map(str::to_string),
        submittable_type: Some("samples".into()),
        errors: Vec::new(),
    }
}

/// Patch applied through [`FakeMetadataSource`]
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPatch {
    pub collection: String,
    pub id: String,
    pub patch: Value,
}

#[derive(Default)]
struct SourceState {
    manifests: HashMap<String, Value>,
    records: HashMap<String, (String, Value)>,
    relations: HashMap<(String, String), Vec<String>>,
    failing_patch_ids: HashSet<String>,
    patches: Vec<AppliedPatch>,
    archived: Vec<String>,
    calls: HashMap<&'static str, usize>,
}

/// In-memory metadata store
///
/// Records are keyed by UUID; relations map `(uuid, relation)` to related UUIDs.
#[derive(Default)]
pub struct FakeMetadataSource {
    state: Mutex<SourceState>,
}

impl FakeMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manifest(self, id: impl Into<String>, manifest: Value) -> Self {
        self.state.lock().manifests.insert(id.into(), manifest);
        self
    }

    /// Add a record to a collection; the record must carry `uuid.uuid`
    pub fn with_record(self, collection: &str, record: Value) -> Self {
        let uuid = record_uuid(&record).expect("fixture record without uuid").to_string();
        self.state.lock().records.insert(uuid, (collection.to_string(), record));
        self
    }

    pub fn with_relation(self, from: &str, relation: &str, to: &[&str]) -> Self {
        self.state.lock().relations.insert(
            (from.to_string(), relation.to_string()),
            to.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Fail patches of the record with this id
    pub fn failing_patch(self, id: impl Into<String>) -> Self {
        self.state.lock().failing_patch_ids.insert(id.into());
        self
    }

    pub fn patches(&self) -> Vec<AppliedPatch> {
        self.state.lock().patches.clone()
    }

    pub fn archived(&self) -> Vec<String> {
        self.state.lock().archived.clone()
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    fn record(&self, method: &'static str) {
        *self.state.lock().calls.entry(method).or_default() += 1;
    }
}

#[async_trait]
impl MetadataSource for FakeMetadataSource {
    async fn get_manifest(&self, manifest_id: &str) -> ClientResult<Value> {
        self.record("get_manifest");
        self.state
            .lock()
            .manifests
            .get(manifest_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("manifest {manifest_id}")))
    }

    async fn get_related_entities(&self, entity: &Value, relation: &str, _entity_type: &str) -> ClientResult<Vec<Value>> {
        self.record("get_related_entities");
        let Some(uuid) = record_uuid(entity) else {
            return Ok(Vec::new());
        };
        let state = self.state.lock();
        let related = state
            .relations
            .get(&(uuid.to_string(), relation.to_string()))
            .map(|uuids| {
                uuids
                    .iter()
                    .filter_map(|u| state.records.get(u).map(|(_, r)| r.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(related)
    }

    async fn patch_entity_by_id(&self, entity_type: &str, id: &str, patch: &Value) -> ClientResult<Value> {
        self.record("patch_entity_by_id");
        let mut state = self.state.lock();
        if state.failing_patch_ids.contains(id) {
            return Err(ClientError::status("ingest", 409, format!("cannot patch {id}")));
        }
        let record = state
            .records
            .values()
            .find(|(collection, record)| {
                collection == entity_type
                    && record_self_link(record).is_some_and(|href| href.trim_end_matches('/').ends_with(&format!("/{id}")))
            })
            .map(|(_, record)| record.clone())
            .ok_or_else(|| ClientError::NotFound(format!("{entity_type}/{id}")))?;
        state.patches.push(AppliedPatch {
            collection: entity_type.to_string(),
            id: id.to_string(),
            patch: patch.clone(),
        });
        Ok(record)
    }

    async fn get_entity_by_uuid(&self, entity_type: &str, uuid: &str) -> ClientResult<Value> {
        self.record("get_entity_by_uuid");
        match self.state.lock().records.get(uuid) {
            Some((collection, record)) if collection == entity_type => Ok(record.clone()),
            _ => Err(ClientError::NotFound(format!("{entity_type} {uuid}"))),
        }
    }

    async fn get_entity_by_url(&self, url: &str) -> ClientResult<Value> {
        self.record("get_entity_by_url");
        self.state
            .lock()
            .records
            .values()
            .find(|(_, record)| record_self_link(record) == Some(url))
            .map(|(_, record)| record.clone())
            .ok_or_else(|| ClientError::NotFound(url.to_string()))
    }

    async fn mark_submission_archived(&self, submission_uuid: &str) -> ClientResult<()> {
        self.record("mark_submission_archived");
        self.state.lock().archived.push(submission_uuid.to_string());
        Ok(())
    }
}

/// Knows human and mouse
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeTaxonomy;

#[async_trait]
impl TaxonomyService for FakeTaxonomy {
    async fn scientific_name(&self, taxon_id: u64) -> ClientResult<Option<String>> {
        Ok(match taxon_id {
            9606 => Some("Homo sapiens".into()),
            10090 => Some("Mus musculus".into()),
            _ => None,
        })
    }
}

pub const MANIFEST_ID: &str = "manifest-1";
pub const ENVELOPE_UUID: &str = "env-1";

const SCHEMA_BASE: &str = "https://schema.example.org/type";

fn described_by(kind: &str, schema: &str) -> String {
    format!("{SCHEMA_BASE}/{kind}/1.0.0/{schema}")
}

fn links(collection: &str, uuid: &str) -> Value {
    let self_href = format!("https://ingest.example.org/{collection}/id-{uuid}");
    json!({
        "self": {"href": self_href},
        "derivedByProcesses": {"href": format!("{self_href}/derivedByProcesses")},
        "inputBiomaterials": {"href": format!("{self_href}/inputBiomaterials")},
        "protocols": {"href": format!("{self_href}/protocols")}
    })
}

pub fn project_record(uuid: &str) -> Value {
    json!({
        "uuid": {"uuid": uuid},
        "content": {
            "describedBy": described_by("project", "project"),
            "project_core": {
                "project_short_name": "liver_atlas",
                "project_title": "Healthy human liver atlas",
                "project_description": "Single cell profiling of healthy liver"
            },
            "contributors": [
                {"name": "Jane,,Doe", "email": "jane@example.org", "institution": "Example Institute",
                 "project_role": {"text": "principal investigator"}}
            ]
        },
        "releaseDate": "2019-05-01T10:20:30.000Z",
        "_links": links("projects", uuid)
    })
}

pub fn biomaterial_record(uuid: &str, schema: &str, biomaterial_id: &str, taxon: u64) -> Value {
    json!({
        "uuid": {"uuid": uuid},
        "content": {
            "describedBy": described_by("biomaterial", schema),
            "biomaterial_core": {"biomaterial_id": biomaterial_id, "ncbi_taxon_id": [taxon]}
        },
        "_links": links("biomaterials", uuid)
    })
}

pub fn process_record(uuid: &str, process_id: &str) -> Value {
    json!({
        "uuid": {"uuid": uuid},
        "content": {
            "describedBy": described_by("process", "process"),
            "process_core": {"process_id": process_id}
        },
        "_links": links("processes", uuid)
    })
}

pub fn sequence_file_record(uuid: &str, file_name: &str, read_index: &str, lane: u32) -> Value {
    json!({
        "uuid": {"uuid": uuid},
        "content": {
            "describedBy": described_by("file", "sequence_file"),
            "file_core": {"file_name": file_name, "format": "fastq.gz"},
            "read_index": read_index,
            "lane_index": lane
        },
        "checksums": {"md5": format!("md5-{uuid}")},
        "_links": links("files", uuid)
    })
}

/// Single-cell manifest `manifest-1`
///
/// - project `p1`
/// - donor `d1` → specimen `b1` → cell suspension `cs1`, listed child first
/// - assay `a1` sequencing `cs1` with library prep `lib1` and sequencing `seq1`
/// - files `f1`..`f4`, two per lane over lanes 1 and 2
pub fn single_cell_source() -> FakeMetadataSource {
    let files = ["f1", "f2", "f3", "f4"];
    let file_list = json!(files);

    FakeMetadataSource::new()
        .with_manifest(
            MANIFEST_ID,
            json!({
                "envelopeUuid": ENVELOPE_UUID,
                "fileProjectMap": {"p1": file_list},
                "fileBiomaterialMap": {"cs1": file_list, "b1": file_list, "d1": file_list},
                "fileProcessMap": {"a1": file_list, "c2": file_list, "c1": file_list},
                "fileProtocolMap": {"lib1": file_list, "seq1": file_list},
                "fileFilesMap": {"f1": ["f1"], "f2": ["f2"], "f3": ["f3"], "f4": ["f4"]}
            }),
        )
        .with_record("projects", project_record("p1"))
        .with_record("biomaterials", biomaterial_record("d1", "donor_organism", "donor_1", 9606))
        .with_record("biomaterials", biomaterial_record("b1", "specimen_from_organism", "liver_1", 9606))
        .with_record("biomaterials", biomaterial_record("cs1", "cell_suspension", "cells_1", 9606))
        .with_record("processes", process_record("c1", "collection_1"))
        .with_record("processes", process_record("c2", "dissociation_1"))
        .with_record("processes", process_record("a1", "assay_1"))
        .with_record(
            "protocols",
            json!({
                "uuid": {"uuid": "lib1"},
                "content": {
                    "describedBy": described_by("protocol", "library_preparation_protocol"),
                    "nucleic_acid_source": "single cell",
                    "library_construction_method": {"text": "10X v2", "ontology": "EFO:0009310", "ontology_label": "10X 3' v2 sequencing"}
                },
                "_links": links("protocols", "lib1")
            }),
        )
        .with_record(
            "protocols",
            json!({
                "uuid": {"uuid": "seq1"},
                "content": {
                    "describedBy": described_by("protocol", "sequencing_protocol"),
                    "paired_end": true,
                    "instrument_manufacturer_model": {"text": "HiSeq 4000", "ontology": "EFO:0008563", "ontology_label": "Illumina HiSeq 4000"}
                },
                "_links": links("protocols", "seq1")
            }),
        )
        .with_record("files", sequence_file_record("f1", "r1_L1.fastq.gz", "read1", 1))
        .with_record("files", sequence_file_record("f2", "r2_L1.fastq.gz", "read2", 1))
        .with_record("files", sequence_file_record("f3", "r1_L2.fastq.gz", "read1", 2))
        .with_record("files", sequence_file_record("f4", "r2_L2.fastq.gz", "read2", 2))
        .with_relation("b1", "derivedByProcesses", &["c1"])
        .with_relation("c1", "inputBiomaterials", &["d1"])
        .with_relation("cs1", "derivedByProcesses", &["c2"])
        .with_relation("c2", "inputBiomaterials", &["b1"])
        .with_relation("a1", "inputBiomaterials", &["cs1"])
        .with_relation("a1", "protocols", &["lib1", "seq1"])
        .with_relation("f1", "derivedByProcesses", &["a1"])
        .with_relation("f2", "derivedByProcesses", &["a1"])
        .with_relation("f3", "derivedByProcesses", &["a1"])
        .with_relation("f4", "derivedByProcesses", &["a1"])
}

//! Entity converters
//!
//! One converter per [`EntityType`]. Each owns a compiled mapping
//! specification (the field table) and adds whatever the table cannot
//! express: alias references, constants, taxonomy lookups.
//!
//! - [`ConverterSet`] dispatches by type and records failures on the entity
//! - [`archive_registry`] extends the built-in mapping functions with the
//!   archive-specific ones the tables reference

mod experiment;
mod project;
mod run;
mod sample;
mod study;

pub use experiment::{SequencingExperimentConverter, SAMPLE_USES, STUDY_REF};
pub use project::ProjectConverter;
pub use run::{SequencingRunConverter, ASSAY_REFS};
pub use sample::{SampleConverter, SAMPLE_RELATIONSHIPS};
pub use study::{StudyConverter, PROJECT_REF};

use crate::client::TaxonomyService;
use crate::error::{ArchiverError, ArchiverResult, ConversionError, ConversionResult};
use archiver_entity::{ArchiveEntity, EntityMap, EntityType};
use archiver_mapping::path::set_path;
use archiver_mapping::{CompiledSpec, FunctionRegistry, JsonMapper, MappingError, MappingResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Error code recorded on entities whose conversion failed
pub const CONVERSION_FAILED: &str = "conversion_failed";

/// Converts one entity type into its archive payload
#[async_trait]
pub trait Converter: Send + Sync {
    /// Type this converter handles
    fn entity_type(&self) -> EntityType;

    /// Build the payload for an entity
    async fn convert(&self, entity: &ArchiveEntity) -> ConversionResult<Map<String, Value>>;
}

/// Converters by entity type
#[derive(Clone, Default)]
pub struct ConverterSet {
    converters: HashMap<EntityType, Arc<dyn Converter>>,
}

impl ConverterSet {
    /// Converters for every entity type
    ///
    /// # Errors
    /// A field table that does not compile (unknown function, malformed table)
    pub fn new(taxonomy: Arc<dyn TaxonomyService>) -> MappingResult<Self> {
        let mapper = Arc::new(JsonMapper::new(Arc::new(archive_registry())));

        let mut set = Self::empty();
        set.register(Arc::new(ProjectConverter::new(Arc::clone(&mapper))?));
        set.register(Arc::new(StudyConverter::new(Arc::clone(&mapper))?));
        set.register(Arc::new(SampleConverter::new(Arc::clone(&mapper), taxonomy)?));
        set.register(Arc::new(SequencingExperimentConverter::new(Arc::clone(&mapper))?));
        set.register(Arc::new(SequencingRunConverter::new(mapper)?));
        Ok(set)
    }

    /// Set without converters
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a converter, replacing the one for the same type
    pub fn register(&mut self, converter: Arc<dyn Converter>) {
        self.converters.insert(converter.entity_type(), converter);
    }

    /// Converter for a type
    #[must_use]
    pub fn get(&self, entity_type: EntityType) -> Option<&Arc<dyn Converter>> {
        self.converters.get(&entity_type)
    }

    /// Convert one entity
    ///
    /// # Errors
    /// `ConversionError::NoConverter` if no converter handles the type,
    /// otherwise whatever the converter reports
    pub async fn convert(&self, entity: &ArchiveEntity) -> ConversionResult<Map<String, Value>> {
        let converter = self
            .get(entity.entity_type)
            .ok_or(ConversionError::NoConverter(entity.entity_type))?;
        converter.convert(entity).await
    }

    /// Convert every entity that has no payload and no errors yet
    ///
    /// Data failures are recorded on the entity as `conversion_failed`;
    /// returns the number of entities converted.
    ///
    /// # Errors
    /// A field table defect (`ArchiverError::Mapping` with a specification
    /// defect, such as an `$on` anchor that does not resolve). Such a defect
    /// would fail every entity of the type, so the run stops instead.
    pub async fn convert_all(&self, entities: &mut EntityMap) -> ArchiverResult<usize> {
        let mut converted = 0;

        for entity in entities.iter_mut() {
            if !entity.conversion.is_empty() || !entity.errors.is_empty() {
                continue;
            }
            match self.convert(entity).await {
                Ok(payload) if payload.is_empty() => {
                    entity.add_error(CONVERSION_FAILED, "conversion produced an empty payload", None);
                }
                Ok(payload) => {
                    entity.conversion = payload;
                    converted += 1;
                }
                Err(ConversionError::Mapping(e)) if e.is_specification_defect() => {
                    tracing::error!(alias = %entity.id, entity_type = %entity.entity_type, "field table defect: {}", e);
                    return Err(ArchiverError::Mapping(e));
                }
                Err(e) => {
                    tracing::warn!(alias = %entity.id, entity_type = %entity.entity_type, "conversion failed: {}", e);
                    entity.add_error(CONVERSION_FAILED, e.to_string(), None);
                }
            }
        }

        tracing::debug!("Converted {} entities", converted);
        Ok(converted)
    }
}

impl std::fmt::Debug for ConverterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.converters.keys().collect();
        types.sort();
        f.debug_struct("ConverterSet").field("types", &types).finish()
    }
}

/// Built-in mapping functions plus the archive-specific ones
#[must_use]
pub fn archive_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::with_defaults();
    registry.register("name_part", name_part);
    registry.register("date_only", date_only);
    registry.register("concept_attribute", concept_attribute);
    registry
}

/// A compiled field table bound to its mapper
#[derive(Debug)]
pub(crate) struct FieldTable {
    mapper: Arc<JsonMapper>,
    spec: CompiledSpec,
}

impl FieldTable {
    pub(crate) fn new(mapper: Arc<JsonMapper>, table: &Value) -> MappingResult<Self> {
        let spec = mapper.compile(table)?;
        Ok(Self { mapper, spec })
    }

    /// Map the entity's source fragments and stamp the alias
    pub(crate) fn apply(&self, entity: &ArchiveEntity) -> ConversionResult<Map<String, Value>> {
        self.apply_to(entity, &Value::Object(entity.source_data.clone()))
    }

    pub(crate) fn apply_to(&self, entity: &ArchiveEntity, source: &Value) -> ConversionResult<Map<String, Value>> {
        match self.mapper.map(source, &self.spec)? {
            Value::Object(mut payload) => {
                payload.insert("alias".into(), Value::String(entity.id.clone()));
                Ok(payload)
            }
            other => Err(ConversionError::NotAnObject(archiver_mapping::path::kind_of(&other))),
        }
    }
}

/// Source fragment that must be present
pub(crate) fn require_source<'a>(entity: &'a ArchiveEntity, name: &str) -> ConversionResult<&'a Value> {
    entity
        .source(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ConversionError::MissingSource(name.to_string()))
}

/// `[{"alias": a}, ...]` for the aliases linked under `relation`
pub(crate) fn alias_refs(entity: &ArchiveEntity, relation: &str) -> Vec<Value> {
    entity
        .linked(relation)
        .iter()
        .map(|alias| json!({ "alias": alias }))
        .collect()
}

/// Set a single-valued attribute
pub(crate) fn set_attribute(payload: &mut Map<String, Value>, name: &str, value: impl Into<Value>) {
    let attributes = payload
        .entry("attributes")
        .or_insert_with(|| Value::Object(Map::new()));
    if !attributes.is_object() {
        *attributes = Value::Object(Map::new());
    }
    if let Value::Object(map) = attributes {
        map.insert(name.to_string(), json!([{ "value": value.into() }]));
    }
}

/// Ensure each listed path holds an array, so `$on` anchors always resolve
pub(crate) fn with_default_arrays(fragment: &Value, paths: &[&str]) -> Value {
    let missing: Vec<&str> = paths
        .iter()
        .copied()
        .filter(|path| archiver_mapping::path::get_path(fragment, path).is_none())
        .collect();

    let mut fragment = fragment.clone();
    if let Value::Object(map) = &mut fragment {
        for path in missing {
            set_path(map, path, Value::Array(Vec::new()));
        }
    }
    fragment
}

/// Contributor names are stored as `first,middle,last`
fn name_part(value: Option<&Value>, args: &[Value]) -> MappingResult<Option<Value>> {
    let Some(name) = value.and_then(Value::as_str) else {
        return Ok(None);
    };
    let part = args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| MappingError::function_failed("name_part", "expected first, middle or last"))?;

    let pieces: Vec<String> = if name.contains(',') {
        name.split(',').map(|s| s.trim().to_string()).collect()
    } else {
        let words: Vec<&str> = name.split_whitespace().collect();
        match words.split_first() {
            None => Vec::new(),
            Some((only, [])) => vec![(*only).to_string()],
            Some((first, rest)) => vec![(*first).to_string(), String::new(), rest.join(" ")],
        }
    };

    let selected = match part {
        "first" => pieces.first(),
        "middle" if pieces.len() > 2 => pieces.get(1),
        "middle" => None,
        "last" if pieces.len() > 1 => pieces.last(),
        "last" => None,
        other => {
            return Err(MappingError::function_failed(
                "name_part",
                format!("unknown name part {other}"),
            ))
        }
    };
    Ok(selected.filter(|s| !s.is_empty()).map(|s| Value::String(s.clone())))
}

/// Timestamp or date string reduced to `YYYY-MM-DD`
fn date_only(value: Option<&Value>, _args: &[Value]) -> MappingResult<Option<Value>> {
    let Some(text) = value.and_then(Value::as_str) else {
        return Ok(None);
    };
    if let Ok(timestamp) = chrono::DateTime::parse_from_rfc3339(text) {
        return Ok(Some(Value::String(timestamp.date_naive().to_string())));
    }
    text.get(..10)
        .and_then(|head| chrono::NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        .map(|date| Some(Value::String(date.to_string())))
        .ok_or_else(|| MappingError::function_failed("date_only", format!("not a date: {text}")))
}

/// Ontology term as an attribute, with the term URL when the term is curated
fn concept_attribute(value: Option<&Value>, _args: &[Value]) -> MappingResult<Option<Value>> {
    let Some(term) = value.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let attribute = match term {
        Value::Object(fields) => {
            let Some(label) = fields
                .get("ontology_label")
                .or_else(|| fields.get("text"))
                .filter(|v| !v.is_null())
            else {
                return Ok(None);
            };
            match fields.get("ontology").and_then(Value::as_str) {
                Some(curie) => json!({
                    "value": label,
                    "terms": [{ "url": format!("http://purl.obolibrary.org/obo/{}", curie.replace(':', "_")) }]
                }),
                None => json!({ "value": label }),
            }
        }
        other => json!({ "value": other }),
    };
    Ok(Some(Value::Array(vec![attribute])))
}

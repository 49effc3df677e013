//! Mapping interpreter
//!
//! Applies a [`CompiledSpec`] to a source record:
//!
//! 1. Anchor on `$on` (an object maps once, an array of objects maps per element)
//! 2. Drop anchored elements rejected by `$filter`
//! 3. For each field rule, resolve the source path and run the bound function
//! 4. Write the result at the (possibly dotted) output path
//!
//! Paths that do not resolve are omitted from the output; they never fail.

use crate::error::{MappingError, MappingResult};
use crate::path::{get_path, kind_of, set_path};
use crate::registry::FunctionRegistry;
use crate::spec::{CompiledSpec, Filter, Rule};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Mapping engine bound to a function registry
#[derive(Debug, Clone)]
pub struct JsonMapper {
    registry: Arc<FunctionRegistry>,
}

impl JsonMapper {
    /// Create mapper over a registry
    #[inline]
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    /// Create mapper over the built-in functions
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(FunctionRegistry::with_defaults()))
    }

    /// Function registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Compile a specification against this mapper's registry
    ///
    /// # Errors
    /// `UnreadableSpecification` / `UnknownFunction`, see [`CompiledSpec::compile`]
    pub fn compile(&self, spec: &Value) -> MappingResult<CompiledSpec> {
        CompiledSpec::compile(spec, &self.registry)
    }

    /// Map a source record with a compiled specification
    ///
    /// Returns an object, or an array of objects when the top-level `$on`
    /// anchors onto an array.
    ///
    /// # Errors
    /// `InvalidNode` when an anchor is missing or not an object/array of objects;
    /// `FunctionFailed` when a function rejects its input.
    pub fn map(&self, source: &Value, spec: &CompiledSpec) -> MappingResult<Value> {
        Ok(self
            .apply(source, spec)?
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Compile and map in one call
    ///
    /// # Errors
    /// Any error of [`JsonMapper::compile`] or [`JsonMapper::map`]
    pub fn map_json(&self, source: &Value, spec: &Value) -> MappingResult<Value> {
        let compiled = self.compile(spec)?;
        self.map(source, &compiled)
    }

    /// `None` means a single anchored object was filtered out
    fn apply(&self, node: &Value, spec: &CompiledSpec) -> MappingResult<Option<Value>> {
        let target = match spec.anchor.as_deref() {
            Some(path) => get_path(node, path)
                .ok_or_else(|| MappingError::invalid_node(path, "path does not exist"))?,
            None => node,
        };
        let anchor = spec.anchor.as_deref().unwrap_or("");

        match target {
            Value::Object(_) => {
                if !self.passes(target, spec.filter.as_ref())? {
                    return Ok(None);
                }
                self.build(target, spec).map(Some)
            }
            Value::Array(items) => {
                let mut mapped = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    if !item.is_object() {
                        return Err(MappingError::invalid_node(
                            anchor,
                            format!("element {index} is {}, expected an object", kind_of(item)),
                        ));
                    }
                    if self.passes(item, spec.filter.as_ref())? {
                        mapped.push(self.build(item, spec)?);
                    }
                }
                Ok(Some(Value::Array(mapped)))
            }
            other => Err(MappingError::invalid_node(
                anchor,
                format!("found {}, expected an object or an array of objects", kind_of(other)),
            )),
        }
    }

    fn passes(&self, node: &Value, filter: Option<&Filter>) -> MappingResult<bool> {
        let Some(filter) = filter else {
            return Ok(true);
        };
        Ok(match filter.predicate.call(get_path(node, &filter.source))? {
            Some(Value::Bool(keep)) => keep,
            Some(Value::Null) | None => false,
            Some(_) => true,
        })
    }

    fn build(&self, node: &Value, spec: &CompiledSpec) -> MappingResult<Value> {
        let mut out = Map::new();
        for (target, rule) in &spec.fields {
            let value = match rule {
                Rule::Path { source, function } => {
                    let raw = get_path(node, source).filter(|v| spec.allow_null || !v.is_null());
                    let value = match function {
                        Some(function) => function.call(raw)?,
                        None => raw.cloned(),
                    };
                    value.filter(|v| spec.allow_null || !v.is_null())
                }
                Rule::Nested(inner) => self.apply(node, inner)?,
            };
            if let Some(value) = value {
                set_path(&mut out, target, value);
            }
        }
        Ok(Value::Object(out))
    }
}

impl Default for JsonMapper {
    fn default() -> Self {
        Self::with_defaults()
    }
}

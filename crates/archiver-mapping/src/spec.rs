//! Compiled mapping specifications
//!
//! A specification is a JSON object whose entries are one of:
//!
//! ```text
//! "out.field": ["source.path"]                          copy
//! "out.field": ["source.path", "function", arg, ...]    copy through a function
//! "out.field": { ... }                                   nested specification
//! "$on": "source.path"                                   anchor onto a nested node
//! "$filter": ["source.path", "predicate", arg, ...]      drop anchored elements
//! "$allow_null": true                                    keep explicit nulls
//! ```
//!
//! Entries starting with `$` are directives; unknown directives are ignored.

use crate::error::{MappingError, MappingResult};
use crate::path::kind_of;
use crate::registry::{FunctionRegistry, MappingFn};
use serde_json::{Map, Value};
use std::fmt;

/// Marker prefix of directive entries
pub const DIRECTIVE_MARKER: char = '$';
/// Anchor directive
pub const ON: &str = "$on";
/// Element filter directive
pub const FILTER: &str = "$filter";
/// Null retention directive
pub const ALLOW_NULL: &str = "$allow_null";

/// A function reference bound to its literal arguments
#[derive(Clone)]
pub(crate) struct BoundFunction {
    pub(crate) name: String,
    pub(crate) function: MappingFn,
    pub(crate) args: Vec<Value>,
}

impl BoundFunction {
    pub(crate) fn call(&self, value: Option<&Value>) -> MappingResult<Option<Value>> {
        (self.function)(value, &self.args)
    }
}

impl fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFunction")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// `$filter` directive
#[derive(Debug, Clone)]
pub(crate) struct Filter {
    pub(crate) source: String,
    pub(crate) predicate: BoundFunction,
}

/// Output field rule
#[derive(Debug, Clone)]
pub(crate) enum Rule {
    /// Resolve a source path, optionally through a function
    Path {
        source: String,
        function: Option<BoundFunction>,
    },
    /// Build a sub-object (possibly anchored elsewhere)
    Nested(CompiledSpec),
}

/// A specification validated against a function registry
///
/// Immutable and cheap to share; compile once and map many records.
#[derive(Debug, Clone)]
pub struct CompiledSpec {
    pub(crate) anchor: Option<String>,
    pub(crate) filter: Option<Filter>,
    pub(crate) allow_null: bool,
    pub(crate) fields: Vec<(String, Rule)>,
}

impl CompiledSpec {
    /// Compile a specification
    ///
    /// # Errors
    /// - `UnreadableSpecification` if the specification or any entry is malformed
    /// - `UnknownFunction` if an entry names an unregistered function
    pub fn compile(spec: &Value, registry: &FunctionRegistry) -> MappingResult<Self> {
        let Value::Object(entries) = spec else {
            return Err(MappingError::unreadable(format!(
                "specification must be an object, found {}",
                kind_of(spec)
            )));
        };
        Self::compile_object(entries, registry)
    }

    fn compile_object(entries: &Map<String, Value>, registry: &FunctionRegistry) -> MappingResult<Self> {
        let anchor = match entries.get(ON) {
            None => None,
            Some(Value::String(path)) => Some(path.clone()),
            Some(other) => {
                return Err(MappingError::unreadable(format!(
                    "'{ON}' must be a path string, found {}",
                    kind_of(other)
                )))
            }
        };

        let filter = match entries.get(FILTER) {
            None => None,
            Some(Value::Array(items)) => {
                let (source, predicate) = compile_call(FILTER, items, registry)?;
                let predicate = predicate.ok_or_else(|| {
                    MappingError::unreadable(format!("'{FILTER}' requires a predicate function"))
                })?;
                Some(Filter { source, predicate })
            }
            Some(other) => {
                return Err(MappingError::unreadable(format!(
                    "'{FILTER}' must be [path, predicate, ...], found {}",
                    kind_of(other)
                )))
            }
        };

        let allow_null = match entries.get(ALLOW_NULL) {
            None => false,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(MappingError::unreadable(format!(
                    "'{ALLOW_NULL}' must be a boolean, found {}",
                    kind_of(other)
                )))
            }
        };

        let mut fields = Vec::with_capacity(entries.len());
        for (target, entry) in entries {
            if target.starts_with(DIRECTIVE_MARKER) {
                continue;
            }
            let rule = match entry {
                Value::Array(items) => {
                    let (source, function) = compile_call(target, items, registry)?;
                    Rule::Path { source, function }
                }
                Value::Object(nested) => Rule::Nested(Self::compile_object(nested, registry)?),
                other => {
                    return Err(MappingError::unreadable(format!(
                        "field '{target}' must be an array or an object, found {}",
                        kind_of(other)
                    )))
                }
            };
            fields.push((target.clone(), rule));
        }

        Ok(Self {
            anchor,
            filter,
            allow_null,
            fields,
        })
    }

    /// Anchor path, if any
    #[inline]
    #[must_use]
    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    /// Output field paths in specification order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

/// Parse `[path, function?, args...]`
fn compile_call(
    target: &str,
    items: &[Value],
    registry: &FunctionRegistry,
) -> MappingResult<(String, Option<BoundFunction>)> {
    let source = match items.first() {
        Some(Value::String(path)) => path.clone(),
        Some(other) => {
            return Err(MappingError::unreadable(format!(
                "'{target}': source path must be a string, found {}",
                kind_of(other)
            )))
        }
        None => {
            return Err(MappingError::unreadable(format!(
                "'{target}': entry must name a source path"
            )))
        }
    };

    let function = match items.get(1) {
        None => None,
        Some(Value::String(name)) => {
            let args = items[2..].to_vec();
            Some(BoundFunction {
                name: name.clone(),
                function: registry.bind(name, &args)?,
                args,
            })
        }
        Some(other) => {
            return Err(MappingError::unreadable(format!(
                "'{target}': function reference must be a name, found {}",
                kind_of(other)
            )))
        }
    };

    Ok((source, function))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_all_entry_forms() {
        let registry = FunctionRegistry::with_defaults();
        let spec = json!({
            "$on": "contacts",
            "$filter": ["email", "exists"],
            "name": ["full_name"],
            "attributes.role": ["role", "to_attribute"],
            "address": {"city": ["city"]}
        });

        let compiled = CompiledSpec::compile(&spec, &registry).unwrap();
        assert_eq!(compiled.anchor(), Some("contacts"));
        assert!(compiled.filter.is_some());
        assert_eq!(
            compiled.field_names().collect::<Vec<_>>(),
            vec!["name", "attributes.role", "address"]
        );
    }

    #[test]
    fn rejects_non_object_specification() {
        let registry = FunctionRegistry::with_defaults();
        for spec in [json!(["a"]), json!("a"), json!(1), Value::Null] {
            assert!(matches!(
                CompiledSpec::compile(&spec, &registry),
                Err(MappingError::UnreadableSpecification(_))
            ));
        }
    }

    #[test]
    fn rejects_malformed_entries() {
        let registry = FunctionRegistry::with_defaults();
        for spec in [
            json!({"a": []}),
            json!({"a": [1]}),
            json!({"a": ["x", 2]}),
            json!({"a": "x"}),
            json!({"$on": 3, "a": ["x"]}),
            json!({"$filter": "x", "a": ["x"]}),
            json!({"$filter": ["x"], "a": ["x"]}),
            json!({"$allow_null": "yes", "a": ["x"]}),
        ] {
            assert!(
                matches!(
                    CompiledSpec::compile(&spec, &registry),
                    Err(MappingError::UnreadableSpecification(_))
                ),
                "expected unreadable for {spec}"
            );
        }
    }

    #[test]
    fn unknown_function_fails_at_compile_time() {
        let registry = FunctionRegistry::with_defaults();
        let spec = json!({"nested": {"a": ["x", "does_not_exist"]}});
        assert_eq!(
            CompiledSpec::compile(&spec, &registry).unwrap_err(),
            MappingError::UnknownFunction("does_not_exist".to_string())
        );
    }

    #[test]
    fn unknown_directives_are_ignored() {
        let registry = FunctionRegistry::with_defaults();
        let spec = json!({"$comment": "anything", "a": ["x"]});
        let compiled = CompiledSpec::compile(&spec, &registry).unwrap();
        assert_eq!(compiled.field_names().collect::<Vec<_>>(), vec!["a"]);
    }
}

//! Function registry for mapping specifications
//!
//! Specifications reference processing functions by name
//! (`["path", "to_attribute"]`). Names are resolved against a
//! [`FunctionRegistry`] when a specification is compiled, so a typo fails
//! before any record is mapped.
//!
//! Every function has the same shape: it receives the resolved raw value
//! (`None` when the path did not resolve) followed by the literal arguments
//! written after the function name, and returns the output value, or `None`
//! to omit the field.
//!
//! A function may also have a binder, which sees the literal arguments once at
//! compile time and returns a specialised function (`matches` compiles its
//! pattern there).

use crate::error::{MappingError, MappingResult};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named mapping function
pub type MappingFn =
    Arc<dyn Fn(Option<&Value>, &[Value]) -> MappingResult<Option<Value>> + Send + Sync>;

/// Specialises a function for the literal arguments of one specification entry
pub type MappingBinder = Arc<dyn Fn(&[Value]) -> MappingResult<MappingFn> + Send + Sync>;

/// Registry of mapping functions by name
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, MappingFn>,
    binders: HashMap<String, MappingBinder>,
}

impl FunctionRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
            binders: HashMap::new(),
        }
    }

    /// Create registry with built-in functions
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("default", default_value);
        registry.register("to_attribute", to_attribute);
        registry.register("to_attributes", to_attributes);
        registry.register("to_string", to_string);
        registry.register("first", first);
        registry.register("join", join);
        registry.register("prefix", prefix);
        registry.register("lowercase", lowercase);
        registry.register("concept_label", concept_label);
        registry.register("exists", exists);
        registry.register("equals", equals);
        registry.register("not_equals", not_equals);
        registry.register("matches", matches);
        registry.register_binder("matches", bind_matches);
        registry
    }

    /// Register a function, replacing any function with the same name
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(Option<&Value>, &[Value]) -> MappingResult<Option<Value>> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
    }

    /// Register a binder for a function name
    ///
    /// Specifications compiled against this registry call the binder instead
    /// of using the plain function. The plain function stays available
    /// through [`FunctionRegistry::resolve`].
    pub fn register_binder<B>(&mut self, name: &str, binder: B)
    where
        B: Fn(&[Value]) -> MappingResult<MappingFn> + Send + Sync + 'static,
    {
        self.binders.insert(name.to_string(), Arc::new(binder));
    }

    /// Function specialised for `args`
    ///
    /// # Errors
    /// - `MappingError::UnknownFunction` when the name is not registered
    /// - whatever the binder rejects in `args`
    pub fn bind(&self, name: &str, args: &[Value]) -> MappingResult<MappingFn> {
        match self.binders.get(name) {
            Some(binder) => binder(args),
            None => self.resolve(name),
        }
    }

    /// Look up function by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<MappingFn> {
        self.functions.get(name).cloned()
    }

    /// Resolve function by name
    ///
    /// # Errors
    /// `MappingError::UnknownFunction` when the name is not registered
    pub fn resolve(&self, name: &str) -> MappingResult<MappingFn> {
        self.get(name)
            .ok_or_else(|| MappingError::UnknownFunction(name.to_string()))
    }

    /// Check if function exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// List registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered functions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn string_arg<'a>(function: &str, args: &'a [Value], index: usize) -> MappingResult<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            MappingError::function_failed(function, format!("expected string argument {index}"))
        })
}

fn default_value(value: Option<&Value>, args: &[Value]) -> MappingResult<Option<Value>> {
    Ok(present(value).cloned().or_else(|| args.first().cloned()))
}

fn to_attribute(value: Option<&Value>, _args: &[Value]) -> MappingResult<Option<Value>> {
    Ok(present(value).map(|v| json!([{ "value": v }])))
}

fn to_attributes(value: Option<&Value>, _args: &[Value]) -> MappingResult<Option<Value>> {
    let attributes: Vec<Value> = match present(value) {
        None => return Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| json!({ "value": v }))
            .collect(),
        Some(v) => vec![json!({ "value": v })],
    };

    if attributes.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Value::Array(attributes)))
    }
}

fn to_string(value: Option<&Value>, _args: &[Value]) -> MappingResult<Option<Value>> {
    Ok(present(value).map(|v| match v {
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }))
}

fn first(value: Option<&Value>, _args: &[Value]) -> MappingResult<Option<Value>> {
    Ok(match present(value) {
        Some(Value::Array(items)) => items.first().cloned(),
        other => other.cloned(),
    })
}

fn join(value: Option<&Value>, args: &[Value]) -> MappingResult<Option<Value>> {
    let separator = args.first().and_then(Value::as_str).unwrap_or(", ");
    Ok(match present(value) {
        Some(Value::Array(items)) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|v| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(Value::String(parts.join(separator)))
            }
        }
        other => other.cloned(),
    })
}

fn prefix(value: Option<&Value>, args: &[Value]) -> MappingResult<Option<Value>> {
    let prefix = string_arg("prefix", args, 0)?;
    Ok(present(value).map(|v| match v {
        Value::String(s) => Value::String(format!("{prefix}{s}")),
        other => Value::String(format!("{prefix}{other}")),
    }))
}

fn lowercase(value: Option<&Value>, _args: &[Value]) -> MappingResult<Option<Value>> {
    match present(value) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(Value::String(s.to_lowercase()))),
        Some(other) => Err(MappingError::function_failed(
            "lowercase",
            format!("expected a string, found {}", crate::path::kind_of(other)),
        )),
    }
}

/// Ontology terms carry a curated label and the submitter's free text
fn concept_label(value: Option<&Value>, _args: &[Value]) -> MappingResult<Option<Value>> {
    Ok(match present(value) {
        Some(Value::Object(term)) => term
            .get("ontology_label")
            .or_else(|| term.get("text"))
            .filter(|v| !v.is_null())
            .cloned(),
        other => other.cloned(),
    })
}

fn exists(value: Option<&Value>, _args: &[Value]) -> MappingResult<Option<Value>> {
    Ok(Some(Value::Bool(present(value).is_some())))
}

fn equals(value: Option<&Value>, args: &[Value]) -> MappingResult<Option<Value>> {
    let expected = args.first().unwrap_or(&Value::Null);
    Ok(Some(Value::Bool(value.unwrap_or(&Value::Null) == expected)))
}

fn not_equals(value: Option<&Value>, args: &[Value]) -> MappingResult<Option<Value>> {
    let expected = args.first().unwrap_or(&Value::Null);
    Ok(Some(Value::Bool(value.unwrap_or(&Value::Null) != expected)))
}

fn matches(value: Option<&Value>, args: &[Value]) -> MappingResult<Option<Value>> {
    let pattern = string_arg("matches", args, 0)?;
    let regex =
        Regex::new(pattern).map_err(|e| MappingError::function_failed("matches", e.to_string()))?;
    Ok(Some(regex_match(&regex, value)))
}

/// Pattern compiled once per specification entry; a bad pattern is a specification defect
fn bind_matches(args: &[Value]) -> MappingResult<MappingFn> {
    let pattern = args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| MappingError::unreadable("matches: expected a pattern argument"))?;
    let regex = Regex::new(pattern).map_err(|e| MappingError::unreadable(format!("matches: {e}")))?;
    Ok(Arc::new(
        move |value: Option<&Value>, _args: &[Value]| -> MappingResult<Option<Value>> {
            Ok(Some(regex_match(&regex, value)))
        },
    ))
}

fn regex_match(regex: &Regex, value: Option<&Value>) -> Value {
    Value::Bool(
        present(value)
            .and_then(Value::as_str)
            .is_some_and(|s| regex.is_match(s)),
    )
}

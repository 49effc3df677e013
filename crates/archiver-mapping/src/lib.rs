//! Archiver Mapping
//!
//! A small interpreter for declarative JSON conversion specifications. Every
//! archive converter describes its payload as a specification and lets the
//! engine do the walking.
//!
//! # Core Concepts
//!
//! - [`FunctionRegistry`]: named processing functions referenced by specifications
//! - [`CompiledSpec`]: a specification validated against a registry
//! - [`JsonMapper`]: applies compiled specifications to source records
//!
//! # Example
//!
//! ```rust
//! use archiver_mapping::JsonMapper;
//! use serde_json::json;
//!
//! let mapper = JsonMapper::with_defaults();
//! let spec = mapper.compile(&json!({
//!     "$on": "contacts",
//!     "name": ["full_name"],
//!     "attributes.role": ["role", "to_attribute"]
//! })).unwrap();
//!
//! let out = mapper.map(&json!({"contacts": [{"full_name": "A", "role": "pi"}]}), &spec).unwrap();
//! assert_eq!(out, json!([{"name": "A", "attributes": {"role": [{"value": "pi"}]}}]));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod mapper;
pub mod path;
mod registry;
mod spec;

pub use error::{MappingError, MappingResult};
pub use mapper::JsonMapper;
pub use registry::{FunctionRegistry, MappingBinder, MappingFn};
pub use spec::{CompiledSpec, ALLOW_NULL, DIRECTIVE_MARKER, FILTER, ON};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

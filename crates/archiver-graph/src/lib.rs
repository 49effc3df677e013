//! Archiver Graph
//!
//! Dependency graph used to order derived samples: an edge `child -> parent`
//! records that `child` was derived from `parent`. Edges that would close a
//! cycle are rejected before any mutation, with the cycle attached.
//!
//! ```rust
//! use archiver_graph::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_edge("tissue", "donor").unwrap();
//! graph.add_edge("cells", "tissue").unwrap();
//! assert!(graph.add_edge("donor", "cells").is_err());
//!
//! assert_eq!(graph.dependencies_first(), vec!["donor", "tissue", "cells"]);
//! ```

#![warn(missing_docs)]

mod error;
mod graph;

pub use error::GraphError;
pub use graph::DependencyGraph;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

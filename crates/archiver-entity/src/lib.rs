//! Archiver Entity
//!
//! Typed registry of archive-bound entities for one manifest.
//!
//! # Core Concepts
//!
//! - [`EntityType`]: the closed set of archivable kinds
//! - [`ArchiveEntity`]: source fragments, payload, remote reference, accession, issues
//! - [`EntityMap`]: at most one entity per `(type, alias)`, with filters and reports
//! - [`EntityReport`]: per-type counts and per-entity outcome

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod entity;
mod error;
mod map;
mod report;
mod types;

pub use entity::{ArchiveEntity, EntityIssue, RemoteRef};
pub use error::{EntityError, EntityResult};
pub use map::EntityMap;
pub use report::{EntityReport, EntitySummary, TypeCounts};
pub use types::EntityType;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Archiver Core
//!
//! Archives upstream metadata manifests into independent scientific archives
//! and writes the issued accessions back:
//! - Aggregates manifest records into typed entities, ordering derived samples
//! - Converts entities into archive payloads through declarative field tables
//! - Drives each archive submission through validation, submission and processing
//! - Patches accessions onto the source records
//!
//! HTTP clients stay outside: archives, the metadata source and the taxonomy
//! service are injected as trait objects.
//!
//! # Example
//!
//! ```rust,ignore
//! use archiver_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     source: Arc<dyn MetadataSource>,
//! #     taxonomy: Arc<dyn TaxonomyService>,
//! #     samples: Arc<dyn ArchiveClient>,
//! # ) -> Result<(), ArchiverError> {
//! let config = ArchiverConfig::load("archiver.toml")?;
//! let orchestrator = ArchiveOrchestrator::new(source, taxonomy, config)?
//!     .with_target(ArchiveTarget::new(samples, [EntityType::Sample]));
//!
//! let report = orchestrator.archive_manifest("manifest-1").await?;
//! println!("{} submissions", report.submissions.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod aggregate;
pub mod cache;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod reconcile;
pub mod telemetry;

pub use aggregate::{Aggregation, ManifestAggregator};
pub use cache::{CachedMetadataSource, EntityLookupCache};
pub use client::{
    ArchiveClient, MetadataSource, ProcessingResult, ProcessingStatus, RemoteRecord, SubmissionContents,
    SubmissionHandle, SubmissionStatus, TaxonomyService, ValidationResult,
};
pub use config::{ArchiverConfig, CacheConfig, PollingOptions};
pub use convert::{Converter, ConverterSet};
pub use error::{
    ArchiverError, ArchiverResult, ClientError, ClientResult, ConfigError, ConversionError, ConversionResult,
};
pub use lifecycle::{
    CheckAndAdvance, Poller, StepOutcome, Submission, SubmissionError, SubmissionErrorKind, SubmissionLifecycle,
    SubmissionState, SubmissionSummary,
};
pub use orchestrator::{ArchiveOrchestrator, ArchiveTarget, ManifestReport};
pub use reconcile::{accession_patch, AccessionReconciler, ReconciliationReport};

pub use archiver_entity::{ArchiveEntity, EntityMap, EntityReport, EntityType};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running the archiver
    pub use crate::{
        ArchiveClient, ArchiveOrchestrator, ArchiveTarget, ArchiverConfig, ArchiverError, ArchiverResult,
        EntityType, ManifestReport, MetadataSource, PollingOptions, TaxonomyService,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Error types for the archiver
//!
//! Failure kinds fall in three groups:
//! - Static configuration defects (mapping specifications, cyclic derivation,
//!   config files): fail fast
//! - Per-entity data problems ([`ConversionError`]): recorded on the entity,
//!   the run continues
//! - Collaborator transport problems ([`ClientError`]): recorded on the
//!   submission, retried by the poller when transient

use crate::lifecycle::SubmissionState;
use archiver_entity::{EntityError, EntityType};
use archiver_graph::GraphError;
use archiver_mapping::MappingError;
use std::path::PathBuf;

/// Main archiver error type
#[derive(Debug, thiserror::Error)]
pub enum ArchiverError {
    /// Mapping specification defect
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Cyclic derivation between samples
    #[error("graph error: {0}")]
    Graph(#[from] GraphError<String>),

    /// Entity could not be converted
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Archive or metadata source call failed
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Entity registry error
    #[error("entity error: {0}")]
    Entity(#[from] EntityError),

    /// A poll exhausted its timeout
    #[error("timed out in {state} after {waited_secs}s")]
    Timeout {
        /// State being polled
        state: SubmissionState,
        /// Time spent waiting
        waited_secs: u64,
    },

    /// Lifecycle transition not in the transition table
    #[error("illegal submission transition: {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: SubmissionState,
        /// Requested state
        to: SubmissionState,
    },
}

impl ArchiverError {
    /// Defect in static configuration; the run cannot continue
    #[inline]
    #[must_use]
    pub fn is_fail_fast(&self) -> bool {
        match self {
            Self::Mapping(e) => e.is_specification_defect(),
            Self::Graph(_) | Self::Config(_) | Self::IllegalTransition { .. } => true,
            _ => false,
        }
    }

    /// Transient condition worth another attempt
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Client(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Result type for archiver operations
pub type ArchiverResult<T> = Result<T, ArchiverError>;

/// Entity-level conversion failures
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// Source fragment absent from the entity
    #[error("missing source fragment: {0}")]
    MissingSource(String),

    /// Required field absent from the source
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Taxonomy service could not name the taxon
    #[error("taxonomy lookup failed for taxon {taxon_id}: {message}")]
    TaxonomyLookup {
        /// NCBI taxon id
        taxon_id: u64,
        /// Cause
        message: String,
    },

    /// Mapping function failed on this record
    #[error("mapping failed: {0}")]
    Mapping(#[from] MappingError),

    /// Mapping produced something other than an object
    #[error("conversion produced {0}, expected an object")]
    NotAnObject(&'static str),

    /// No converter for the entity type
    #[error("no converter registered for {0}")]
    NoConverter(EntityType),
}

impl ConversionError {
    /// Create taxonomy lookup error
    #[inline]
    pub fn taxonomy(taxon_id: u64, message: impl Into<String>) -> Self {
        Self::TaxonomyLookup {
            taxon_id,
            message: message.into(),
        }
    }
}

/// Result type for conversions
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Collaborator call failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Request did not complete
    #[error("request to {service} failed: {message}")]
    Transport {
        /// Service name
        service: String,
        /// Cause
        message: String,
    },

    /// Service answered with an error status
    #[error("{service} returned status {status}: {message}")]
    Status {
        /// Service name
        service: String,
        /// HTTP-like status code
        status: u16,
        /// Response message
        message: String,
    },

    /// Resource does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Response could not be interpreted
    #[error("unexpected response from {service}: {message}")]
    InvalidResponse {
        /// Service name
        service: String,
        /// What was wrong
        message: String,
    },
}

impl ClientError {
    /// Create transport error
    #[inline]
    pub fn transport(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create status error
    #[inline]
    pub fn status(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// Create invalid response error
    #[inline]
    pub fn invalid_response(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Transport failures and server-side statuses may succeed on retry
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type for collaborator calls
pub type ClientResult<T> = Result<T, ClientError>;

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("invalid toml: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_and_spec_errors_fail_fast() {
        let cyclic = ArchiverError::from(GraphError::CyclicDependency {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        });
        assert!(cyclic.is_fail_fast());
        assert!(!cyclic.is_retryable());

        let spec = ArchiverError::from(MappingError::unreadable("not a mapping"));
        assert!(spec.is_fail_fast());
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(ArchiverError::from(ClientError::transport("ena", "reset")).is_retryable());
        assert!(ClientError::status("ena", 503, "busy").is_retryable());
        assert!(!ClientError::status("ena", 400, "bad").is_retryable());
        assert!(!ClientError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn conversion_errors_are_not_fail_fast() {
        let err = ArchiverError::from(ConversionError::taxonomy(9606, "service down"));
        assert!(!err.is_fail_fast());
        assert_eq!(
            err.to_string(),
            "conversion error: taxonomy lookup failed for taxon 9606: service down"
        );
    }
}

/// Entity registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    /// Name does not denote a known entity type
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// No entity registered under the alias
    #[error("entity not found: {0}")]
    NotFound(String),
}

/// Result type for entity operations
pub type EntityResult<T> = Result<T, EntityError>;

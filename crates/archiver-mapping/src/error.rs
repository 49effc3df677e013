//! Error types for the mapping engine
//!
//! Two kinds of failure exist:
//! - Specification defects (`UnreadableSpecification`, `UnknownFunction`,
//!   `InvalidNode`). The first two are raised when a specification is compiled,
//!   `InvalidNode` when an `$on` anchor does not point at an object or an array
//!   of objects. All three are programming errors and stop the run.
//! - Data defects (`FunctionFailed`), raised by a function rejecting one record

/// Mapping error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// Anchor points at a missing node or at a node that is not an object/array of objects
    #[error("invalid node at '{path}': {reason}")]
    InvalidNode {
        /// Anchor path as written in the specification
        path: String,
        /// What was found instead
        reason: String,
    },

    /// Specification is not a mapping, or one of its entries is malformed
    #[error("unreadable specification: {0}")]
    UnreadableSpecification(String),

    /// Specification names a function that is not registered
    #[error("unknown mapping function: '{0}'")]
    UnknownFunction(String),

    /// A registered function rejected its input
    #[error("mapping function '{function}' failed: {message}")]
    FunctionFailed {
        /// Function name
        function: String,
        /// Failure description
        message: String,
    },
}

impl MappingError {
    /// Create invalid node error
    pub fn invalid_node(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create unreadable specification error
    pub fn unreadable(message: impl Into<String>) -> Self {
        Self::UnreadableSpecification(message.into())
    }

    /// Create function failure
    pub fn function_failed(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FunctionFailed {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Whether the error points at the specification rather than the source record
    #[inline]
    #[must_use]
    pub fn is_specification_defect(&self) -> bool {
        matches!(
            self,
            Self::UnreadableSpecification(_) | Self::UnknownFunction(_) | Self::InvalidNode { .. }
        )
    }
}

/// Result alias for mapping operations
pub type MappingResult<T> = Result<T, MappingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_node_display() {
        let err = MappingError::invalid_node("contacts", "found a string");
        assert_eq!(err.to_string(), "invalid node at 'contacts': found a string");
    }

    #[test]
    fn specification_defects() {
        assert!(MappingError::UnknownFunction("nope".into()).is_specification_defect());
        assert!(MappingError::unreadable("not an object").is_specification_defect());
        assert!(MappingError::invalid_node("a", "b").is_specification_defect());
        assert!(!MappingError::function_failed("join", "not an array").is_specification_defect());
    }
}

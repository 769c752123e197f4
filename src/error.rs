//! Error types for bundle resolution

use thiserror::Error;

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Resolver-specific error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// A required lookup produced no match
    #[error("No {resource_type} found for '{selector}'")]
    NotFound {
        /// Resource type that was searched
        resource_type: String,
        /// Identifier, reference or selector that failed to match
        selector: String,
    },

    /// Input record is missing a mandatory field or has the wrong shape
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
    },

    /// A related-observation chain loops back on itself
    #[error("Cycle detected in related observations at Observation '{id}'")]
    CycleDetected {
        /// Id of the observation seen twice on the same path
        id: String,
    },

    /// A resourceType string outside the supported set
    #[error("Unsupported resource type: {resource_type}")]
    UnsupportedResourceType {
        /// The unrecognized type name
        resource_type: String,
    },

    /// A quantity comparator string outside the supported set
    #[error("Unsupported quantity comparator: {comparator}")]
    UnsupportedComparator {
        /// The unrecognized comparator
        comparator: String,
    },
}

impl ResolveError {
    /// Create a not-found error
    pub fn not_found(resource_type: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            selector: selector.into(),
        }
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a cycle-detected error
    pub fn cycle_detected(id: impl Into<String>) -> Self {
        Self::CycleDetected { id: id.into() }
    }

    /// Create an unsupported-resource-type error
    pub fn unsupported_resource_type(resource_type: impl Into<String>) -> Self {
        Self::UnsupportedResourceType {
            resource_type: resource_type.into(),
        }
    }

    /// Create an unsupported-comparator error
    pub fn unsupported_comparator(comparator: impl Into<String>) -> Self {
        Self::UnsupportedComparator {
            comparator: comparator.into(),
        }
    }
}

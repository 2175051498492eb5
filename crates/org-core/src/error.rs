//! Error types for hierarchy operations
//!
//! This module defines the error type shared by every hierarchy crate:
//! tree traversal, sharing policies, user associations, discovery and
//! authorization all report failures through [`OrgError`].

use thiserror::Error;
use uuid::Uuid;

/// Hierarchy error types.
///
/// Validation, conflict and forbidden errors are client-correctable and are
/// surfaced unmodified. Store errors always carry the failing operation and
/// the affected id.
#[derive(Debug, Error)]
pub enum OrgError {
    /// An organization, policy, association or configuration does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The write collides with existing state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request is malformed or violates a domain rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// The organization is not allowed to perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The organization exists but no organization on its ancestor chain answered
    #[error("Nothing resolved in the hierarchy of organization {organization_id}")]
    NotFoundInHierarchy {
        /// Organization the walk started from
        organization_id: Uuid,
    },

    /// The persistence boundary failed
    #[error("Store error during {operation} for {id}: {message}")]
    Store {
        /// Store operation that failed
        operation: &'static str,
        /// Identifier the operation was acting on
        id: String,
        /// Underlying failure
        message: String,
    },
}

/// Result type for hierarchy operations.
pub type OrgResult<T> = Result<T, OrgError>;

impl OrgError {
    /// Build a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        OrgError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Build a `Store` error.
    pub fn store(operation: &'static str, id: impl ToString, message: impl ToString) -> Self {
        OrgError::Store {
            operation,
            id: id.to_string(),
            message: message.to_string(),
        }
    }

    /// Check if this error should be logged at error level.
    ///
    /// Not-found, validation and authorization failures are expected
    /// outcomes of client input and should not be logged as errors.
    pub fn is_server_error(&self) -> bool {
        matches!(self, OrgError::Store { .. })
    }

    /// Check if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrgError::Store { .. })
    }

    /// Check if this error reports a missing entity or an exhausted ancestor walk.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OrgError::NotFound { .. } | OrgError::NotFoundInHierarchy { .. }
        )
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            OrgError::NotFound { .. } | OrgError::NotFoundInHierarchy { .. } => 404,
            OrgError::Conflict(_) => 409,
            OrgError::Validation(_) => 400,
            OrgError::Forbidden(_) => 403,
            OrgError::Store { .. } => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            OrgError::NotFound { .. } => "NOT_FOUND",
            OrgError::Conflict(_) => "CONFLICT",
            OrgError::Validation(_) => "VALIDATION_ERROR",
            OrgError::Forbidden(_) => "FORBIDDEN",
            OrgError::NotFoundInHierarchy { .. } => "NOT_FOUND_IN_HIERARCHY",
            OrgError::Store { .. } => "STORE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_carries_operation_and_id() {
        let err = OrgError::store("get_organization", "org-1", "connection reset");
        assert_eq!(
            err.to_string(),
            "Store error during get_organization for org-1: connection reset"
        );
        assert!(err.is_server_error());
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let errors = [
            OrgError::not_found("organization", "x"),
            OrgError::Conflict("dup".into()),
            OrgError::Validation("bad".into()),
            OrgError::Forbidden("nope".into()),
            OrgError::NotFoundInHierarchy {
                organization_id: Uuid::now_v7(),
            },
        ];
        for err in errors {
            assert!(!err.is_retryable(), "{err}");
            assert!(!err.is_server_error(), "{err}");
        }
    }

    #[test]
    fn test_not_found_in_hierarchy_is_distinct() {
        let err = OrgError::NotFoundInHierarchy {
            organization_id: Uuid::now_v7(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.error_code(), "NOT_FOUND_IN_HIERARCHY");
        assert_ne!(err.error_code(), OrgError::not_found("organization", "x").error_code());
    }
}

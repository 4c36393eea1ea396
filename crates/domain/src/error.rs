//! Domain error types.

use entity_store::StoreError;
use thiserror::Error;

use crate::validation::ValidationError;

/// Errors that can occur during domain operations.
///
/// These never escape the mutation orchestrator's public surface: the
/// mutation methods convert them into structured results, and the query
/// methods return them by value.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed a validation rule.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The entity store rejected or failed an operation.
    #[error("Entity store error: {0}")]
    Store(#[from] StoreError),
}

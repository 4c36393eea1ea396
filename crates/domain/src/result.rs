//! Structured mutation results.
//!
//! Mutations never surface faults to their caller; every outcome is one
//! of these result shapes. Callers branch on `success`, not on the
//! presence of a value.

use serde::Serialize;

/// The uniform result of a single-entity mutation.
#[derive(Debug, Clone, Serialize)]
pub struct MutationResult<T> {
    /// The created entity on success, `None` on failure.
    pub value: Option<T>,

    /// Human-readable outcome description.
    pub message: String,

    /// Whether the mutation was applied.
    pub success: bool,
}

impl<T> MutationResult<T> {
    /// A successful mutation carrying the created entity.
    pub fn created(value: T, message: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            message: message.into(),
            success: true,
        }
    }

    /// A rejected or failed mutation.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            value: None,
            message: message.into(),
            success: false,
        }
    }
}

/// The result of a bulk mutation.
///
/// Per-item failures are isolated: the batch reports every error
/// alongside every created entity, and counts as successful when at
/// least one item was created.
#[derive(Debug, Clone, Serialize)]
pub struct BulkMutationResult<T> {
    /// The entities that were created.
    pub entities: Vec<T>,

    /// One error string per rejected item, in input order.
    pub errors: Vec<String>,

    /// True when at least one entity was created.
    pub success: bool,
}

impl<T> BulkMutationResult<T> {
    /// A batch outcome from created entities and per-item errors.
    pub fn from_outcome(entities: Vec<T>, errors: Vec<String>) -> Self {
        let success = !entities.is_empty();
        Self {
            entities,
            errors,
            success,
        }
    }

    /// A batch that failed as a whole before or at commit.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            entities: Vec::new(),
            errors: vec![message.into()],
            success: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_result_is_successful() {
        let result = MutationResult::created(42, "ok");
        assert!(result.success);
        assert_eq!(result.value, Some(42));
        assert_eq!(result.message, "ok");
    }

    #[test]
    fn rejected_result_has_no_value() {
        let result: MutationResult<i32> = MutationResult::rejected("bad input");
        assert!(!result.success);
        assert!(result.value.is_none());
    }

    #[test]
    fn bulk_success_requires_at_least_one_creation() {
        let all_failed: BulkMutationResult<i32> =
            BulkMutationResult::from_outcome(vec![], vec!["Customer 1: bad".into()]);
        assert!(!all_failed.success);

        let partial = BulkMutationResult::from_outcome(vec![1], vec!["Customer 2: bad".into()]);
        assert!(partial.success);
        assert_eq!(partial.entities.len(), 1);
        assert_eq!(partial.errors.len(), 1);
    }
}

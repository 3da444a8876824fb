//! # Error Types
//!
//! Domain error taxonomy for the stock ledger.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  meridian-core errors (this file)                                       │
//! │  ├── LedgerError      - Commit path failures (the full taxonomy)        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  meridian-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  Flow: ValidationError → LedgerError ← DbError (infra as               │
//! │        StorageUnavailable) → API layer → Terminal                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product name, reference, ...)
//! 3. Errors are enum variants, never String
//! 4. Caller faults and transient infrastructure faults are distinct classes

use thiserror::Error;

// =============================================================================
// Ledger Error
// =============================================================================

/// Errors produced by the ledger commit paths.
///
/// Two broad classes live here: caller faults (validation, insufficient
/// stock, duplicate references, bad state transitions) which must never be
/// auto-retried, and `StorageUnavailable` which is transient infrastructure
/// and safe to retry with backoff. [`LedgerError::is_retryable`] encodes
/// that split for the reconciliation processor.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Input failed validation before any stock was touched.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A debit would take the product's stock below zero.
    ///
    /// ## When This Occurs
    /// - A sale line requests more than the available quantity
    /// - A negative stock adjustment exceeds what is on hand
    ///
    /// The operation is rejected whole; retry after restocking.
    #[error("Insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock {
        name: String,
        available: i64,
        requested: i64,
    },

    /// The sale's money fields break `total = subtotal - discount + tax`.
    ///
    /// Checked before any stock mutation, so a mismatched sale never
    /// touches the ledger.
    #[error("Totals mismatch: subtotal {subtotal} - discount {discount} + tax {tax} != total {total}")]
    TotalsMismatch {
        subtotal: i64,
        discount: i64,
        tax: i64,
        total: i64,
    },

    /// A return with this reference already exists for the business.
    #[error("Return reference '{0}' already exists")]
    DuplicateReference(String),

    /// Returned quantity would exceed what the referenced sale sold.
    ///
    /// `returned` counts prior pending and approved returns against the
    /// same sale; `requested` is what this request asked for.
    #[error("Over-return for {name}: sold {sold}, previously returned {returned}, requested {requested}")]
    OverReturn {
        name: String,
        sold: i64,
        returned: i64,
        requested: i64,
    },

    /// The sale cannot be cancelled because a return references it.
    ///
    /// Returns credit stock at creation, so cancelling the sale afterwards
    /// would double-credit. The block applies to rejected returns too.
    #[error("Sale {0} has returns recorded against it and cannot be cancelled")]
    ConflictingReturn(String),

    /// The entity exists but is not in a state that allows the operation.
    ///
    /// ## When This Occurs
    /// - Cancelling a sale that is already cancelled
    /// - Approving a return that is not pending
    /// - Marking a refund on a non-approved or already-refunded return
    #[error("{entity} {id} is {state}, cannot perform operation")]
    InvalidState {
        entity: String,
        id: String,
        state: String,
    },

    /// Referenced product does not exist in the business/store scope.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Referenced sale does not exist.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Referenced return does not exist.
    #[error("Return not found: {0}")]
    ReturnNotFound(String),

    /// The backing store is unreachable, out of connections, or failing.
    ///
    /// Transient: queue entries stay pending on this class and the caller
    /// may retry with backoff.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl LedgerError {
    /// Returns true if the failed operation can be retried as-is.
    ///
    /// ## Retryable
    /// - `StorageUnavailable` (transient infrastructure)
    ///
    /// ## Non-Retryable
    /// - Everything else: the same input will fail the same way until the
    ///   caller changes it (or, for `InsufficientStock`, until a restock
    ///   happens outside this request).
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageUnavailable(_))
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when a commit input doesn't meet requirements.
/// Used for early validation before any ledger mutation runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., unparseable payload, mismatched context).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with LedgerError.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LedgerError::InsufficientStock {
            name: "Coca-Cola 330ml".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Coca-Cola 330ml: available 3, requested 5"
        );

        let err = LedgerError::OverReturn {
            name: "Coca-Cola 330ml".to_string(),
            sold: 2,
            returned: 1,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "Over-return for Coca-Cola 330ml: sold 2, previously returned 1, requested 2"
        );

        let err = LedgerError::TotalsMismatch {
            subtotal: 1000,
            discount: 100,
            tax: 80,
            total: 990,
        };
        assert!(err.to_string().contains("Totals mismatch"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "reference".to_string(),
        };
        assert_eq!(err.to_string(), "reference is required");

        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_ledger_error() {
        let validation_err = ValidationError::Required {
            field: "business_id".to_string(),
        };
        let ledger_err: LedgerError = validation_err.into();
        assert!(matches!(ledger_err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_retryable_split() {
        assert!(LedgerError::StorageUnavailable("pool exhausted".into()).is_retryable());

        assert!(!LedgerError::DuplicateReference("RET-001".into()).is_retryable());
        assert!(!LedgerError::InsufficientStock {
            name: "x".into(),
            available: 0,
            requested: 1
        }
        .is_retryable());
        assert!(!LedgerError::Validation(ValidationError::Required {
            field: "store_id".into()
        })
        .is_retryable());
    }
}

//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError (meridian-core) ← Infrastructure faults collapse into     │
//! │       │                         StorageUnavailable (retryable)         │
//! │       ▼                                                                 │
//! │  Terminal displays user-friendly message                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use meridian_core::LedgerError;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - ID doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate return reference
    /// - Duplicate client_ref (idempotent replay racing a first commit)
    /// - Any UNIQUE index violation
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing non-existent product_id
    /// - Referencing non-existent sale_id
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    ///
    /// ## When This Occurs
    /// - Runtime SQL error ("database is locked", I/O error, ...)
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether this is a unique-index collision.
    ///
    /// The commit paths use this to tell "lost an idempotency race" apart
    /// from real storage failures.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite error messages for constraints:
                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    // Parse the field name from the error message
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Convert DbError into the domain taxonomy.
///
/// ## Mapping
/// ```text
/// NotFound("Product")     → ProductNotFound      (caller fault)
/// NotFound("Sale")        → SaleNotFound         (caller fault)
/// NotFound("Return")      → ReturnNotFound       (caller fault)
/// UniqueViolation         → DuplicateReference   (caller fault)
/// ForeignKeyViolation     → ProductNotFound      (caller fault)
/// Everything else         → StorageUnavailable   (retryable)
/// ```
///
/// The commit paths intercept UniqueViolation where replay detection needs
/// richer handling; this blanket conversion covers the remaining flows.
impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => match entity.as_str() {
                "Product" => LedgerError::ProductNotFound(id),
                "Sale" => LedgerError::SaleNotFound(id),
                "Return" => LedgerError::ReturnNotFound(id),
                _ => LedgerError::StorageUnavailable(format!("{} {} missing", entity, id)),
            },

            DbError::UniqueViolation { field, .. } => LedgerError::DuplicateReference(field),

            // The only runtime FK targets are products and sales rows the
            // operation just resolved; a violation means the row vanished.
            DbError::ForeignKeyViolation { message } => LedgerError::ProductNotFound(message),

            other => LedgerError::StorageUnavailable(other.to_string()),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_by_entity() {
        let err: LedgerError = DbError::not_found("Product", "p1").into();
        assert!(matches!(err, LedgerError::ProductNotFound(id) if id == "p1"));

        let err: LedgerError = DbError::not_found("Sale", "s1").into();
        assert!(matches!(err, LedgerError::SaleNotFound(id) if id == "s1"));

        let err: LedgerError = DbError::not_found("Return", "r1").into();
        assert!(matches!(err, LedgerError::ReturnNotFound(id) if id == "r1"));
    }

    #[test]
    fn test_infrastructure_maps_to_storage_unavailable() {
        let err: LedgerError = DbError::PoolExhausted.into();
        assert!(err.is_retryable());

        let err: LedgerError = DbError::QueryFailed("database is locked".to_string()).into();
        assert!(err.is_retryable());

        let err: LedgerError = DbError::ConnectionFailed("no such file".to_string()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unique_violation_is_not_retryable() {
        let db_err = DbError::duplicate("sale_returns.reference", "RET-001");
        assert!(db_err.is_unique_violation());

        let err: LedgerError = db_err.into();
        assert!(!err.is_retryable());
    }
}

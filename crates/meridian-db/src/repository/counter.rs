//! # Counter Repository
//!
//! Gap-tolerant named sequences, used for human-facing sale numbers.
//!
//! Each counter is one row keyed by name. The increment is a single upsert
//! with RETURNING, so two tills asking for the next number at the same
//! moment get distinct values with no read-then-write window.

use sqlx::SqlitePool;

use crate::error::DbResult;

/// Repository for monotonic counter operations.
#[derive(Debug, Clone)]
pub struct CounterRepository {
    pool: SqlitePool,
}

impl CounterRepository {
    /// Creates a new CounterRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CounterRepository { pool }
    }

    /// Increments the named counter and returns the new value.
    ///
    /// The first call for a key returns 1.
    pub async fn next(&self, key: &str) -> DbResult<i64> {
        let seq = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO counters (key, seq) VALUES (?1, 1)
            ON CONFLICT(key) DO UPDATE SET seq = seq + 1
            RETURNING seq
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        Ok(seq)
    }

    /// Issues the next sale number for one store, e.g. `S-000042`.
    ///
    /// Numbers are unique per (business, store) and monotonic, but a sale
    /// that fails after taking a number leaves a gap. Receipts tolerate
    /// gaps; they never tolerate duplicates.
    pub async fn next_sale_number(&self, business_id: &str, store_id: &str) -> DbResult<String> {
        let key = format!("sale:{}:{}", business_id, store_id);
        let seq = self.next(&key).await?;
        Ok(format!("S-{:06}", seq))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Validation Module
//!
//! Input validation for documents entering the ledger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Terminal (TypeScript PWA)                                    │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate cashier feedback                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger boundary (Rust)                                       │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  ├── UNIQUE constraints                                                │
//! │  └── CHECK (quantity >= 0)                                             │
//! │                                                                         │
//! │  Defense in depth: offline payloads arrive hours late and from        │
//! │  devices running old builds, so layer 2 trusts nothing                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use meridian_core::validation::{validate_reference, validate_quantity};
//!
//! // Validate a return slip reference before commit
//! validate_reference("RET-2024-001").unwrap();
//!
//! // Validate a line quantity
//! validate_quantity(5).unwrap();
//! ```

use crate::error::{LedgerError, LedgerResult, ValidationError};
use crate::money::Money;
use crate::types::{NewAdjustment, NewQueueEntry, NewReturn, NewSale};
use crate::{MAX_LINE_QUANTITY, MAX_SALE_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an opaque identifier (business_id, store_id, device_id, ...).
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 64 characters
///
/// ## Example
/// ```rust
/// use meridian_core::validation::validate_id;
///
/// assert!(validate_id("business_id", "biz-001").is_ok());
/// assert!(validate_id("business_id", "").is_err());
/// ```
pub fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates a UUID string format.
///
/// ## Rules
/// - Must be a valid UUID format
/// - 36 characters with hyphens: xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
///
/// ## Example
/// ```rust
/// use meridian_core::validation::validate_uuid;
///
/// assert!(validate_uuid("product_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("product_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates a human-readable name (product, customer, biller, reason).
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 200 characters
pub fn validate_name(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a return slip reference.
///
/// ## Rules
/// - Must not be empty
/// - Must be between 1 and 50 characters
/// - Should contain only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use meridian_core::validation::validate_reference;
///
/// assert!(validate_reference("RET-2024-001").is_ok());
/// assert!(validate_reference("").is_err());
/// assert!(validate_reference("has space").is_err());
/// ```
pub fn validate_reference(reference: &str) -> ValidationResult<()> {
    let reference = reference.trim();

    if reference.is_empty() {
        return Err(ValidationError::Required {
            field: "reference".to_string(),
        });
    }

    if reference.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "reference".to_string(),
            max: 50,
        });
    }

    // Check for valid characters (alphanumeric, hyphen, underscore)
    if !reference
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "reference".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
///
/// ## Where This Runs
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Sale commit: line 2 of 3                                               │
/// │                                                                         │
/// │  Captured quantity: 5                                                  │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(5) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0? → Error: "quantity must be positive"               │
/// │       │                                                                 │
/// │       ├── qty > 999? → Error: "quantity must be between 1 and 999"     │
/// │       │                                                                 │
/// │       └── OK → Proceed to the stock debit                              │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a monetary amount in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items, zero tax)
///
/// ## Example
/// ```rust
/// use meridian_core::validation::validate_amount_cents;
///
/// assert!(validate_amount_cents("subtotal", 1099).is_ok());
/// assert!(validate_amount_cents("tax", 0).is_ok());
/// assert!(validate_amount_cents("discount", -100).is_err());
/// ```
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Document Validators
// =============================================================================

/// Validates a sale document before commit.
///
/// Checks every field rule plus the totals identity:
/// `total = subtotal - discount + tax`, exact in cents. A sale that fails
/// here has touched no stock and no storage.
pub fn validate_sale(sale: &NewSale) -> LedgerResult<()> {
    validate_id("business_id", &sale.business_id)?;
    validate_id("store_id", &sale.store_id)?;
    validate_id("device_id", &sale.device_id)?;
    validate_name("biller_name", &sale.biller_name)?;

    if sale.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        }
        .into());
    }

    if sale.lines.len() > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        }
        .into());
    }

    for line in &sale.lines {
        validate_uuid("product_id", &line.product_id)?;
        validate_quantity(line.quantity)?;
        validate_amount_cents("unit_price", line.unit_price_cents)?;
    }

    validate_amount_cents("subtotal", sale.subtotal_cents)?;
    validate_amount_cents("discount", sale.discount_cents)?;
    validate_amount_cents("tax", sale.tax_cents)?;
    validate_amount_cents("total", sale.total_cents)?;

    // The money identity. Checked in integer cents, no rounding slack.
    let expected = Money::from_cents(sale.subtotal_cents) - Money::from_cents(sale.discount_cents)
        + Money::from_cents(sale.tax_cents);
    if expected.cents() != sale.total_cents {
        return Err(LedgerError::TotalsMismatch {
            subtotal: sale.subtotal_cents,
            discount: sale.discount_cents,
            tax: sale.tax_cents,
            total: sale.total_cents,
        });
    }

    Ok(())
}

/// Validates a return document before commit.
pub fn validate_return(ret: &NewReturn) -> LedgerResult<()> {
    validate_id("business_id", &ret.business_id)?;
    validate_id("store_id", &ret.store_id)?;
    validate_id("device_id", &ret.device_id)?;
    validate_reference(&ret.reference)?;
    validate_name("customer", &ret.customer)?;
    validate_name("reason", &ret.reason)?;

    if let Some(sale_id) = &ret.sale_id {
        validate_uuid("sale_id", sale_id)?;
    }

    if ret.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        }
        .into());
    }

    if ret.items.len() > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        }
        .into());
    }

    for item in &ret.items {
        validate_name("name", &item.name)?;
        validate_quantity(item.quantity)?;
        validate_amount_cents("unit_price", item.unit_price_cents)?;
    }

    validate_amount_cents("subtotal", ret.subtotal_cents)?;
    validate_amount_cents("tax", ret.tax_cents)?;
    validate_amount_cents("amount", ret.amount_cents)?;

    Ok(())
}

/// Validates a manual stock adjustment request.
pub fn validate_adjustment(adj: &NewAdjustment) -> LedgerResult<()> {
    validate_id("business_id", &adj.business_id)?;
    validate_id("store_id", &adj.store_id)?;
    validate_id("device_id", &adj.device_id)?;
    validate_uuid("product_id", &adj.product_id)?;
    validate_name("reason", &adj.reason)?;

    // A zero movement would record an audit row that moved nothing.
    if adj.qty_delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "qty_delta".to_string(),
            reason: "must not be zero".to_string(),
        }
        .into());
    }

    Ok(())
}

/// Validates an offline document before it enters the queue.
///
/// The payload is checked for JSON well-formedness only. Business rules run
/// when the entry is replayed, because the catalog may have changed between
/// capture and sync.
pub fn validate_queue_entry(entry: &NewQueueEntry) -> LedgerResult<()> {
    validate_id("business_id", &entry.business_id)?;
    validate_id("store_id", &entry.store_id)?;
    validate_id("device_id", &entry.device_id)?;

    if entry.payload.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "payload".to_string(),
        }
        .into());
    }

    if serde_json::from_str::<serde_json::Value>(&entry.payload).is_err() {
        return Err(ValidationError::InvalidFormat {
            field: "payload".to_string(),
            reason: "must be valid JSON".to_string(),
        }
        .into());
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewReturnItem, NewSaleLine, SyncDataType};

    fn sample_sale() -> NewSale {
        NewSale {
            business_id: "biz-001".to_string(),
            store_id: "store-001".to_string(),
            device_id: "till-1".to_string(),
            client_ref: None,
            biller_name: "Amira".to_string(),
            customer_id: None,
            customer_name: None,
            payment_method: None,
            lines: vec![NewSaleLine {
                product_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
                quantity: 2,
                unit_price_cents: 500,
            }],
            subtotal_cents: 1000,
            discount_cents: 100,
            tax_cents: 80,
            total_cents: 980,
            note: None,
            sale_date: None,
        }
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("business_id", "biz-001").is_ok());
        assert!(validate_id("business_id", "").is_err());
        assert!(validate_id("business_id", "   ").is_err());
        assert!(validate_id("business_id", &"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("product_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("product_id", "").is_err());
        assert!(validate_uuid("product_id", "not-a-uuid").is_err());
        assert!(validate_uuid("product_id", "123").is_err());
    }

    #[test]
    fn test_validate_reference() {
        assert!(validate_reference("RET-2024-001").is_ok());
        assert!(validate_reference("ref_7").is_ok());

        assert!(validate_reference("").is_err());
        assert!(validate_reference("   ").is_err());
        assert!(validate_reference("has space").is_err());
        assert!(validate_reference(&"A".repeat(60)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_amount_cents() {
        assert!(validate_amount_cents("subtotal", 0).is_ok());
        assert!(validate_amount_cents("subtotal", 1099).is_ok());
        assert!(validate_amount_cents("subtotal", -100).is_err());
    }

    #[test]
    fn test_validate_sale_accepts_exact_totals() {
        assert!(validate_sale(&sample_sale()).is_ok());
    }

    #[test]
    fn test_validate_sale_rejects_totals_mismatch() {
        let mut sale = sample_sale();
        sale.total_cents = 981; // off by one cent

        match validate_sale(&sale) {
            Err(LedgerError::TotalsMismatch { total, .. }) => assert_eq!(total, 981),
            other => panic!("expected TotalsMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_sale_rejects_empty_lines() {
        let mut sale = sample_sale();
        sale.lines.clear();
        assert!(validate_sale(&sale).is_err());
    }

    #[test]
    fn test_validate_sale_rejects_bad_line() {
        let mut sale = sample_sale();
        sale.lines[0].quantity = 0;
        assert!(validate_sale(&sale).is_err());

        let mut sale = sample_sale();
        sale.lines[0].product_id = "garbage".to_string();
        assert!(validate_sale(&sale).is_err());
    }

    #[test]
    fn test_validate_return() {
        let ret = NewReturn {
            business_id: "biz-001".to_string(),
            store_id: "store-001".to_string(),
            device_id: "till-1".to_string(),
            reference: "RET-001".to_string(),
            sale_id: None,
            client_ref: None,
            customer: "Walk-in".to_string(),
            reason: "damaged".to_string(),
            payment_method: None,
            items: vec![NewReturnItem {
                name: "Coca-Cola 330ml".to_string(),
                quantity: 1,
                unit_price_cents: 299,
            }],
            subtotal_cents: 299,
            tax_cents: 0,
            amount_cents: 299,
            return_date: None,
        };
        assert!(validate_return(&ret).is_ok());

        let mut bad = ret.clone();
        bad.reference = "has space".to_string();
        assert!(validate_return(&bad).is_err());

        let mut bad = ret.clone();
        bad.items.clear();
        assert!(validate_return(&bad).is_err());
    }

    #[test]
    fn test_validate_adjustment_rejects_zero_delta() {
        let adj = NewAdjustment {
            business_id: "biz-001".to_string(),
            store_id: "store-001".to_string(),
            device_id: "till-1".to_string(),
            product_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            qty_delta: 0,
            reason: "recount".to_string(),
            client_ref: None,
        };
        assert!(validate_adjustment(&adj).is_err());

        let negative = NewAdjustment {
            qty_delta: -3,
            ..adj.clone()
        };
        assert!(validate_adjustment(&negative).is_ok());
    }

    #[test]
    fn test_validate_queue_entry_payload_rules() {
        let entry = NewQueueEntry {
            business_id: "biz-001".to_string(),
            store_id: "store-001".to_string(),
            device_id: "till-1".to_string(),
            data_type: SyncDataType::Sale,
            payload: "{\"lines\":[]}".to_string(),
        };
        assert!(validate_queue_entry(&entry).is_ok());

        let mut bad = entry.clone();
        bad.payload = "".to_string();
        assert!(validate_queue_entry(&bad).is_err());

        let mut bad = entry.clone();
        bad.payload = "not json {".to_string();
        assert!(validate_queue_entry(&bad).is_err());
    }
}

//! # Domain Types
//!
//! Core domain types used throughout the Meridian ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │   SaleReturn    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name (business)│   │  sale_number    │   │  reference      │       │
//! │  │  quantity       │   │  client_ref     │   │  status         │       │
//! │  │  stock_alert    │   │  total_cents    │   │  refunded       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   SaleStatus    │   │  ReturnStatus   │   │   SyncStatus    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Completed      │   │  Pending        │   │  Pending        │       │
//! │  │  Pending        │   │  Approved       │   │  Synced         │       │
//! │  │  Cancelled      │   │  Rejected       │   │  Failed         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business key: (sale_number, reference, product name) - human-readable
//!
//! ## Tenancy
//! Every tenant-owned row carries `(business_id, store_id)`. All ledger
//! operations are scoped to that pair; two stores never see each other's
//! stock or documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product tracked in the stock ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Tenant this product belongs to.
    pub business_id: String,

    /// Store within the tenant that holds this stock.
    pub store_id: String,

    /// Display name. Unique per (business, store); walk-in returns
    /// resolve products by this name.
    pub name: String,

    /// Optional category label.
    pub category: Option<String>,

    /// Optional brand label.
    pub brand: Option<String>,

    /// Barcode (EAN-13, UPC-A, etc.).
    pub barcode: Option<String>,

    /// Optional description for product details.
    pub description: Option<String>,

    /// Optional image URL for the terminal catalog.
    pub image_url: Option<String>,

    /// Current on-hand quantity. Never negative; the ledger refuses
    /// any debit that would cross zero.
    pub quantity: i64,

    /// Threshold at or below which the product is considered low stock.
    pub stock_alert: i64,

    /// Selling price in cents (smallest currency unit).
    pub price_cents: i64,

    /// Cost price in cents (for margin reporting).
    pub cost_price_cents: Option<i64>,

    /// When the product was created.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// When the product was last updated.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the selling price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the current stock snapshot for this product.
    pub fn stock_level(&self) -> StockLevel {
        StockLevel {
            product_id: self.id.clone(),
            name: self.name.clone(),
            quantity: self.quantity,
            stock_alert: self.stock_alert,
        }
    }
}

// =============================================================================
// Stock Level
// =============================================================================

/// Point-in-time stock snapshot for one product.
///
/// Returned by every ledger movement so callers see the quantity that
/// resulted from *their* debit or credit, not a later one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLevel {
    pub product_id: String,
    pub name: String,
    /// Quantity immediately after the movement that produced this snapshot.
    pub quantity: i64,
    pub stock_alert: i64,
}

impl StockLevel {
    /// Whether this snapshot sits at or below the alert threshold.
    #[inline]
    pub fn below_alert(&self) -> bool {
        self.quantity <= self.stock_alert
    }
}

/// A low-stock warning attached to a commit result.
///
/// Warnings are advisory. They never block the operation that raised them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LowStockWarning {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub stock_alert: i64,
}

impl From<StockLevel> for LowStockWarning {
    fn from(level: StockLevel) -> Self {
        LowStockWarning {
            product_id: level.product_id,
            name: level.name,
            quantity: level.quantity,
            stock_alert: level.stock_alert,
        }
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a sale transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Sale has been committed and stock debited.
    Completed,
    /// Sale recorded but payment outstanding (credit sale).
    Pending,
    /// Sale was cancelled and its stock credited back.
    Cancelled,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Completed
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a sale or refund was (or will be) settled.
///
/// A sale committed without a method is "to be determined" and carries `None`.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// Bank transfer / mobile wallet.
    Transfer,
    /// Anything else (store credit, barter, ...).
    Other,
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub business_id: String,
    pub store_id: String,
    pub device_id: String,
    /// Human-readable receipt number, allocated from the per-store counter.
    pub sale_number: String,
    /// Client-supplied idempotency key. Unique per business; a replayed
    /// commit with the same key returns this row instead of a duplicate.
    pub client_ref: String,
    pub status: SaleStatus,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub biller_name: String,
    pub payment_method: Option<PaymentMethod>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub sale_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Sale {
    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Sale Line
// =============================================================================

/// A line item in a sale.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLine {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// Quantity sold.
    pub quantity: i64,
    /// Line total (unit_price × quantity), computed server-side.
    pub line_total_cents: i64,
    /// Position within the sale, starting at 0. Rollback walks lines in
    /// reverse line_no order.
    pub line_no: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleLine {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Return Status
// =============================================================================

/// Review state of a sale return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    /// Recorded and awaiting review; stock is already credited.
    Pending,
    /// Reviewed and accepted; eligible for refund payout.
    Approved,
    /// Reviewed and declined. Stock credit stands; the money does not move.
    Rejected,
}

impl Default for ReturnStatus {
    fn default() -> Self {
        ReturnStatus::Pending
    }
}

impl ReturnStatus {
    /// Lowercase name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Pending => "pending",
            ReturnStatus::Approved => "approved",
            ReturnStatus::Rejected => "rejected",
        }
    }
}

// =============================================================================
// Sale Return
// =============================================================================

/// A customer return, either against a recorded sale or walk-in.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleReturn {
    pub id: String,
    pub business_id: String,
    pub store_id: String,
    pub device_id: String,
    /// Human-entered return slip reference. Unique per business; a second
    /// commit with the same reference is rejected so stock is credited once.
    pub reference: String,
    /// The originating sale, if known. Walk-in returns carry `None`.
    pub sale_id: Option<String>,
    /// Idempotency key for queue replays. A replay presents the same
    /// reference *and* the same client_ref.
    pub client_ref: Option<String>,
    /// Customer name as given at the counter.
    pub customer: String,
    pub reason: String,
    pub status: ReturnStatus,
    pub payment_method: Option<PaymentMethod>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    /// Refund owed to the customer in cents.
    pub amount_cents: i64,
    /// Whether the refund has been paid out. Set once, from Approved only.
    pub refunded: bool,
    /// Who approved or rejected the return.
    pub approved_by: Option<String>,
    #[ts(as = "String")]
    pub return_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SaleReturn {
    /// Returns the refund amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Return Item
// =============================================================================

/// A line item in a sale return.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReturnItem {
    pub id: String,
    pub return_id: String,
    /// Product resolved by name at commit time.
    pub product_id: String,
    /// Product name at time of return (frozen).
    pub name_snapshot: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
    pub line_no: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Adjustment
// =============================================================================

/// Audit record for a manual stock movement outside any sale or return.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAdjustment {
    pub id: String,
    pub business_id: String,
    pub store_id: String,
    pub device_id: String,
    pub product_id: String,
    /// Signed movement. Positive credits stock, negative debits it.
    pub qty_delta: i64,
    /// On-hand quantity immediately after this adjustment applied.
    pub quantity_after: i64,
    pub reason: String,
    /// Idempotency key. Unique per business; replays return the recorded
    /// outcome without moving stock again.
    pub client_ref: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sync Queue
// =============================================================================

/// Sync state of an offline queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Queued, not yet replayed against the ledger.
    Pending,
    /// Replayed successfully (or detected as an earlier replay).
    Synced,
    /// Replayed and rejected for a non-retryable reason.
    Failed,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Pending
    }
}

/// What kind of document an offline queue entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncDataType {
    /// Payload deserializes as `NewSale`.
    Sale,
    /// Payload deserializes as `NewReturn`.
    Return,
    /// Payload deserializes as `NewAdjustment`.
    Adjustment,
}

impl SyncDataType {
    /// Stable lowercase name, matching the stored TEXT value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDataType::Sale => "sale",
            SyncDataType::Return => "return",
            SyncDataType::Adjustment => "adjustment",
        }
    }
}

/// An entry in the offline sync queue.
///
/// Entries are drained in `seq` order per (business, store). Each entry
/// succeeds or fails on its own; one poisoned payload never blocks the
/// documents queued behind it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SyncQueueEntry {
    /// Arrival order, allocated by the database. Drain order is ascending seq.
    pub seq: i64,
    /// Unique identifier (UUID v4). Doubles as the default idempotency key
    /// when the payload carries none of its own.
    pub id: String,
    pub business_id: String,
    pub store_id: String,
    /// Terminal that captured the document while offline.
    pub device_id: String,
    pub data_type: SyncDataType,
    /// The full document as JSON.
    pub payload: String,
    pub status: SyncStatus,
    /// Last replay error message if the entry failed.
    pub error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// When the entry was marked synced.
    #[ts(as = "Option<String>")]
    pub synced_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Input Documents
// =============================================================================

/// One line of a sale being committed.
///
/// The line total is computed server-side from `unit_price_cents × quantity`.
/// Callers never supply it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSaleLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl NewSaleLine {
    /// Line total as Money (unit price × quantity).
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// A sale as captured at the terminal, before the ledger has seen it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub business_id: String,
    pub store_id: String,
    pub device_id: String,
    /// Idempotency key. Generated server-side when absent, so direct
    /// commits without one are never treated as replays.
    pub client_ref: Option<String>,
    pub biller_name: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    /// `None` means settlement is still to be determined.
    pub payment_method: Option<PaymentMethod>,
    pub lines: Vec<NewSaleLine>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    /// Must equal subtotal - discount + tax exactly, in cents.
    pub total_cents: i64,
    pub note: Option<String>,
    /// Business date of the sale. Offline documents carry the capture
    /// time; defaults to now when absent.
    #[ts(as = "Option<String>")]
    pub sale_date: Option<DateTime<Utc>>,
}

/// One item of a return being committed. Products are resolved by name,
/// matching the paper slip a walk-in customer presents.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewReturnItem {
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl NewReturnItem {
    /// Line total as Money (unit price × quantity).
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// A return as captured at the counter.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewReturn {
    pub business_id: String,
    pub store_id: String,
    pub device_id: String,
    /// Return slip reference, unique per business.
    pub reference: String,
    /// The originating sale when the customer presents a receipt.
    pub sale_id: Option<String>,
    /// Idempotency key for queue replays.
    pub client_ref: Option<String>,
    pub customer: String,
    pub reason: String,
    pub payment_method: Option<PaymentMethod>,
    pub items: Vec<NewReturnItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub amount_cents: i64,
    #[ts(as = "Option<String>")]
    pub return_date: Option<DateTime<Utc>>,
}

/// A manual stock movement request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewAdjustment {
    pub business_id: String,
    pub store_id: String,
    pub device_id: String,
    pub product_id: String,
    /// Signed movement. Zero is rejected.
    pub qty_delta: i64,
    pub reason: String,
    pub client_ref: Option<String>,
}

/// A document captured offline, waiting to be replayed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewQueueEntry {
    pub business_id: String,
    pub store_id: String,
    pub device_id: String,
    pub data_type: SyncDataType,
    /// JSON document matching `data_type`.
    pub payload: String,
}

// =============================================================================
// Operation Outcomes
// =============================================================================

/// Result of committing a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleCommit {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
    /// Products this commit pushed to or below their alert threshold.
    pub low_stock: Vec<LowStockWarning>,
    /// True when an identical commit was already recorded and no stock moved.
    pub replayed: bool,
}

/// Result of committing a return.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnCommit {
    pub sale_return: SaleReturn,
    pub items: Vec<ReturnItem>,
    /// True when this exact return was already recorded and no stock moved.
    pub replayed: bool,
}

/// Result of a manual adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustmentOutcome {
    /// Stock snapshot after the adjustment (or the recorded one on replay).
    pub level: StockLevel,
    pub replayed: bool,
}

/// Tally of one queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueueReport {
    /// Entries replayed successfully (including detected replays).
    pub synced: u32,
    /// Entries rejected for non-retryable reasons.
    pub failed: u32,
}

// =============================================================================
// Unit Tests
// =============================================================================

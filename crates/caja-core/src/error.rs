//! # Error Types
//!
//! Domain-specific error types for caja-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  caja-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations of a workflow         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  caja-core store errors (store/mod.rs)                                 │
//! │  └── StoreError       - Persistence failures, wrapped by CoreError     │
//! │                                                                         │
//! │  caja-db errors (separate crate)                                       │
//! │  └── DbError          - SQLite failures, converted into StoreError     │
//! │                                                                         │
//! │  Flow: DbError → StoreError → CoreError → UI                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Families
//! - **Validation** (`EmptyCart`, `CustomerRequired`, `InsufficientStock`,
//!   `InsufficientPoints`, `InvalidAmount`, `*NotFound`): raised before
//!   anything is written.
//! - **Commit-time** (`ConcurrentStockConflict`, `Store`): raised while the
//!   unit of work is applied. The unit of work is rolled back either way.

use thiserror::Error;

use crate::store::StoreError;

// =============================================================================
// Core Error
// =============================================================================

/// Errors returned by the ledgers and the coordinators.
///
/// Every variant means the operation had **no effect**: nothing was
/// persisted, no partial stock, loyalty or debt change is visible.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Sale requested with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Credit (fiado) sale without a customer.
    #[error("A customer is required for credit sales")]
    CustomerRequired,

    /// Insufficient stock to complete the operation.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 5)
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 left"
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Redemption of more points than the customer holds.
    #[error("Insufficient points for {customer_id}: available {available}, requested {requested}")]
    InsufficientPoints {
        customer_id: String,
        available: i64,
        requested: i64,
    },

    /// Monetary amount is invalid (non-positive payment, bad discount, ...).
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Debt not found: {0}")]
    DebtNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Another writer changed the product between read and commit.
    ///
    /// The whole operation was rolled back; retrying re-reads fresh stock.
    #[error("Stock for {product_id} was changed concurrently, retry the operation")]
    ConcurrentStockConflict { product_id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Persistence failure (wraps StoreError).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// True for validation failures: the caller fixes the input and retries.
    ///
    /// Commit-time failures (`ConcurrentStockConflict`, `Store`) are not
    /// recoverable for that attempt and must be surfaced to the user.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CoreError::ConcurrentStockConflict { .. } | CoreError::Store(_)
        )
    }

    /// Reports a failed amount rule as `InvalidAmount`.
    pub(crate) fn invalid_amount(err: ValidationError) -> Self {
        CoreError::InvalidAmount {
            reason: err.to_string(),
        }
    }

    /// An amount whose arithmetic would not fit in i64 cents.
    pub(crate) fn amount_overflow(what: &str) -> Self {
        CoreError::InvalidAmount {
            reason: format!("{what} is too large"),
        }
    }

    /// True when running the same operation again may succeed unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ConcurrentStockConflict { .. }
                | CoreError::Store(StoreError::Conflict { .. })
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
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

    /// Invalid format (e.g., invalid UUID, malformed amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

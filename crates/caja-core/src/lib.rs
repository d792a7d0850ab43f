//! # caja-core: Sale-Consistency Core for Caja POS
//!
//! This crate holds the workflows that change several entities together:
//! a sale (stock, loyalty points, debt, sale record), its reversal, and
//! the receipt of purchase orders. It has zero I/O dependencies; storage
//! is reached through the [`store`] traits.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Caja POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                          UI layer                               │   │
//! │  │      Cart UI ──► Cobrar ──► Devolución ──► Pedidos               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ execute(request)                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ caja-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   Coordinators:  SaleCoordinator   RestoreCoordinator           │   │
//! │  │                  OrderReceiptCoordinator                        │   │
//! │  │   Ledgers:       inventory   loyalty   debt                     │   │
//! │  │   Basics:        types  money  cart  validation  error          │   │
//! │  │                                                                 │   │
//! │  │   Store traits ─────────── InMemoryStore (tests)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Store / UnitOfWork                     │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    caja-db (SQLite)                             │   │
//! │  │          one database transaction per unit of work              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, Customer, Debt, Order)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Workflow error taxonomy
//! - [`validation`] - Input validation
//! - [`cart`] - The cart being assembled (no side effects)
//! - [`inventory`], [`loyalty`], [`debt`] - The three ledgers
//! - [`sale`], [`restore`], [`order`] - The coordinators
//! - [`store`] - Store collaborator traits and the in-memory store
//!
//! ## Design Principles
//!
//! 1. **All-or-nothing**: every workflow runs in one unit of work; any error means no effect
//! 2. **Check, then apply**: the whole request is validated before the first write
//! 3. **Integer Money**: all monetary values are in cents (i64)
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use caja_core::{
//!     InMemoryStore, Money, PaymentMethod, Product, SaleCoordinator, SaleLine, SaleRequest,
//!     SaleSettings,
//! };
//!
//! # tokio_test_block(async {
//! let store = InMemoryStore::new();
//! let p = Product::new("Arroz 1kg", "central", Money::from_cents(420), Money::from_cents(350), 5, 2);
//! let product_id = p.id.clone();
//! store.insert_product(p).unwrap();
//!
//! let sales = SaleCoordinator::new(store.clone(), SaleSettings::default());
//! let done = sales
//!     .execute(SaleRequest {
//!         lines: vec![SaleLine::new(&product_id, 3)],
//!         payment_method: PaymentMethod::Cash,
//!         customer_id: None,
//!         discount_cents: 0,
//!         seller: "rosa".into(),
//!         branch: "central".into(),
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(done.sale.total_cents, 1260);
//! assert_eq!(done.low_stock.len(), 1); // 2 left, at the minimum
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod debt;
pub mod error;
pub mod inventory;
pub mod loyalty;
pub mod money;
pub mod order;
pub mod restore;
pub mod sale;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use caja_core::Money` instead of
// `use caja_core::money::Money`

pub use cart::{Cart, CartLine};
pub use debt::DebtLedger;
pub use error::{CoreError, CoreResult, ValidationError};
pub use inventory::{InventoryLedger, StockChange};
pub use loyalty::{Accrual, LoyaltyLedger};
pub use money::Money;
pub use order::{NewOrder, OrderReceipt, OrderReceiptCoordinator};
pub use restore::{RestoreCoordinator, RestoreRequest, RestoredSale, ReversalPolicy};
pub use sale::{CompletedSale, SaleCoordinator, SaleLine, SaleRequest};
pub use store::{Entity, InMemoryStore, Store, StoreError, StoreResult, UnitOfWork};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct products in a single cart
///
/// ## Business Reason
/// Prevents runaway carts and keeps a sale's unit of work short.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single product in a cart
///
/// ## Business Reason
/// Prevents accidental over-selling (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest single amount (price, cost, payment) accepted, in cents.
///
/// ## Business Reason
/// 1,000,000,000.00 is far beyond any bodega ticket, and keeps
/// `MAX_CART_ITEMS * MAX_ITEM_QUANTITY * MAX_AMOUNT_CENTS` inside an i64.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

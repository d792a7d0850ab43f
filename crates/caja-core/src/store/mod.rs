//! # Store Collaborators
//!
//! The interfaces the ledgers and coordinators persist through.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One workflow = one unit of work                      │
//! │                                                                         │
//! │   Store::begin() ──► Box<dyn UnitOfWork>                                │
//! │                          │                                              │
//! │                          ├── ProductStore   product / set_stock (CAS)   │
//! │                          ├── CustomerStore  customer / set_loyalty (CAS)│
//! │                          ├── DebtStore      create / append / delete    │
//! │                          ├── SaleStore      create / delete             │
//! │                          └── OrderStore     create / update / delete    │
//! │                          │                                              │
//! │               ┌──────────┴──────────┐                                   │
//! │               ▼                     ▼                                   │
//! │          commit()              drop (no commit)                         │
//! │       all writes visible       nothing visible                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock and loyalty writes carry the `version` the caller read. A write
//! against a stale version fails with [`StoreError::Conflict`], either
//! immediately or at `commit()`, depending on the backend.
//!
//! Implementations:
//! - [`memory::InMemoryStore`] (this crate): snapshot + optimistic commit
//! - `caja_db::Database` (SQLite): one database transaction per unit of work

pub mod memory;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::error::CoreError;
use crate::types::{Customer, Debt, DebtPayment, DebtStatus, Order, OrderPatch, Product, Sale};

pub use memory::InMemoryStore;

// =============================================================================
// Errors
// =============================================================================

/// Entity kinds named in store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Product,
    Customer,
    Sale,
    Debt,
    Order,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Product => "product",
            Entity::Customer => "customer",
            Entity::Sale => "sale",
            Entity::Debt => "debt",
            Entity::Order => "order",
        };
        f.write_str(name)
    }
}

/// Generic failure of a store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// The row changed since it was read (optimistic check lost).
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: Entity, id: String },

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Maps a store failure into the workflow error taxonomy.
    ///
    /// Lost version checks on products surface as `ConcurrentStockConflict`;
    /// missing rows as the matching `*NotFound`.
    pub fn into_core(self) -> CoreError {
        match self {
            StoreError::Conflict {
                entity: Entity::Product,
                id,
            } => CoreError::ConcurrentStockConflict { product_id: id },
            StoreError::NotFound { entity, id } => match entity {
                Entity::Product => CoreError::ProductNotFound(id),
                Entity::Customer => CoreError::CustomerNotFound(id),
                Entity::Sale => CoreError::SaleNotFound(id),
                Entity::Debt => CoreError::DebtNotFound(id),
                Entity::Order => CoreError::OrderNotFound(id),
            },
            other => CoreError::Store(other),
        }
    }
}

/// Convenience type alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Per-entity Stores
// =============================================================================

#[async_trait]
pub trait ProductStore: Send {
    async fn product(&mut self, id: &str) -> StoreResult<Option<Product>>;

    /// Writes `stock` if the stored version still equals `expected_version`.
    ///
    /// Returns the full updated product with its version bumped.
    async fn set_stock(
        &mut self,
        id: &str,
        expected_version: i64,
        stock: i64,
    ) -> StoreResult<Product>;
}

#[async_trait]
pub trait CustomerStore: Send {
    async fn customer(&mut self, id: &str) -> StoreResult<Option<Customer>>;

    /// Writes the loyalty account if the stored version still equals
    /// `expected_version`. Returns the updated customer.
    async fn set_loyalty(
        &mut self,
        id: &str,
        expected_version: i64,
        points: i64,
        total_spent_cents: i64,
    ) -> StoreResult<Customer>;
}

#[async_trait]
pub trait DebtStore: Send {
    async fn debt(&mut self, id: &str) -> StoreResult<Option<Debt>>;

    async fn create_debt(&mut self, debt: &Debt) -> StoreResult<()>;

    /// Appends a payment and records the recomputed status.
    async fn append_payment(
        &mut self,
        id: &str,
        payment: &DebtPayment,
        status: DebtStatus,
    ) -> StoreResult<Debt>;

    async fn delete_debt(&mut self, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait SaleStore: Send {
    async fn sale(&mut self, id: &str) -> StoreResult<Option<Sale>>;

    async fn create_sale(&mut self, sale: &Sale) -> StoreResult<()>;

    async fn delete_sale(&mut self, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderStore: Send {
    async fn order(&mut self, id: &str) -> StoreResult<Option<Order>>;

    async fn create_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn update_order(&mut self, id: &str, patch: &OrderPatch) -> StoreResult<Order>;

    async fn delete_order(&mut self, id: &str) -> StoreResult<()>;
}

// =============================================================================
// Unit of Work
// =============================================================================

/// All-or-nothing scope over every entity store.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] discards
/// every write made through it.
#[async_trait]
pub trait UnitOfWork: ProductStore + CustomerStore + DebtStore + SaleStore + OrderStore + Send {
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Factory for units of work, injected into ledgers and coordinators.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Inventory Ledger
//!
//! Owns per-product stock. Stock never goes below zero.
//!
//! ## Check, then Apply
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  StockPlan::for_decrement(uow, [(P1, 3), (P2, 1), (P1, 2)])             │
//! │                                                                         │
//! │   1. aggregate        P1 → 5, P2 → 1                                    │
//! │   2. load + check     every product, before any write                  │
//! │        P1 stock 4 < 5 ──► InsufficientStock { P1, available 4, req 5 } │
//! │                                                                         │
//! │  plan.apply(uow)                                                        │
//! │   3. set_stock(id, version, new) per product (compare-and-set)          │
//! │        stale version ──► ConcurrentStockConflict                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The coordinators use [`StockPlan`] inside their own unit of work.
//! [`InventoryLedger`] runs a single increment/decrement as its own unit.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::store::{ProductStore, Store, StoreError, UnitOfWork};
use crate::types::{Product, StockLevel};

// =============================================================================
// Stock Change
// =============================================================================

/// Result of a stock mutation: the product's full updated state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockChange {
    pub product: Product,
    pub previous_stock: i64,
    pub level: StockLevel,
}

impl StockChange {
    fn new(product: Product, previous_stock: i64) -> Self {
        let level = product.stock_level();
        StockChange {
            product,
            previous_stock,
            level,
        }
    }

    /// True when this change moved stock from above `min_stock` to at or below it.
    pub fn crossed_min_stock(&self) -> bool {
        self.previous_stock > self.product.min_stock && self.product.stock <= self.product.min_stock
    }
}

// =============================================================================
// Pure Operations
// =============================================================================

fn ensure_positive(qty: i64) -> CoreResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    Ok(())
}

/// New stock after taking `qty` units, or `InsufficientStock`.
///
/// ## Example
/// ```rust
/// use caja_core::inventory::check_decrement;
/// use caja_core::{Money, Product};
///
/// let p = Product::new("Pan francés", "central", Money::from_cents(20), Money::from_cents(12), 5, 2);
/// assert_eq!(check_decrement(&p, 3).unwrap(), 2);
/// assert!(check_decrement(&p, 6).is_err());
/// ```
pub fn check_decrement(product: &Product, qty: i64) -> CoreResult<i64> {
    ensure_positive(qty)?;
    if !product.can_sell(qty) {
        return Err(CoreError::InsufficientStock {
            product_id: product.id.clone(),
            available: product.stock,
            requested: qty,
        });
    }
    Ok(product.stock - qty)
}

/// New stock after adding `qty` units. Only fails on a non-positive quantity.
pub fn check_increment(product: &Product, qty: i64) -> CoreResult<i64> {
    ensure_positive(qty)?;
    product
        .stock
        .checked_add(qty)
        .ok_or_else(|| CoreError::InvalidAmount {
            reason: format!("stock of {} would overflow", product.id),
        })
}

/// Sums quantities per product, keeping first-seen order.
pub fn aggregate<'a, I>(lines: I) -> Vec<(String, i64)>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut totals: Vec<(String, i64)> = Vec::new();
    for (product_id, qty) in lines {
        match totals.iter_mut().find(|(id, _)| id == product_id) {
            Some((_, total)) => *total += qty,
            None => totals.push((product_id.to_string(), qty)),
        }
    }
    totals
}

// =============================================================================
// Stock Plan
// =============================================================================

#[derive(Debug, Clone)]
struct PlannedWrite {
    product: Product,
    new_stock: i64,
}

/// Stock writes that have all been checked against one snapshot.
#[derive(Debug, Clone)]
pub struct StockPlan {
    writes: Vec<PlannedWrite>,
}

impl StockPlan {
    /// Loads every product and checks every decrement before anything is written.
    pub async fn for_decrement(
        uow: &mut dyn UnitOfWork,
        demand: &[(String, i64)],
    ) -> CoreResult<Self> {
        let mut writes = Vec::with_capacity(demand.len());
        for (product_id, qty) in demand {
            let product = load_product(uow, product_id).await?;
            let new_stock = check_decrement(&product, *qty)?;
            writes.push(PlannedWrite { product, new_stock });
        }
        Ok(StockPlan { writes })
    }

    /// Loads every product before anything is written; a missing one aborts.
    pub async fn for_increment(
        uow: &mut dyn UnitOfWork,
        supply: &[(String, i64)],
    ) -> CoreResult<Self> {
        let mut writes = Vec::with_capacity(supply.len());
        for (product_id, qty) in supply {
            let product = load_product(uow, product_id).await?;
            let new_stock = check_increment(&product, *qty)?;
            writes.push(PlannedWrite { product, new_stock });
        }
        Ok(StockPlan { writes })
    }

    pub fn empty() -> Self {
        StockPlan { writes: Vec::new() }
    }

    /// The products as loaded, before any write.
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.writes.iter().map(|w| &w.product)
    }

    pub fn product(&self, product_id: &str) -> Option<&Product> {
        self.products().find(|p| p.id == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Writes every planned stock level with a version check.
    pub async fn apply(self, uow: &mut dyn UnitOfWork) -> CoreResult<Vec<StockChange>> {
        let mut changes = Vec::with_capacity(self.writes.len());
        for PlannedWrite { product, new_stock } in self.writes {
            let updated = uow
                .set_stock(&product.id, product.version, new_stock)
                .await
                .map_err(StoreError::into_core)?;
            debug!(
                product_id = %updated.id,
                previous = product.stock,
                stock = updated.stock,
                "Stock written"
            );
            changes.push(StockChange::new(updated, product.stock));
        }
        Ok(changes)
    }
}

async fn load_product(uow: &mut dyn UnitOfWork, product_id: &str) -> CoreResult<Product> {
    uow.product(product_id)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))
}

/// Logs the read-only low-stock signal for changes that need a reorder.
pub(crate) fn warn_low_stock(changes: &[StockChange]) {
    for change in changes.iter().filter(|c| c.level.needs_reorder()) {
        warn!(
            product_id = %change.product.id,
            stock = change.product.stock,
            min_stock = change.product.min_stock,
            level = ?change.level,
            "Low stock"
        );
    }
}

// =============================================================================
// Ledger Service
// =============================================================================

/// Stand-alone stock operations, each in its own unit of work.
#[derive(Debug, Clone)]
pub struct InventoryLedger<S> {
    store: S,
}

impl<S: Store> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        InventoryLedger { store }
    }

    /// Current state of a product.
    pub async fn stock(&self, product_id: &str) -> CoreResult<Product> {
        let mut uow = self.store.begin().await?;
        load_product(uow.as_mut(), product_id).await
    }

    /// Takes `qty` units out of stock.
    ///
    /// ## Errors
    /// - `InsufficientStock` if `qty` exceeds the stock at the moment of the write
    /// - `ConcurrentStockConflict` if another writer got there first
    pub async fn decrement(&self, product_id: &str, qty: i64) -> CoreResult<StockChange> {
        let mut uow = self.store.begin().await?;
        let plan = StockPlan::for_decrement(uow.as_mut(), &[(product_id.to_string(), qty)]).await?;
        let change = self.finish(uow, plan).await?;
        info!(product_id, qty, stock = change.product.stock, "Stock decremented");
        Ok(change)
    }

    /// Puts `qty` units back into stock. Never fails on stock bounds.
    pub async fn increment(&self, product_id: &str, qty: i64) -> CoreResult<StockChange> {
        let mut uow = self.store.begin().await?;
        let plan = StockPlan::for_increment(uow.as_mut(), &[(product_id.to_string(), qty)]).await?;
        let change = self.finish(uow, plan).await?;
        info!(product_id, qty, stock = change.product.stock, "Stock incremented");
        Ok(change)
    }

    async fn finish(&self, mut uow: Box<dyn UnitOfWork>, plan: StockPlan) -> CoreResult<StockChange> {
        let mut changes = plan.apply(uow.as_mut()).await?;
        uow.commit().await.map_err(StoreError::into_core)?;
        warn_low_stock(&changes);
        changes
            .pop()
            .ok_or_else(|| CoreError::Store(StoreError::Backend("empty stock plan".to_string())))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # SQLite Unit of Work
//!
//! Implements the `caja_core` store traits on top of one SQLite transaction.
//!
//! ```text
//!   Database::begin() ──► pool.begin() ──► SqliteUnitOfWork { tx }
//!                                              │
//!        reads / versioned writes ─────────────┤  all on the same connection
//!                                              │
//!        commit() ──► tx.commit()              │
//!        dropped  ──► tx rolled back ◄─────────┘
//! ```
//!
//! Version checks make lost updates visible as `StoreError::Conflict`.
//! When SQLite itself refuses the write lock (`database is locked`, or a
//! stale WAL snapshot) the failure is reported the same way, attributed
//! to the row being written.

use async_trait::async_trait;
use caja_core::store::{CustomerStore, DebtStore, OrderStore, ProductStore, SaleStore};
use caja_core::{
    Customer, Debt, DebtPayment, DebtStatus, Entity, Order, OrderPatch, Product, Sale,
    StoreError, StoreResult, UnitOfWork,
};
use sqlx::{Sqlite, Transaction};
use tracing::debug;

use crate::error::DbError;
use crate::repository::{customer, debt, order, product, sale};

/// One open SQLite transaction.
///
/// Every statement goes through `tx`; the pool is never touched while the
/// transaction is open.
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteUnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        SqliteUnitOfWork { tx }
    }
}

#[async_trait]
impl ProductStore for SqliteUnitOfWork {
    async fn product(&mut self, id: &str) -> StoreResult<Option<Product>> {
        Ok(product::fetch(&mut self.tx, id).await?)
    }

    async fn set_stock(
        &mut self,
        id: &str,
        expected_version: i64,
        stock: i64,
    ) -> StoreResult<Product> {
        product::save_stock(&mut self.tx, id, expected_version, stock)
            .await
            .map_err(|e| e.into_store_for(Entity::Product, id))
    }
}

#[async_trait]
impl CustomerStore for SqliteUnitOfWork {
    async fn customer(&mut self, id: &str) -> StoreResult<Option<Customer>> {
        Ok(customer::fetch(&mut self.tx, id).await?)
    }

    async fn set_loyalty(
        &mut self,
        id: &str,
        expected_version: i64,
        points: i64,
        total_spent_cents: i64,
    ) -> StoreResult<Customer> {
        customer::save_loyalty(&mut self.tx, id, expected_version, points, total_spent_cents)
            .await
            .map_err(|e| e.into_store_for(Entity::Customer, id))
    }
}

#[async_trait]
impl DebtStore for SqliteUnitOfWork {
    async fn debt(&mut self, id: &str) -> StoreResult<Option<Debt>> {
        Ok(debt::fetch(&mut self.tx, id).await?)
    }

    async fn create_debt(&mut self, new_debt: &Debt) -> StoreResult<()> {
        debt::insert(&mut self.tx, new_debt)
            .await
            .map_err(|e| e.into_store_for(Entity::Debt, &new_debt.id))
    }

    async fn append_payment(
        &mut self,
        id: &str,
        payment: &DebtPayment,
        status: DebtStatus,
    ) -> StoreResult<Debt> {
        debt::append_payment(&mut self.tx, id, payment, status)
            .await
            .map_err(|e| e.into_store_for(Entity::Debt, id))
    }

    async fn delete_debt(&mut self, id: &str) -> StoreResult<()> {
        Ok(debt::delete(&mut self.tx, id).await?)
    }
}

#[async_trait]
impl SaleStore for SqliteUnitOfWork {
    async fn sale(&mut self, id: &str) -> StoreResult<Option<Sale>> {
        Ok(sale::fetch(&mut self.tx, id).await?)
    }

    async fn create_sale(&mut self, new_sale: &Sale) -> StoreResult<()> {
        sale::insert(&mut self.tx, new_sale)
            .await
            .map_err(|e| e.into_store_for(Entity::Sale, &new_sale.id))
    }

    async fn delete_sale(&mut self, id: &str) -> StoreResult<()> {
        Ok(sale::delete(&mut self.tx, id).await?)
    }
}

#[async_trait]
impl OrderStore for SqliteUnitOfWork {
    async fn order(&mut self, id: &str) -> StoreResult<Option<Order>> {
        Ok(order::fetch(&mut self.tx, id).await?)
    }

    async fn create_order(&mut self, new_order: &Order) -> StoreResult<()> {
        order::insert(&mut self.tx, new_order)
            .await
            .map_err(|e| e.into_store_for(Entity::Order, &new_order.id))
    }

    async fn update_order(&mut self, id: &str, patch: &OrderPatch) -> StoreResult<Order> {
        order::update(&mut self.tx, id, patch)
            .await
            .map_err(|e| e.into_store_for(Entity::Order, id))
    }

    async fn delete_order(&mut self, id: &str) -> StoreResult<()> {
        Ok(order::delete(&mut self.tx, id).await?)
    }
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::from(DbError::from(e)))?;
        debug!("Unit of work committed");
        Ok(())
    }
}

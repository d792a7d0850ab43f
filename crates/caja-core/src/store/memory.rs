//! In-process store backed by hash maps.
//!
//! Each unit of work takes a snapshot of every table at `begin()` and
//! writes into a private copy. `commit()` checks that every row it touched
//! is still the row it started from, then publishes all of them at once.
//! A row changed by another commit in the meantime fails the whole commit
//! with [`StoreError::Conflict`].
//!
//! `begin()` copies every table, so the cost of a unit of work grows with
//! the data held. Meant for tests and examples; deployments use the SQLite
//! store in `caja-db`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    CustomerStore, DebtStore, Entity, OrderStore, ProductStore, SaleStore, Store, StoreError,
    StoreResult, UnitOfWork,
};
use crate::types::{Customer, Debt, DebtPayment, DebtStatus, Order, OrderPatch, Product, Sale};

#[derive(Debug, Clone, Default)]
struct Tables {
    products: HashMap<String, Product>,
    customers: HashMap<String, Customer>,
    sales: HashMap<String, Sale>,
    debts: HashMap<String, Debt>,
    orders: HashMap<String, Order>,
}

/// Shared in-memory tables. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Adds or replaces a product (catalog management sits outside the ledgers).
    pub fn insert_product(&self, product: Product) -> StoreResult<()> {
        self.write()?.products.insert(product.id.clone(), product);
        Ok(())
    }

    pub fn insert_customer(&self, customer: Customer) -> StoreResult<()> {
        self.write()?.customers.insert(customer.id.clone(), customer);
        Ok(())
    }

    /// Removes a product from the catalog.
    pub fn remove_product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.write()?.products.remove(id))
    }

    pub fn product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.read()?.products.get(id).cloned())
    }

    pub fn customer(&self, id: &str) -> StoreResult<Option<Customer>> {
        Ok(self.read()?.customers.get(id).cloned())
    }

    pub fn sale(&self, id: &str) -> StoreResult<Option<Sale>> {
        Ok(self.read()?.sales.get(id).cloned())
    }

    pub fn debt(&self, id: &str) -> StoreResult<Option<Debt>> {
        Ok(self.read()?.debts.get(id).cloned())
    }

    pub fn order(&self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.read()?.orders.get(id).cloned())
    }

    /// Debts of a customer, oldest first.
    pub fn debts_for_customer(&self, customer_id: &str) -> StoreResult<Vec<Debt>> {
        let tables = self.read()?;
        let mut debts: Vec<Debt> = tables
            .debts
            .values()
            .filter(|d| d.customer_id == customer_id)
            .cloned()
            .collect();
        debts.sort_by_key(|d| d.created_at);
        Ok(debts)
    }

    pub fn sale_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.sales.len())
    }

    pub fn debt_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.debts.len())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let base = self.read()?.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            shared: Arc::clone(&self.tables),
            work: base.clone(),
            base,
        }))
    }
}

// =============================================================================
// Unit of Work
// =============================================================================

/// Snapshot-isolated unit of work over [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    shared: Arc<RwLock<Tables>>,
    base: Tables,
    work: Tables,
}

/// Keys whose row differs between `base` and `work` (inserted, updated or removed).
fn touched<V: PartialEq>(base: &HashMap<String, V>, work: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = work
        .iter()
        .filter(|(k, v)| base.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .chain(base.keys().filter(|k| !work.contains_key(*k)).cloned())
        .collect();
    keys.sort();
    keys
}

fn verify<V: PartialEq>(
    entity: Entity,
    keys: &[String],
    base: &HashMap<String, V>,
    shared: &HashMap<String, V>,
) -> StoreResult<()> {
    for key in keys {
        if base.get(key) != shared.get(key) {
            return Err(StoreError::Conflict {
                entity,
                id: key.clone(),
            });
        }
    }
    Ok(())
}

fn publish<V: Clone>(keys: &[String], work: &HashMap<String, V>, shared: &mut HashMap<String, V>) {
    for key in keys {
        match work.get(key) {
            Some(row) => {
                shared.insert(key.clone(), row.clone());
            }
            None => {
                shared.remove(key);
            }
        }
    }
}

#[async_trait]
impl ProductStore for InMemoryUnitOfWork {
    async fn product(&mut self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.work.products.get(id).cloned())
    }

    async fn set_stock(
        &mut self,
        id: &str,
        expected_version: i64,
        stock: i64,
    ) -> StoreResult<Product> {
        let product = self
            .work
            .products
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Product,
                id: id.to_string(),
            })?;
        if product.version != expected_version {
            return Err(StoreError::Conflict {
                entity: Entity::Product,
                id: id.to_string(),
            });
        }
        if stock < 0 {
            return Err(StoreError::Backend(format!(
                "stock of {id} cannot be negative ({stock})"
            )));
        }
        product.stock = stock;
        product.version += 1;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }
}

#[async_trait]
impl CustomerStore for InMemoryUnitOfWork {
    async fn customer(&mut self, id: &str) -> StoreResult<Option<Customer>> {
        Ok(self.work.customers.get(id).cloned())
    }

    async fn set_loyalty(
        &mut self,
        id: &str,
        expected_version: i64,
        points: i64,
        total_spent_cents: i64,
    ) -> StoreResult<Customer> {
        let customer = self
            .work
            .customers
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Customer,
                id: id.to_string(),
            })?;
        if customer.version != expected_version {
            return Err(StoreError::Conflict {
                entity: Entity::Customer,
                id: id.to_string(),
            });
        }
        customer.points = points;
        customer.total_spent_cents = total_spent_cents;
        customer.version += 1;
        customer.updated_at = Utc::now();
        Ok(customer.clone())
    }
}

#[async_trait]
impl DebtStore for InMemoryUnitOfWork {
    async fn debt(&mut self, id: &str) -> StoreResult<Option<Debt>> {
        Ok(self.work.debts.get(id).cloned())
    }

    async fn create_debt(&mut self, debt: &Debt) -> StoreResult<()> {
        if self.work.debts.contains_key(&debt.id) {
            return Err(StoreError::Conflict {
                entity: Entity::Debt,
                id: debt.id.clone(),
            });
        }
        self.work.debts.insert(debt.id.clone(), debt.clone());
        Ok(())
    }

    async fn append_payment(
        &mut self,
        id: &str,
        payment: &DebtPayment,
        status: DebtStatus,
    ) -> StoreResult<Debt> {
        let debt = self
            .work
            .debts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Debt,
                id: id.to_string(),
            })?;
        debt.payments.push(payment.clone());
        debt.status = status;
        debt.updated_at = payment.paid_at;
        Ok(debt.clone())
    }

    async fn delete_debt(&mut self, id: &str) -> StoreResult<()> {
        self.work
            .debts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Debt,
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl SaleStore for InMemoryUnitOfWork {
    async fn sale(&mut self, id: &str) -> StoreResult<Option<Sale>> {
        Ok(self.work.sales.get(id).cloned())
    }

    async fn create_sale(&mut self, sale: &Sale) -> StoreResult<()> {
        if self.work.sales.contains_key(&sale.id) {
            return Err(StoreError::Conflict {
                entity: Entity::Sale,
                id: sale.id.clone(),
            });
        }
        self.work.sales.insert(sale.id.clone(), sale.clone());
        Ok(())
    }

    async fn delete_sale(&mut self, id: &str) -> StoreResult<()> {
        self.work
            .sales
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Sale,
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl OrderStore for InMemoryUnitOfWork {
    async fn order(&mut self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.work.orders.get(id).cloned())
    }

    async fn create_order(&mut self, order: &Order) -> StoreResult<()> {
        if self.work.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict {
                entity: Entity::Order,
                id: order.id.clone(),
            });
        }
        self.work.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn update_order(&mut self, id: &str, patch: &OrderPatch) -> StoreResult<Order> {
        let order = self
            .work
            .orders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Order,
                id: id.to_string(),
            })?;
        patch.apply_to(order, Utc::now());
        Ok(order.clone())
    }

    async fn delete_order(&mut self, id: &str) -> StoreResult<()> {
        self.work
            .orders
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                entity: Entity::Order,
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryUnitOfWork { shared, base, work } = *self;

        let products = touched(&base.products, &work.products);
        let customers = touched(&base.customers, &work.customers);
        let sales = touched(&base.sales, &work.sales);
        let debts = touched(&base.debts, &work.debts);
        let orders = touched(&base.orders, &work.orders);

        let mut tables = shared
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        // Every check before any write.
        verify(Entity::Product, &products, &base.products, &tables.products)?;
        verify(Entity::Customer, &customers, &base.customers, &tables.customers)?;
        verify(Entity::Sale, &sales, &base.sales, &tables.sales)?;
        verify(Entity::Debt, &debts, &base.debts, &tables.debts)?;
        verify(Entity::Order, &orders, &base.orders, &tables.orders)?;

        publish(&products, &work.products, &mut tables.products);
        publish(&customers, &work.customers, &mut tables.customers);
        publish(&sales, &work.sales, &mut tables.sales);
        publish(&debts, &work.debts, &mut tables.debts);
        publish(&orders, &work.orders, &mut tables.orders);

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Sale Reversal (Restore) Coordinator
//!
//! Puts a sale's stock back and removes the sale, all-or-nothing.
//!
//! ```text
//!   RestoreRequest { sale_id, policy }
//!        │
//!        ▼
//!   load sale ─────────────► SaleNotFound
//!   load every product ────► ProductNotFound  (nothing restored)
//!   Full: load customer ───► CustomerNotFound
//!        │
//!        ▼  one unit of work
//!   increment stock ─► [Full] adjust loyalty ─► [Full] delete debt ─► delete sale
//! ```
//!
//! The caller picks the [`ReversalPolicy`]; there is no default.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::inventory::{aggregate, StockPlan};
use crate::loyalty;
use crate::store::{DebtStore, SaleStore, Store, StoreError};
use crate::types::{Customer, Debt, Product, Sale};

/// How much of a sale's effect a restore undoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReversalPolicy {
    /// Restore stock and delete the sale. Points and debt are left as they are.
    StockOnly,
    /// Also take back the points and spend it added, and delete its debt.
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestoreRequest {
    pub sale_id: String,
    pub policy: ReversalPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestoredSale {
    /// The deleted sale.
    pub sale: Sale,
    /// Updated state of every restocked product.
    pub products: Vec<Product>,
    /// Updated loyalty account (`Full` with a customer only).
    pub customer: Option<Customer>,
    /// The debt that was deleted, if any.
    pub debt_removed: Option<Debt>,
}

#[derive(Debug, Clone)]
pub struct RestoreCoordinator<S> {
    store: S,
}

impl<S: Store> RestoreCoordinator<S> {
    pub fn new(store: S) -> Self {
        RestoreCoordinator { store }
    }

    pub async fn execute(&self, request: RestoreRequest) -> CoreResult<RestoredSale> {
        let result = self.restore(&request).await;
        if let Err(err) = &result {
            warn!(sale_id = %request.sale_id, error = %err, "Sale restore rejected");
        }
        result
    }

    async fn restore(&self, request: &RestoreRequest) -> CoreResult<RestoredSale> {
        let mut uow = self.store.begin().await?;

        let sale = uow
            .sale(&request.sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(request.sale_id.clone()))?;

        let supply = aggregate(sale.items.iter().map(|i| (i.product_id.as_str(), i.quantity)));
        let plan = StockPlan::for_increment(uow.as_mut(), &supply).await?;

        let full = request.policy == ReversalPolicy::Full;
        let customer = match (full, sale.customer_id.as_deref()) {
            (true, Some(id)) => Some(loyalty::load_customer(uow.as_mut(), id).await?),
            _ => None,
        };
        let debt = match (full, sale.debt_id.as_deref()) {
            // A debt deleted by hand since the sale is simply gone already.
            (true, Some(id)) => uow.debt(id).await?,
            _ => None,
        };

        let changes = plan.apply(uow.as_mut()).await?;

        let customer = match customer {
            Some(customer) => {
                let adjusted =
                    loyalty::adjust(&customer, -sale.total(), -sale.points_earned);
                Some(loyalty::save(uow.as_mut(), &adjusted).await?)
            }
            None => None,
        };

        if let Some(debt) = &debt {
            uow.delete_debt(&debt.id)
                .await
                .map_err(StoreError::into_core)?;
        }

        uow.delete_sale(&sale.id)
            .await
            .map_err(StoreError::into_core)?;
        uow.commit().await.map_err(StoreError::into_core)?;

        info!(
            sale_id = %sale.id,
            policy = ?request.policy,
            products = changes.len(),
            points_reversed = customer.as_ref().map(|_| sale.points_earned).unwrap_or(0),
            debt_id = ?debt.as_ref().map(|d| d.id.as_str()),
            "Sale restored"
        );

        Ok(RestoredSale {
            sale,
            products: changes.into_iter().map(|c| c.product).collect(),
            customer,
            debt_removed: debt,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryLedger;
    use crate::money::Money;
    use crate::sale::{SaleCoordinator, SaleLine, SaleRequest};
    use crate::store::InMemoryStore;
    use crate::test_support::{add_customer, add_product, stock_of};
    use crate::types::{PaymentMethod, SaleSettings};

    async fn sell(
        store: &InMemoryStore,
        lines: Vec<SaleLine>,
        method: PaymentMethod,
        customer: Option<&str>,
    ) -> Sale {
        SaleCoordinator::new(store.clone(), SaleSettings::default())
            .execute(SaleRequest {
                lines,
                payment_method: method,
                customer_id: customer.map(str::to_string),
                discount_cents: 0,
                seller: "rosa".to_string(),
                branch: "central".to_string(),
            })
            .await
            .unwrap()
            .sale
    }

    fn restore(sale_id: &str, policy: ReversalPolicy) -> RestoreRequest {
        RestoreRequest {
            sale_id: sale_id.to_string(),
            policy,
        }
    }

    #[tokio::test]
    async fn test_stock_only_restores_stock_and_keeps_points() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 10, 1);
        let b = add_product(&store, 4, 1);
        let c = add_customer(&store);
        let sale = sell(
            &store,
            vec![SaleLine::new(&a, 3), SaleLine::new(&b, 4)],
            PaymentMethod::Fiado,
            Some(&c),
        )
        .await;
        let points_after_sale = store.customer(&c).unwrap().unwrap().points;

        let restored = RestoreCoordinator::new(store.clone())
            .execute(restore(&sale.id, ReversalPolicy::StockOnly))
            .await
            .unwrap();

        assert_eq!(restored.products.len(), 2);
        assert!(restored.customer.is_none());
        assert!(restored.debt_removed.is_none());
        assert_eq!(stock_of(&store, &a), 10);
        assert_eq!(stock_of(&store, &b), 4);
        assert!(store.sale(&sale.id).unwrap().is_none());
        assert_eq!(store.customer(&c).unwrap().unwrap().points, points_after_sale);
        assert_eq!(store.debt_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_full_reverses_loyalty_and_debt() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 20, 1);
        let c = add_customer(&store);
        let sale = sell(&store, vec![SaleLine::new(&p, 10)], PaymentMethod::Fiado, Some(&c)).await;
        assert_eq!(sale.points_earned, 15);

        let restored = RestoreCoordinator::new(store.clone())
            .execute(restore(&sale.id, ReversalPolicy::Full))
            .await
            .unwrap();

        let customer = restored.customer.unwrap();
        assert_eq!(customer.points, 0);
        assert_eq!(customer.total_spent_cents, 0);
        assert_eq!(restored.debt_removed.map(|d| d.id), sale.debt_id);
        assert_eq!(store.debt_count().unwrap(), 0);
        assert_eq!(stock_of(&store, &p), 20);
    }

    #[tokio::test]
    async fn test_full_clamps_spent_points() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 20, 1);
        let c = add_customer(&store);
        let sale = sell(&store, vec![SaleLine::new(&p, 10)], PaymentMethod::Cash, Some(&c)).await;

        crate::loyalty::LoyaltyLedger::new(store.clone())
            .redeem(&c, 10)
            .await
            .unwrap();

        let restored = RestoreCoordinator::new(store.clone())
            .execute(restore(&sale.id, ReversalPolicy::Full))
            .await
            .unwrap();
        assert_eq!(restored.customer.unwrap().points, 0);
        assert!(restored.debt_removed.is_none());
    }

    #[tokio::test]
    async fn test_missing_product_aborts_restore() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 10, 1);
        let b = add_product(&store, 10, 1);
        let sale = sell(
            &store,
            vec![SaleLine::new(&a, 2), SaleLine::new(&b, 2)],
            PaymentMethod::Cash,
            None,
        )
        .await;
        store.remove_product(&b).unwrap();

        let err = RestoreCoordinator::new(store.clone())
            .execute(restore(&sale.id, ReversalPolicy::StockOnly))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ProductNotFound(id) if id == b));
        assert_eq!(stock_of(&store, &a), 8);
        assert!(store.sale(&sale.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_sale() {
        let store = InMemoryStore::new();
        let err = RestoreCoordinator::new(store)
            .execute(restore("nope", ReversalPolicy::Full))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SaleNotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_then_redecrement_is_identity() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 9, 1);
        let b = add_product(&store, 7, 1);
        let sale = sell(
            &store,
            vec![SaleLine::new(&a, 4), SaleLine::new(&b, 2), SaleLine::new(&a, 1)],
            PaymentMethod::Yape,
            None,
        )
        .await;
        let before = (stock_of(&store, &a), stock_of(&store, &b));
        assert_eq!(before, (4, 5));

        RestoreCoordinator::new(store.clone())
            .execute(restore(&sale.id, ReversalPolicy::StockOnly))
            .await
            .unwrap();
        assert_eq!((stock_of(&store, &a), stock_of(&store, &b)), (9, 7));

        let inventory = InventoryLedger::new(store.clone());
        for item in &sale.items {
            inventory.decrement(&item.product_id, item.quantity).await.unwrap();
        }
        assert_eq!((stock_of(&store, &a), stock_of(&store, &b)), before);
        assert_eq!(sale.total(), Money::from_cents(150 * 7));
    }
}

//! # Order Receipt Coordinator
//!
//! Purchase orders add stock while they are `recibido`.
//!
//! ## Stock Effect of a Status Change
//! ```text
//! ┌───────────────────────┬───────────────────────┬────────────────────────┐
//! │ from \ to             │ recibido              │ pendiente / cancelado  │
//! ├───────────────────────┼───────────────────────┼────────────────────────┤
//! │ (new order)           │ + every item          │ nothing                │
//! │ pendiente / cancelado │ + every item          │ nothing                │
//! │ recibido              │ nothing               │ − every item (checked) │
//! │ (delete)              │ −  every item (checked) if it was recibido      │
//! └───────────────────────┴───────────────────────┴────────────────────────┘
//! ```
//!
//! A decrement that would drive any product negative fails the whole
//! operation with `InsufficientStock`; the order keeps its state.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::inventory::{aggregate, StockChange, StockPlan};
use crate::store::{OrderStore, Store, StoreError, UnitOfWork};
use crate::types::{Order, OrderItem, OrderPatch, OrderStatus};
use crate::validation::{validate_branch, validate_price_cents, validate_quantity};

// =============================================================================
// Request / Result
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewOrder {
    pub branch: String,
    pub supplier: Option<String>,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub notes: Option<String>,
}

/// An order after a coordinator operation, with the stock it moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderReceipt {
    pub order: Order,
    pub stock_changes: Vec<StockChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StockEffect {
    None,
    Receive,
    Unreceive,
}

impl StockEffect {
    fn between(from: OrderStatus, to: OrderStatus) -> Self {
        match (from.is_received(), to.is_received()) {
            (false, true) => StockEffect::Receive,
            (true, false) => StockEffect::Unreceive,
            _ => StockEffect::None,
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrderReceiptCoordinator<S> {
    store: S,
}

impl<S: Store> OrderReceiptCoordinator<S> {
    pub fn new(store: S) -> Self {
        OrderReceiptCoordinator { store }
    }

    /// Creates an order; one created as `recibido` adds its stock at once.
    pub async fn create(&self, new_order: NewOrder) -> CoreResult<OrderReceipt> {
        validate_new_order(&new_order)?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            branch: new_order.branch,
            supplier: new_order.supplier,
            items: new_order.items,
            status: new_order.status,
            notes: new_order.notes,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await?;
        let effect = if order.status.is_received() {
            StockEffect::Receive
        } else {
            StockEffect::None
        };
        let plan = plan_for(uow.as_mut(), &order, effect).await?;
        let stock_changes = plan.apply(uow.as_mut()).await?;
        uow.create_order(&order)
            .await
            .map_err(StoreError::into_core)?;
        uow.commit().await.map_err(StoreError::into_core)?;

        info!(
            order_id = %order.id,
            status = ?order.status,
            items = order.items.len(),
            "Order created"
        );
        Ok(OrderReceipt {
            order,
            stock_changes,
        })
    }

    /// Applies a typed partial update, moving stock if the status crosses `recibido`.
    pub async fn update(&self, order_id: &str, patch: OrderPatch) -> CoreResult<OrderReceipt> {
        let result = self.apply_patch(order_id, &patch).await;
        if let Err(err) = &result {
            warn!(order_id, error = %err, "Order update rejected");
        }
        result
    }

    /// Moves the order to `status`. Same status again is a no-op for stock.
    pub async fn transition(&self, order_id: &str, status: OrderStatus) -> CoreResult<OrderReceipt> {
        self.update(order_id, OrderPatch::status(status)).await
    }

    /// Deletes an order, taking its stock back out first if it was received.
    pub async fn delete(&self, order_id: &str) -> CoreResult<OrderReceipt> {
        let mut uow = self.store.begin().await?;
        let order = load_order(uow.as_mut(), order_id).await?;

        let effect = if order.status.is_received() {
            StockEffect::Unreceive
        } else {
            StockEffect::None
        };
        let plan = plan_for(uow.as_mut(), &order, effect).await?;
        let stock_changes = plan.apply(uow.as_mut()).await?;
        uow.delete_order(order_id)
            .await
            .map_err(StoreError::into_core)?;
        uow.commit().await.map_err(StoreError::into_core)?;

        info!(order_id, status = ?order.status, "Order deleted");
        Ok(OrderReceipt {
            order,
            stock_changes,
        })
    }

    async fn apply_patch(&self, order_id: &str, patch: &OrderPatch) -> CoreResult<OrderReceipt> {
        let mut uow = self.store.begin().await?;
        let order = load_order(uow.as_mut(), order_id).await?;

        let target = patch.status.unwrap_or(order.status);
        let effect = StockEffect::between(order.status, target);
        let plan = plan_for(uow.as_mut(), &order, effect).await?;
        let stock_changes = plan.apply(uow.as_mut()).await?;

        let updated = uow
            .update_order(order_id, patch)
            .await
            .map_err(StoreError::into_core)?;
        uow.commit().await.map_err(StoreError::into_core)?;

        info!(
            order_id,
            from = ?order.status,
            to = ?updated.status,
            products = stock_changes.len(),
            "Order updated"
        );
        Ok(OrderReceipt {
            order: updated,
            stock_changes,
        })
    }
}

fn validate_new_order(order: &NewOrder) -> CoreResult<()> {
    validate_branch(&order.branch)?;
    if order.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        }
        .into());
    }
    for item in &order.items {
        validate_quantity(item.quantity)?;
        validate_price_cents(item.unit_cost_cents).map_err(CoreError::invalid_amount)?;
    }
    Ok(())
}

async fn load_order(uow: &mut dyn UnitOfWork, order_id: &str) -> CoreResult<Order> {
    uow.order(order_id)
        .await?
        .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))
}

/// Checks the whole stock effect of `order` before anything is written.
async fn plan_for(
    uow: &mut dyn UnitOfWork,
    order: &Order,
    effect: StockEffect,
) -> CoreResult<StockPlan> {
    let quantities = aggregate(order.items.iter().map(|i| (i.product_id.as_str(), i.quantity)));
    match effect {
        StockEffect::None => Ok(StockPlan::empty()),
        StockEffect::Receive => StockPlan::for_increment(uow, &quantities).await,
        StockEffect::Unreceive => StockPlan::for_decrement(uow, &quantities).await,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryLedger;
    use crate::store::InMemoryStore;
    use crate::test_support::{add_product, stock_of};

    fn new_order(items: Vec<(&str, i64)>, status: OrderStatus) -> NewOrder {
        NewOrder {
            branch: "central".to_string(),
            supplier: Some("Distribuidora Lima".to_string()),
            items: items
                .into_iter()
                .map(|(id, quantity)| OrderItem {
                    product_id: id.to_string(),
                    quantity,
                    unit_cost_cents: 100,
                })
                .collect(),
            status,
            notes: None,
        }
    }

    #[test]
    fn test_stock_effect() {
        use OrderStatus::*;
        assert_eq!(StockEffect::between(Pending, Received), StockEffect::Receive);
        assert_eq!(StockEffect::between(Cancelled, Received), StockEffect::Receive);
        assert_eq!(StockEffect::between(Received, Pending), StockEffect::Unreceive);
        assert_eq!(StockEffect::between(Received, Cancelled), StockEffect::Unreceive);
        assert_eq!(StockEffect::between(Received, Received), StockEffect::None);
        assert_eq!(StockEffect::between(Pending, Cancelled), StockEffect::None);
    }

    #[tokio::test]
    async fn test_receipt_round_trip() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 3, 1);
        let b = add_product(&store, 0, 1);
        let orders = OrderReceiptCoordinator::new(store.clone());

        let created = orders
            .create(new_order(vec![(a.as_str(), 12), (b.as_str(), 6)], OrderStatus::Pending))
            .await
            .unwrap();
        assert!(created.stock_changes.is_empty());
        assert_eq!((stock_of(&store, &a), stock_of(&store, &b)), (3, 0));

        let id = created.order.id;
        let received = orders.transition(&id, OrderStatus::Received).await.unwrap();
        assert_eq!(received.order.status, OrderStatus::Received);
        assert_eq!((stock_of(&store, &a), stock_of(&store, &b)), (15, 6));

        // Same status again: applied exactly once.
        orders.transition(&id, OrderStatus::Received).await.unwrap();
        assert_eq!((stock_of(&store, &a), stock_of(&store, &b)), (15, 6));

        orders.transition(&id, OrderStatus::Pending).await.unwrap();
        assert_eq!((stock_of(&store, &a), stock_of(&store, &b)), (3, 0));
    }

    #[tokio::test]
    async fn test_unreceive_with_sold_stock_fails_whole_transition() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 0, 1);
        let b = add_product(&store, 0, 1);
        let orders = OrderReceiptCoordinator::new(store.clone());

        let id = orders
            .create(new_order(vec![(a.as_str(), 5), (b.as_str(), 5)], OrderStatus::Received))
            .await
            .unwrap()
            .order
            .id;
        assert_eq!((stock_of(&store, &a), stock_of(&store, &b)), (5, 5));

        InventoryLedger::new(store.clone()).decrement(b.as_str(), 2).await.unwrap();

        let err = orders.transition(&id, OrderStatus::Cancelled).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { product_id, available: 3, requested: 5 } if product_id == b
        ));
        assert_eq!((stock_of(&store, &a), stock_of(&store, &b)), (5, 3));
        assert_eq!(store.order(&id).unwrap().unwrap().status, OrderStatus::Received);
    }

    #[tokio::test]
    async fn test_delete_received_order() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 2, 1);
        let orders = OrderReceiptCoordinator::new(store.clone());

        let id = orders
            .create(new_order(vec![(a.as_str(), 4)], OrderStatus::Received))
            .await
            .unwrap()
            .order
            .id;
        InventoryLedger::new(store.clone()).decrement(a.as_str(), 3).await.unwrap();

        let err = orders.delete(&id).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));
        assert!(store.order(&id).unwrap().is_some());

        InventoryLedger::new(store.clone()).increment(a.as_str(), 1).await.unwrap();
        let deleted = orders.delete(&id).await.unwrap();
        assert_eq!(deleted.stock_changes.len(), 1);
        assert_eq!(stock_of(&store, &a), 0);
        assert!(store.order(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_pending_order_leaves_stock() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 2, 1);
        let orders = OrderReceiptCoordinator::new(store.clone());

        let id = orders
            .create(new_order(vec![(a.as_str(), 4)], OrderStatus::Pending))
            .await
            .unwrap()
            .order
            .id;
        let deleted = orders.delete(&id).await.unwrap();
        assert!(deleted.stock_changes.is_empty());
        assert_eq!(stock_of(&store, &a), 2);
    }

    #[tokio::test]
    async fn test_patch_fields_and_repeated_items() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 0, 1);
        let orders = OrderReceiptCoordinator::new(store.clone());

        let id = orders
            .create(new_order(vec![(a.as_str(), 2), (a.as_str(), 3)], OrderStatus::Pending))
            .await
            .unwrap()
            .order
            .id;

        let patch = OrderPatch {
            status: Some(OrderStatus::Received),
            supplier: None,
            notes: Some("faltó una caja".to_string()),
        };
        let receipt = orders.update(&id, patch).await.unwrap();
        assert_eq!(receipt.order.notes.as_deref(), Some("faltó una caja"));
        assert_eq!(receipt.order.supplier.as_deref(), Some("Distribuidora Lima"));
        assert_eq!(receipt.stock_changes.len(), 1);
        assert_eq!(stock_of(&store, &a), 5);
    }

    #[tokio::test]
    async fn test_received_order_with_unknown_product() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 1, 1);
        let orders = OrderReceiptCoordinator::new(store.clone());

        let err = orders
            .create(new_order(vec![(a.as_str(), 1), ("ghost", 1)], OrderStatus::Received))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ProductNotFound(_)));
        assert_eq!(stock_of(&store, &a), 1);

        assert!(matches!(
            orders.transition("ghost-order", OrderStatus::Received).await,
            Err(CoreError::OrderNotFound(_))
        ));
        assert!(orders
            .create(new_order(vec![], OrderStatus::Pending))
            .await
            .is_err());
    }
}

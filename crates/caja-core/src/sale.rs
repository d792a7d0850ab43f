//! # Sale Transaction Coordinator
//!
//! Turns a cart into a committed sale, or fails with no side effects.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Draft ──► Validating ──────────────────────────────► Committed        │
//! │   (Cart)        │                                         ▲             │
//! │                 │ 1. cart non-empty       EmptyCart       │             │
//! │                 │ 2. fiado has customer   CustomerRequired│             │
//! │                 │ 3. whole cart in stock  InsufficientStock             │
//! │                 │    discount ≤ subtotal  InvalidAmount   │             │
//! │                 │                                         │             │
//! │                 ▼                                         │             │
//! │             Rejected ◄──── any failure ──── commit (one unit of work)   │
//! │          (no side effects)                  a. stock     (CAS)          │
//! │                                             b. loyalty   (customer)     │
//! │                                             c. debt      (fiado)        │
//! │                                             d. sale record              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is re-checked at the moment of the write: a product whose version
//! moved since it was read fails the whole sale with
//! `ConcurrentStockConflict`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::debt;
use crate::error::{CoreError, CoreResult};
use crate::inventory::{aggregate, warn_low_stock, StockPlan};
use crate::loyalty;
use crate::money::Money;
use crate::store::{DebtStore, SaleStore, Store, StoreError};
use crate::types::{Customer, Debt, PaymentMethod, Product, Sale, SaleItem, SaleSettings};
use crate::validation::{
    validate_branch, validate_cart_size, validate_discount, validate_price_cents,
    validate_quantity, validate_seller,
};

// =============================================================================
// Request / Result
// =============================================================================

/// One requested line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: i64,
    /// Price frozen in the cart; `None` uses the product's price at commit.
    pub unit_price_cents: Option<i64>,
}

impl SaleLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        SaleLine {
            product_id: product_id.into(),
            quantity,
            unit_price_cents: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRequest {
    pub lines: Vec<SaleLine>,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<String>,
    pub discount_cents: i64,
    pub seller: String,
    pub branch: String,
}

/// A committed sale and everything it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompletedSale {
    pub sale: Sale,
    /// 0 when no customer was selected.
    pub points_earned: i64,
    /// Present iff the sale was fiado.
    pub debt: Option<Debt>,
    /// The customer's updated loyalty account.
    pub customer: Option<Customer>,
    /// Products left at or below their minimum stock.
    pub low_stock: Vec<Product>,
}

// =============================================================================
// Coordinator
// =============================================================================

#[derive(Debug, Clone)]
pub struct SaleCoordinator<S> {
    store: S,
    settings: SaleSettings,
}

impl<S: Store> SaleCoordinator<S> {
    pub fn new(store: S, settings: SaleSettings) -> Self {
        SaleCoordinator { store, settings }
    }

    pub fn settings(&self) -> &SaleSettings {
        &self.settings
    }

    /// Validates and commits a sale in one unit of work.
    ///
    /// ## Errors
    /// Validation (nothing was attempted): `EmptyCart`, `CustomerRequired`,
    /// `InsufficientStock`, `InvalidAmount`, `ProductNotFound`,
    /// `CustomerNotFound`, `Validation`.
    /// Commit-time (rolled back): `ConcurrentStockConflict`, `Store`.
    pub async fn execute(&self, request: SaleRequest) -> CoreResult<CompletedSale> {
        let result = self.commit(request).await;
        if let Err(err) = &result {
            warn!(error = %err, recoverable = err.is_recoverable(), "Sale rejected");
        }
        result
    }

    async fn commit(&self, request: SaleRequest) -> CoreResult<CompletedSale> {
        validate_shape(&request)?;

        let mut uow = self.store.begin().await?;

        // Validating: everything is read and checked before the first write.
        let demand = aggregate(
            request
                .lines
                .iter()
                .map(|l| (l.product_id.as_str(), l.quantity)),
        );
        let plan = StockPlan::for_decrement(uow.as_mut(), &demand).await?;

        let items = request
            .lines
            .iter()
            .map(|line| snapshot_item(line, &plan))
            .collect::<CoreResult<Vec<_>>>()?;
        let subtotal = Money::checked_sum(items.iter().map(SaleItem::line_total))
            .ok_or_else(|| CoreError::amount_overflow("sale subtotal"))?;
        validate_discount(request.discount_cents, subtotal.cents())
            .map_err(CoreError::invalid_amount)?;
        let discount = Money::from_cents(request.discount_cents);
        let total = subtotal - discount;

        let customer = match request.customer_id.as_deref() {
            Some(id) => Some(loyalty::load_customer(uow.as_mut(), id).await?),
            None => None,
        };

        // Committed: fixed order stock → loyalty → debt → sale.
        let sale_id = Uuid::new_v4().to_string();
        let changes = plan.apply(uow.as_mut()).await?;

        let (customer, points_earned) = match customer {
            Some(customer) => {
                let accrual = loyalty::accrue(&customer, total, self.settings.points_rate)?;
                let saved = loyalty::save(uow.as_mut(), &accrual.customer).await?;
                (Some(saved), accrual.points_earned)
            }
            None => (None, 0),
        };

        let debt = match (request.payment_method.is_credit(), &customer) {
            (true, Some(customer)) => {
                let debt = debt::open(&customer.id, Some(sale_id.as_str()), items.clone(), total)?;
                uow.create_debt(&debt).await.map_err(StoreError::into_core)?;
                Some(debt)
            }
            (true, None) => return Err(CoreError::CustomerRequired),
            (false, _) => None,
        };

        let sale = Sale {
            id: sale_id,
            branch: request.branch,
            seller: request.seller,
            customer_id: request.customer_id,
            payment_method: request.payment_method,
            items,
            subtotal_cents: subtotal.cents(),
            discount_cents: discount.cents(),
            total_cents: total.cents(),
            points_earned,
            debt_id: debt.as_ref().map(|d| d.id.clone()),
            created_at: Utc::now(),
        };
        uow.create_sale(&sale).await.map_err(StoreError::into_core)?;

        uow.commit().await.map_err(StoreError::into_core)?;

        info!(
            sale_id = %sale.id,
            branch = %sale.branch,
            payment_method = %sale.payment_method,
            total_cents = sale.total_cents,
            lines = sale.items.len(),
            customer_id = ?sale.customer_id,
            points_earned,
            debt_id = ?sale.debt_id,
            "Sale committed"
        );
        warn_low_stock(&changes);

        let low_stock = changes
            .into_iter()
            .filter(|c| c.level.needs_reorder())
            .map(|c| c.product)
            .collect();

        Ok(CompletedSale {
            sale,
            points_earned,
            debt,
            customer,
            low_stock,
        })
    }
}

/// Checks that need no stored state, in the order the cashier sees them.
fn validate_shape(request: &SaleRequest) -> CoreResult<()> {
    if request.lines.is_empty() {
        return Err(CoreError::EmptyCart);
    }
    let has_customer = request
        .customer_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());
    if request.payment_method.is_credit() && !has_customer {
        return Err(CoreError::CustomerRequired);
    }
    validate_cart_size(request.lines.len())?;
    for line in &request.lines {
        validate_quantity(line.quantity)?;
        if let Some(price) = line.unit_price_cents {
            validate_price_cents(price).map_err(CoreError::invalid_amount)?;
        }
    }
    validate_seller(&request.seller)?;
    validate_branch(&request.branch)?;
    Ok(())
}

/// Freezes name, price and the product's current cost into a sale item.
fn snapshot_item(line: &SaleLine, plan: &StockPlan) -> CoreResult<SaleItem> {
    let product = plan
        .product(&line.product_id)
        .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
    let unit_price = Money::from_cents(line.unit_price_cents.unwrap_or(product.price_cents));
    let line_total = unit_price
        .checked_mul(line.quantity)
        .ok_or_else(|| CoreError::amount_overflow("line total"))?;
    Ok(SaleItem {
        product_id: product.id.clone(),
        name_snapshot: product.name.clone(),
        quantity: line.quantity,
        unit_price_cents: unit_price.cents(),
        unit_cost_cents: product.cost_cents,
        line_total_cents: line_total.cents(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, ProductStore, StoreResult, UnitOfWork};
    use crate::test_support::{add_customer, add_product, product, stock_of};
    use crate::types::{DebtStatus, PointsRate};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn request(lines: Vec<SaleLine>, method: PaymentMethod, customer: Option<&str>) -> SaleRequest {
        SaleRequest {
            lines,
            payment_method: method,
            customer_id: customer.map(str::to_string),
            discount_cents: 0,
            seller: "rosa".to_string(),
            branch: "central".to_string(),
        }
    }

    fn coordinator(store: &InMemoryStore) -> SaleCoordinator<InMemoryStore> {
        SaleCoordinator::new(store.clone(), SaleSettings::default())
    }

    #[tokio::test]
    async fn test_empty_cart() {
        let store = InMemoryStore::new();
        let err = coordinator(&store)
            .execute(request(vec![], PaymentMethod::Cash, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptyCart));
    }

    #[tokio::test]
    async fn test_fiado_requires_customer() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 5, 1);
        let err = coordinator(&store)
            .execute(request(vec![SaleLine::new(&p, 1)], PaymentMethod::Fiado, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CustomerRequired));
        assert_eq!(stock_of(&store, &p), 5);
    }

    #[tokio::test]
    async fn test_cash_sale_creates_no_debt() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 10, 2);

        for method in [
            PaymentMethod::Cash,
            PaymentMethod::Card,
            PaymentMethod::Transfer,
            PaymentMethod::Yape,
        ] {
            let done = coordinator(&store)
                .execute(request(vec![SaleLine::new(&p, 1)], method, None))
                .await
                .unwrap();
            assert!(done.debt.is_none());
            assert!(done.sale.debt_id.is_none());
            assert_eq!(done.points_earned, 0);
        }
        assert_eq!(store.debt_count().unwrap(), 0);
        assert_eq!(store.sale_count().unwrap(), 4);
        assert_eq!(stock_of(&store, &p), 6);
    }

    #[tokio::test]
    async fn test_fiado_sale_opens_one_debt_for_total() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 10, 2);
        let c = add_customer(&store);

        let mut req = request(vec![SaleLine::new(&p, 4)], PaymentMethod::Fiado, Some(&c));
        req.discount_cents = 50;
        let done = coordinator(&store).execute(req).await.unwrap();

        assert_eq!(done.sale.subtotal_cents, 600);
        assert_eq!(done.sale.total_cents, 550);
        let debt = done.debt.unwrap();
        assert_eq!(debt.total_cents, done.sale.total_cents);
        assert_eq!(debt.status, DebtStatus::Pending);
        assert_eq!(debt.sale_id.as_deref(), Some(done.sale.id.as_str()));
        assert_eq!(done.sale.debt_id.as_deref(), Some(debt.id.as_str()));

        let debts = store.debts_for_customer(&c).unwrap();
        assert_eq!(debts.len(), 1);
        assert_eq!(debts[0].total_cents, 550);
    }

    #[tokio::test]
    async fn test_points_accrue_on_total_after_discount() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 10, 2);
        let c = add_customer(&store);

        let mut req = request(
            vec![SaleLine {
                product_id: p.clone(),
                quantity: 1,
                unit_price_cents: Some(2099),
            }],
            PaymentMethod::Cash,
            Some(&c),
        );
        req.discount_cents = 100;
        let done = coordinator(&store).execute(req).await.unwrap();

        assert_eq!(done.sale.total_cents, 1999);
        assert_eq!(done.points_earned, 19);
        assert_eq!(done.sale.points_earned, 19);
        let customer = store.customer(&c).unwrap().unwrap();
        assert_eq!(customer.points, 19);
        assert_eq!(customer.total_spent_cents, 1999);
    }

    #[tokio::test]
    async fn test_points_rate_from_settings() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 10, 2);
        let c = add_customer(&store);
        let settings = SaleSettings {
            points_rate: PointsRate::from_bps(5_000),
            ..SaleSettings::default()
        };

        let done = SaleCoordinator::new(store.clone(), settings)
            .execute(request(vec![SaleLine::new(&p, 10)], PaymentMethod::Cash, Some(&c)))
            .await
            .unwrap();
        assert_eq!(done.sale.total_cents, 1500);
        assert_eq!(done.points_earned, 7);
    }

    #[tokio::test]
    async fn test_all_or_nothing_cart() {
        let store = InMemoryStore::new();
        let a = add_product(&store, 10, 1);
        let b = add_product(&store, 1, 1);
        let c = add_customer(&store);

        let err = coordinator(&store)
            .execute(request(
                vec![SaleLine::new(&a, 2), SaleLine::new(&b, 3)],
                PaymentMethod::Fiado,
                Some(&c),
            ))
            .await
            .unwrap_err();

        match err {
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => {
                assert_eq!(product_id, b);
                assert_eq!(available, 1);
                assert_eq!(requested, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stock_of(&store, &a), 10);
        assert_eq!(stock_of(&store, &b), 1);
        assert_eq!(store.customer(&c).unwrap().unwrap().points, 0);
        assert_eq!(store.debt_count().unwrap(), 0);
        assert_eq!(store.sale_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sell_down_to_min_stock() {
        let store = InMemoryStore::new();
        let p1 = add_product(&store, 5, 2);
        let sales = coordinator(&store);

        let done = sales
            .execute(request(vec![SaleLine::new(&p1, 3)], PaymentMethod::Cash, None))
            .await
            .unwrap();
        assert_eq!(stock_of(&store, &p1), 2);
        assert_eq!(done.low_stock.len(), 1);
        assert_eq!(done.low_stock[0].id, p1);

        let err = sales
            .execute(request(vec![SaleLine::new(&p1, 3)], PaymentMethod::Cash, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 2, requested: 3, .. }
        ));
        assert_eq!(stock_of(&store, &p1), 2);
    }

    #[tokio::test]
    async fn test_repeated_lines_are_checked_together() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 5, 0);

        let err = coordinator(&store)
            .execute(request(
                vec![SaleLine::new(&p, 3), SaleLine::new(&p, 3)],
                PaymentMethod::Cash,
                None,
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 5, requested: 6, .. }
        ));
        assert_eq!(stock_of(&store, &p), 5);
    }

    #[tokio::test]
    async fn test_snapshot_freezes_price_and_cost() {
        let store = InMemoryStore::new();
        let mut p = product("Atún Florida", 650, 480, 10, 2);
        p.price_cents = 700;
        let id = p.id.clone();
        store.insert_product(p).unwrap();

        let done = coordinator(&store)
            .execute(request(
                vec![SaleLine {
                    product_id: id.clone(),
                    quantity: 2,
                    unit_price_cents: Some(650),
                }],
                PaymentMethod::Card,
                None,
            ))
            .await
            .unwrap();

        let item = &done.sale.items[0];
        assert_eq!(item.name_snapshot, "Atún Florida");
        assert_eq!(item.unit_price_cents, 650);
        assert_eq!(item.unit_cost_cents, 480);
        assert_eq!(item.line_total_cents, 1300);
        assert_eq!(store.sale(&done.sale.id).unwrap().unwrap(), done.sale);
    }

    #[tokio::test]
    async fn test_invalid_discount_and_unknown_entities() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 5, 0);
        let sales = coordinator(&store);

        let mut req = request(vec![SaleLine::new(&p, 1)], PaymentMethod::Cash, None);
        req.discount_cents = 151;
        assert!(matches!(
            sales.execute(req.clone()).await,
            Err(CoreError::InvalidAmount { .. })
        ));
        req.discount_cents = -1;
        assert!(matches!(
            sales.execute(req).await,
            Err(CoreError::InvalidAmount { .. })
        ));

        assert!(matches!(
            sales
                .execute(request(vec![SaleLine::new("ghost", 1)], PaymentMethod::Cash, None))
                .await,
            Err(CoreError::ProductNotFound(_))
        ));
        assert!(matches!(
            sales
                .execute(request(
                    vec![SaleLine::new(&p, 1)],
                    PaymentMethod::Fiado,
                    Some("ghost")
                ))
                .await,
            Err(CoreError::CustomerNotFound(_))
        ));
        assert_eq!(stock_of(&store, &p), 5);
        assert_eq!(store.sale_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_line_total_overflow_is_invalid_amount() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 5, 0);
        let sales = coordinator(&store);

        let huge = SaleLine {
            product_id: p.clone(),
            quantity: 3,
            unit_price_cents: Some(i64::MAX / 2),
        };
        let err = sales
            .execute(request(vec![huge], PaymentMethod::Cash, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount { .. }));

        // A stored price that was never validated overflows at snapshot time.
        let pricey = product("Caja fuerte", i64::MAX / 2, 0, 10, 0);
        let pricey_id = pricey.id.clone();
        store.insert_product(pricey).unwrap();
        let err = sales
            .execute(request(vec![SaleLine::new(&pricey_id, 3)], PaymentMethod::Cash, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount { .. }));

        assert_eq!(stock_of(&store, &p), 5);
        assert_eq!(stock_of(&store, &pricey_id), 10);
        assert_eq!(store.sale_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subtotal_overflow_is_invalid_amount() {
        let store = InMemoryStore::new();
        let a = product("Lingote A", i64::MAX / 2 + 1, 0, 10, 0);
        let b = product("Lingote B", i64::MAX / 2 + 1, 0, 10, 0);
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        store.insert_product(a).unwrap();
        store.insert_product(b).unwrap();

        let err = coordinator(&store)
            .execute(request(
                vec![SaleLine::new(&a_id, 1), SaleLine::new(&b_id, 1)],
                PaymentMethod::Cash,
                None,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount { .. }));
        assert_eq!(stock_of(&store, &a_id), 10);
        assert_eq!(stock_of(&store, &b_id), 10);
    }

    #[tokio::test]
    async fn test_invalid_quantity() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 5, 0);
        let err = coordinator(&store)
            .execute(request(vec![SaleLine::new(&p, 0)], PaymentMethod::Cash, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.is_recoverable());
    }

    /// Commits a rival stock change right after the sale's unit of work begins.
    struct RacingStore {
        inner: InMemoryStore,
        product_id: String,
        raced: AtomicBool,
    }

    #[async_trait]
    impl Store for RacingStore {
        async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
            let uow = self.inner.begin().await?;
            if !self.raced.swap(true, Ordering::SeqCst) {
                let mut rival = self.inner.begin().await?;
                let p = rival
                    .product(&self.product_id)
                    .await?
                    .expect("seeded product");
                rival
                    .set_stock(&self.product_id, p.version, p.stock - 1)
                    .await?;
                rival.commit().await?;
            }
            Ok(uow)
        }
    }

    #[tokio::test]
    async fn test_concurrent_change_aborts_whole_sale() {
        let inner = InMemoryStore::new();
        let p = add_product(&inner, 5, 0);
        let c = add_customer(&inner);
        let racing = RacingStore {
            inner: inner.clone(),
            product_id: p.clone(),
            raced: AtomicBool::new(false),
        };
        let sales = SaleCoordinator::new(racing, SaleSettings::default());
        let req = request(vec![SaleLine::new(&p, 2)], PaymentMethod::Fiado, Some(&c));

        let err = sales.execute(req.clone()).await.unwrap_err();
        assert!(matches!(
            &err,
            CoreError::ConcurrentStockConflict { product_id } if *product_id == p
        ));
        assert!(!err.is_recoverable());

        // Only the rival's change is visible.
        assert_eq!(stock_of(&inner, &p), 4);
        assert_eq!(inner.customer(&c).unwrap().unwrap().points, 0);
        assert_eq!(inner.debt_count().unwrap(), 0);
        assert_eq!(inner.sale_count().unwrap(), 0);

        // A retry reads fresh stock and goes through.
        sales.execute(req).await.unwrap();
        assert_eq!(stock_of(&inner, &p), 2);
        assert_eq!(inner.debt_count().unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_never_oversell() {
        let store = InMemoryStore::new();
        let p = add_product(&store, 10, 0);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let sales = coordinator(&store);
            let req = request(vec![SaleLine::new(&p, 3)], PaymentMethod::Cash, None);
            handles.push(tokio::spawn(async move { sales.execute(req).await }));
        }

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(done) => sold += done.sale.total_quantity(),
                Err(CoreError::InsufficientStock { .. })
                | Err(CoreError::ConcurrentStockConflict { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert!(sold <= 10);
        assert_eq!(stock_of(&store, &p), 10 - sold);
        assert_eq!(store.sale_count().unwrap() as i64, sold / 3);
    }
}

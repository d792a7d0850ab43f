//! # Loyalty Account
//!
//! Per-customer points (`points`) and lifetime spend (`total_spent_cents`).
//!
//! | Operation | On shortfall                          |
//! |-----------|---------------------------------------|
//! | `accrue`  | n/a (amount must be ≥ 0)              |
//! | `redeem`  | fails with `InsufficientPoints`       |
//! | `adjust`  | clamps both fields at zero            |
//!
//! Points always truncate: 19.99 spent at 1 point per unit earns 19.

use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::store::{CustomerStore, Store, StoreError, UnitOfWork};
use crate::types::{Customer, PointsRate};

/// Result of an accrual: the updated account and what it earned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Accrual {
    pub customer: Customer,
    pub points_earned: i64,
}

// =============================================================================
// Pure Operations
// =============================================================================

/// Credits points for `amount_spent` and adds it to lifetime spend.
///
/// ## Example
/// ```rust
/// use caja_core::loyalty::accrue;
/// use caja_core::{Customer, Money, PointsRate};
///
/// let customer = Customer::new("Doña Carmen", "central");
/// let accrual = accrue(&customer, Money::from_cents(1999), PointsRate::per_unit(1)).unwrap();
/// assert_eq!(accrual.points_earned, 19);
/// assert_eq!(accrual.customer.points, 19);
/// assert_eq!(accrual.customer.total_spent_cents, 1999);
/// ```
pub fn accrue(customer: &Customer, amount_spent: Money, rate: PointsRate) -> CoreResult<Accrual> {
    if amount_spent.is_negative() {
        return Err(CoreError::InvalidAmount {
            reason: format!("amount spent cannot be negative ({amount_spent})"),
        });
    }
    let points_earned = rate.points_for(amount_spent);
    let mut updated = customer.clone();
    updated.points = customer
        .points
        .checked_add(points_earned)
        .ok_or_else(|| CoreError::amount_overflow("points balance"))?;
    updated.total_spent_cents = customer
        .total_spent()
        .checked_add(amount_spent)
        .ok_or_else(|| CoreError::amount_overflow("total spent"))?
        .cents();
    Ok(Accrual {
        customer: updated,
        points_earned,
    })
}

/// Spends `points`; fails without change if the customer holds fewer.
pub fn redeem(customer: &Customer, points: i64) -> CoreResult<Customer> {
    if points <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "points".to_string(),
        }
        .into());
    }
    if points > customer.points {
        return Err(CoreError::InsufficientPoints {
            customer_id: customer.id.clone(),
            available: customer.points,
            requested: points,
        });
    }
    let mut updated = customer.clone();
    updated.points -= points;
    Ok(updated)
}

/// Manual correction. Deltas may be negative; results clamp at zero.
pub fn adjust(customer: &Customer, delta_spent: Money, delta_points: i64) -> Customer {
    let mut updated = customer.clone();
    updated.total_spent_cents = customer
        .total_spent()
        .saturating_add(delta_spent)
        .floor_zero()
        .cents();
    updated.points = customer.points.saturating_add(delta_points).max(0);
    updated
}

/// Writes the loyalty fields of `updated`, checked against the version read.
pub(crate) async fn save(uow: &mut dyn UnitOfWork, updated: &Customer) -> CoreResult<Customer> {
    uow.set_loyalty(
        &updated.id,
        updated.version,
        updated.points,
        updated.total_spent_cents,
    )
    .await
    .map_err(StoreError::into_core)
}

pub(crate) async fn load_customer(uow: &mut dyn UnitOfWork, customer_id: &str) -> CoreResult<Customer> {
    uow.customer(customer_id)
        .await?
        .ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()))
}

// =============================================================================
// Ledger Service
// =============================================================================

/// Stand-alone loyalty operations, each in its own unit of work.
#[derive(Debug, Clone)]
pub struct LoyaltyLedger<S> {
    store: S,
}

impl<S: Store> LoyaltyLedger<S> {
    pub fn new(store: S) -> Self {
        LoyaltyLedger { store }
    }

    pub async fn account(&self, customer_id: &str) -> CoreResult<Customer> {
        let mut uow = self.store.begin().await?;
        load_customer(uow.as_mut(), customer_id).await
    }

    pub async fn accrue(
        &self,
        customer_id: &str,
        amount_spent: Money,
        rate: PointsRate,
    ) -> CoreResult<Accrual> {
        let mut uow = self.store.begin().await?;
        let customer = load_customer(uow.as_mut(), customer_id).await?;
        let accrual = accrue(&customer, amount_spent, rate)?;
        let saved = save(uow.as_mut(), &accrual.customer).await?;
        uow.commit().await.map_err(StoreError::into_core)?;

        info!(
            customer_id,
            amount_cents = amount_spent.cents(),
            points_earned = accrual.points_earned,
            points = saved.points,
            "Points accrued"
        );
        Ok(Accrual {
            customer: saved,
            points_earned: accrual.points_earned,
        })
    }

    pub async fn redeem(&self, customer_id: &str, points: i64) -> CoreResult<Customer> {
        let mut uow = self.store.begin().await?;
        let customer = load_customer(uow.as_mut(), customer_id).await?;
        let updated = redeem(&customer, points)?;
        let saved = save(uow.as_mut(), &updated).await?;
        uow.commit().await.map_err(StoreError::into_core)?;

        info!(customer_id, points, remaining = saved.points, "Points redeemed");
        Ok(saved)
    }

    pub async fn adjust(
        &self,
        customer_id: &str,
        delta_spent: Money,
        delta_points: i64,
    ) -> CoreResult<Customer> {
        let mut uow = self.store.begin().await?;
        let customer = load_customer(uow.as_mut(), customer_id).await?;
        let updated = adjust(&customer, delta_spent, delta_points);
        let saved = save(uow.as_mut(), &updated).await?;
        uow.commit().await.map_err(StoreError::into_core)?;

        info!(
            customer_id,
            delta_spent_cents = delta_spent.cents(),
            delta_points,
            points = saved.points,
            "Loyalty adjusted"
        );
        Ok(saved)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn customer_with(points: i64, spent_cents: i64) -> Customer {
        let mut c = Customer::new("Don Julio", "central");
        c.points = points;
        c.total_spent_cents = spent_cents;
        c
    }

    #[test]
    fn test_accrue_floors_points() {
        let c = customer_with(0, 0);
        let accrual = accrue(&c, Money::from_cents(1999), PointsRate::per_unit(1)).unwrap();
        assert_eq!(accrual.points_earned, 19);
        assert_eq!(accrual.customer.points, 19);
        assert_eq!(accrual.customer.total_spent_cents, 1999);
    }

    #[test]
    fn test_accrue_overflow_is_invalid_amount() {
        let rich = customer_with(0, i64::MAX);
        assert!(matches!(
            accrue(&rich, Money::from_cents(1), PointsRate::default()),
            Err(CoreError::InvalidAmount { .. })
        ));

        let hoarder = customer_with(i64::MAX, 0);
        assert!(matches!(
            accrue(&hoarder, Money::from_cents(100), PointsRate::default()),
            Err(CoreError::InvalidAmount { .. })
        ));

        let adjusted = adjust(&rich, Money::from_cents(1), i64::MAX);
        assert_eq!(adjusted.total_spent_cents, i64::MAX);
    }

    #[test]
    fn test_accrue_rejects_negative() {
        let c = customer_with(0, 0);
        assert!(matches!(
            accrue(&c, Money::from_cents(-1), PointsRate::default()),
            Err(CoreError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_redeem() {
        let c = customer_with(30, 5000);
        assert_eq!(redeem(&c, 30).unwrap().points, 0);
        assert!(matches!(
            redeem(&c, 31),
            Err(CoreError::InsufficientPoints { available: 30, requested: 31, .. })
        ));
        assert!(redeem(&c, 0).is_err());
    }

    #[test]
    fn test_adjust_clamps_at_zero() {
        let c = customer_with(10, 1500);
        let adjusted = adjust(&c, Money::from_cents(-2000), -25);
        assert_eq!(adjusted.points, 0);
        assert_eq!(adjusted.total_spent_cents, 0);

        let adjusted = adjust(&c, Money::from_cents(500), 5);
        assert_eq!(adjusted.points, 15);
        assert_eq!(adjusted.total_spent_cents, 2000);
    }

    #[tokio::test]
    async fn test_ledger_accrue_persists() {
        let store = InMemoryStore::new();
        let c = customer_with(0, 0);
        let id = c.id.clone();
        store.insert_customer(c).unwrap();
        let ledger = LoyaltyLedger::new(store.clone());

        let accrual = ledger
            .accrue(&id, Money::from_cents(1999), PointsRate::per_unit(1))
            .await
            .unwrap();
        assert_eq!(accrual.points_earned, 19);

        let stored = store.customer(&id).unwrap().unwrap();
        assert_eq!(stored.points, 19);
        assert_eq!(stored.total_spent_cents, 1999);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_ledger_redeem_insufficient_has_no_effect() {
        let store = InMemoryStore::new();
        let c = customer_with(5, 700);
        let id = c.id.clone();
        store.insert_customer(c).unwrap();
        let ledger = LoyaltyLedger::new(store.clone());

        assert!(ledger.redeem(&id, 6).await.is_err());
        assert_eq!(ledger.account(&id).await.unwrap().points, 5);

        assert_eq!(ledger.redeem(&id, 5).await.unwrap().points, 0);
        assert!(matches!(
            ledger.redeem("nobody", 1).await,
            Err(CoreError::CustomerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ledger_adjust() {
        let store = InMemoryStore::new();
        let c = customer_with(8, 800);
        let id = c.id.clone();
        store.insert_customer(c).unwrap();
        let ledger = LoyaltyLedger::new(store);

        let c = ledger.adjust(&id, Money::from_cents(-1000), -3).await.unwrap();
        assert_eq!(c.points, 5);
        assert_eq!(c.total_spent_cents, 0);
    }
}

//! # Debt Ledger
//!
//! Balances owed by customers for credit (fiado) sales.
//!
//! ## Status
//! ```text
//!   open(total)              apply_payment(amount > 0)
//!  ─────────────► pendiente ──────────────────────────► pagado
//!                  │    ▲      sum(payments) >= total
//!                  └────┘
//!           sum(payments) < total
//! ```
//!
//! `status == Paid` iff the sum of payments covers the total. A debt opened
//! for a zero total is therefore already paid.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::store::{CustomerStore, DebtStore, Store, StoreError};
use crate::types::{Debt, DebtPayment, DebtStatus, OverpaymentPolicy, SaleItem};
use crate::validation::validate_payment_amount;

// =============================================================================
// Pure Operations
// =============================================================================

/// Builds a new debt for `customer_id` (not yet persisted).
pub fn open(
    customer_id: &str,
    sale_id: Option<&str>,
    items: Vec<SaleItem>,
    total: Money,
) -> CoreResult<Debt> {
    if total.is_negative() {
        return Err(CoreError::InvalidAmount {
            reason: format!("debt total cannot be negative ({total})"),
        });
    }
    let now = Utc::now();
    Ok(Debt {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        sale_id: sale_id.map(str::to_string),
        items,
        total_cents: total.cents(),
        payments: Vec::new(),
        status: DebtStatus::for_amounts(Money::zero(), total),
        created_at: now,
        updated_at: now,
    })
}

/// Validates a payment and returns it with the status it leads to.
///
/// ## Example
/// ```rust
/// use caja_core::debt::{apply_payment, open};
/// use caja_core::{DebtStatus, Money, OverpaymentPolicy};
///
/// let debt = open("c1", None, vec![], Money::from_cents(10000)).unwrap();
/// let (payment, status) =
///     apply_payment(&debt, Money::from_cents(6000), OverpaymentPolicy::Accept).unwrap();
/// assert_eq!(payment.amount_cents, 6000);
/// assert_eq!(status, DebtStatus::Pending);
/// ```
pub fn apply_payment(
    debt: &Debt,
    amount: Money,
    policy: OverpaymentPolicy,
) -> CoreResult<(DebtPayment, DebtStatus)> {
    validate_payment_amount(amount.cents()).map_err(CoreError::invalid_amount)?;
    let paid = debt
        .paid()
        .checked_add(amount)
        .ok_or_else(|| CoreError::amount_overflow("total paid"))?;
    if policy == OverpaymentPolicy::Reject && paid > debt.total() {
        return Err(CoreError::InvalidAmount {
            reason: format!(
                "payment of {amount} exceeds remaining balance {}",
                debt.remaining()
            ),
        });
    }
    let payment = DebtPayment {
        amount_cents: amount.cents(),
        paid_at: Utc::now(),
    };
    Ok((payment, DebtStatus::for_amounts(paid, debt.total())))
}

// =============================================================================
// Ledger Service
// =============================================================================

/// Stand-alone debt operations, each in its own unit of work.
#[derive(Debug, Clone)]
pub struct DebtLedger<S> {
    store: S,
    policy: OverpaymentPolicy,
}

impl<S: Store> DebtLedger<S> {
    pub fn new(store: S, policy: OverpaymentPolicy) -> Self {
        DebtLedger { store, policy }
    }

    pub async fn get(&self, debt_id: &str) -> CoreResult<Debt> {
        let mut uow = self.store.begin().await?;
        uow.debt(debt_id)
            .await?
            .ok_or_else(|| CoreError::DebtNotFound(debt_id.to_string()))
    }

    /// Opens a debt not tied to a sale (e.g. carried over from a notebook).
    pub async fn open(
        &self,
        customer_id: &str,
        items: Vec<SaleItem>,
        total: Money,
    ) -> CoreResult<Debt> {
        let mut uow = self.store.begin().await?;
        if uow.customer(customer_id).await?.is_none() {
            return Err(CoreError::CustomerNotFound(customer_id.to_string()));
        }
        let debt = open(customer_id, None, items, total)?;
        uow.create_debt(&debt).await?;
        uow.commit().await.map_err(StoreError::into_core)?;

        info!(debt_id = %debt.id, customer_id, total_cents = debt.total_cents, "Debt opened");
        Ok(debt)
    }

    /// Records a payment and recomputes the status.
    pub async fn apply_payment(&self, debt_id: &str, amount: Money) -> CoreResult<Debt> {
        let mut uow = self.store.begin().await?;
        let debt = uow
            .debt(debt_id)
            .await?
            .ok_or_else(|| CoreError::DebtNotFound(debt_id.to_string()))?;
        let (payment, status) = apply_payment(&debt, amount, self.policy)?;
        let updated = uow
            .append_payment(debt_id, &payment, status)
            .await
            .map_err(StoreError::into_core)?;
        uow.commit().await.map_err(StoreError::into_core)?;

        if updated.overpaid().is_positive() {
            warn!(
                debt_id,
                overpaid_cents = updated.overpaid().cents(),
                "Debt overpaid"
            );
        }
        info!(
            debt_id,
            amount_cents = amount.cents(),
            remaining_cents = updated.remaining().cents(),
            status = ?updated.status,
            "Debt payment applied"
        );
        Ok(updated)
    }

    /// Removes a debt. The originating sale, if any, is left untouched.
    pub async fn delete(&self, debt_id: &str) -> CoreResult<()> {
        let mut uow = self.store.begin().await?;
        uow.delete_debt(debt_id)
            .await
            .map_err(StoreError::into_core)?;
        uow.commit().await.map_err(StoreError::into_core)?;

        info!(debt_id, "Debt deleted");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::Customer;

    fn ledger(policy: OverpaymentPolicy) -> (DebtLedger<InMemoryStore>, String) {
        let store = InMemoryStore::new();
        let customer = Customer::new("Sra. Quispe", "central");
        let id = customer.id.clone();
        store.insert_customer(customer).unwrap();
        (DebtLedger::new(store, policy), id)
    }

    #[test]
    fn test_open_status() {
        let debt = open("c1", Some("s1"), vec![], Money::from_cents(500)).unwrap();
        assert_eq!(debt.status, DebtStatus::Pending);
        assert_eq!(debt.sale_id.as_deref(), Some("s1"));

        let free = open("c1", None, vec![], Money::zero()).unwrap();
        assert_eq!(free.status, DebtStatus::Paid);

        assert!(open("c1", None, vec![], Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_apply_payment_rejects_non_positive() {
        let debt = open("c1", None, vec![], Money::from_cents(500)).unwrap();
        for cents in [0, -100] {
            assert!(matches!(
                apply_payment(&debt, Money::from_cents(cents), OverpaymentPolicy::Accept),
                Err(CoreError::InvalidAmount { .. })
            ));
        }
    }

    #[test]
    fn test_reject_policy() {
        let debt = open("c1", None, vec![], Money::from_cents(500)).unwrap();
        assert!(apply_payment(&debt, Money::from_cents(501), OverpaymentPolicy::Reject).is_err());
        let (_, status) =
            apply_payment(&debt, Money::from_cents(500), OverpaymentPolicy::Reject).unwrap();
        assert_eq!(status, DebtStatus::Paid);
    }

    #[tokio::test]
    async fn test_payments_scenario() {
        let (ledger, customer_id) = ledger(OverpaymentPolicy::Accept);
        let debt = ledger
            .open(&customer_id, vec![], Money::from_cents(10000))
            .await
            .unwrap();

        let debt = ledger.apply_payment(&debt.id, Money::from_cents(6000)).await.unwrap();
        assert_eq!(debt.status, DebtStatus::Pending);
        assert_eq!(debt.remaining(), Money::from_cents(4000));

        let debt = ledger.apply_payment(&debt.id, Money::from_cents(4000)).await.unwrap();
        assert_eq!(debt.status, DebtStatus::Paid);
        assert_eq!(debt.remaining(), Money::zero());

        let debt = ledger.apply_payment(&debt.id, Money::from_cents(1000)).await.unwrap();
        assert_eq!(debt.status, DebtStatus::Paid);
        assert_eq!(debt.remaining(), Money::zero());
        assert_eq!(debt.overpaid(), Money::from_cents(1000));
        assert_eq!(debt.payments.len(), 3);
    }

    #[test]
    fn test_total_paid_overflow_is_invalid_amount() {
        let mut debt = open("c1", None, vec![], Money::from_cents(500)).unwrap();
        debt.payments.push(DebtPayment {
            amount_cents: i64::MAX,
            paid_at: Utc::now(),
        });
        assert!(matches!(
            apply_payment(&debt, Money::from_cents(1), OverpaymentPolicy::Accept),
            Err(CoreError::InvalidAmount { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_payment_is_rejected() {
        let (ledger, customer_id) = ledger(OverpaymentPolicy::Accept);
        let debt = ledger
            .open(&customer_id, vec![], Money::from_cents(10000))
            .await
            .unwrap();

        assert!(matches!(
            ledger.apply_payment(&debt.id, Money::from_cents(i64::MAX)).await,
            Err(CoreError::InvalidAmount { .. })
        ));
        let debt = ledger
            .apply_payment(&debt.id, Money::from_cents(crate::MAX_AMOUNT_CENTS))
            .await
            .unwrap();
        assert_eq!(debt.status, DebtStatus::Paid);
        assert_eq!(debt.payments.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_overpayment_leaves_debt() {
        let (ledger, customer_id) = ledger(OverpaymentPolicy::Reject);
        let debt = ledger
            .open(&customer_id, vec![], Money::from_cents(10000))
            .await
            .unwrap();
        ledger.apply_payment(&debt.id, Money::from_cents(10000)).await.unwrap();

        assert!(matches!(
            ledger.apply_payment(&debt.id, Money::from_cents(1000)).await,
            Err(CoreError::InvalidAmount { .. })
        ));
        assert_eq!(ledger.get(&debt.id).await.unwrap().payments.len(), 1);
    }

    #[tokio::test]
    async fn test_open_requires_customer_and_delete() {
        let (ledger, customer_id) = ledger(OverpaymentPolicy::Accept);
        assert!(matches!(
            ledger.open("ghost", vec![], Money::from_cents(100)).await,
            Err(CoreError::CustomerNotFound(_))
        ));

        let debt = ledger.open(&customer_id, vec![], Money::from_cents(100)).await.unwrap();
        ledger.delete(&debt.id).await.unwrap();
        assert!(matches!(ledger.get(&debt.id).await, Err(CoreError::DebtNotFound(_))));
        assert!(matches!(ledger.delete(&debt.id).await, Err(CoreError::DebtNotFound(_))));
    }
}

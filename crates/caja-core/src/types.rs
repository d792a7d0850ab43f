//! # Domain Types
//!
//! Core domain types used throughout Caja POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Customer     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  stock (≥ 0)    │   │  items (≥ 1)    │   │  points (≥ 0)   │       │
//! │  │  min_stock      │   │  payment_method │   │  total_spent    │       │
//! │  │  version (CAS)  │   │  total          │   │  version (CAS)  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Debt       │   │     Order       │   │   PointsRate    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  total          │   │  items          │   │  bps (u32)      │       │
//! │  │  payments       │   │  status         │   │  10000 = 1 pt   │       │
//! │  │  status         │   │  (pendiente ... │   │  per unit       │       │
//! │  └─────────────────┘   │   recibido)     │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Names
//! Enum values keep the names the UI and the stored data use:
//! `efectivo | tarjeta | transferencia | yape | fiado`, `pendiente | pagado`,
//! `pendiente | recibido | cancelado`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Points Rate
// =============================================================================

/// Loyalty points earned per currency unit, in basis points.
///
/// ## Why Basis Points?
/// 10000 bps = 1 point per unit, 5000 bps = half a point per unit.
/// Keeps the accrual formula in integers (see [`Money::points_earned`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PointsRate(u32);

impl PointsRate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        PointsRate(bps)
    }

    /// Whole points per currency unit.
    #[inline]
    pub const fn per_unit(points: u32) -> Self {
        PointsRate(points * 10_000)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Points earned for spending `amount`, floored.
    #[inline]
    pub fn points_for(&self, amount: Money) -> i64 {
        amount.points_earned(*self)
    }

    /// Zero rate (loyalty disabled).
    #[inline]
    pub const fn zero() -> Self {
        PointsRate(0)
    }
}

impl Default for PointsRate {
    /// One point per currency unit.
    fn default() -> Self {
        PointsRate::per_unit(1)
    }
}

/// Parses a decimal rate such as `"1"`, `"0.5"` or `"1.25"`.
impl FromStr for PointsRate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hundredths = s.parse::<Money>()?.cents();
        if hundredths < 0 {
            return Err(ValidationError::OutOfRange {
                field: "points_per_unit".to_string(),
                min: 0,
                max: i64::from(u32::MAX / 100),
            });
        }
        let bps = u32::try_from(hundredths * 100).map_err(|_| ValidationError::OutOfRange {
            field: "points_per_unit".to_string(),
            min: 0,
            max: i64::from(u32::MAX / 100),
        })?;
        Ok(PointsRate(bps))
    }
}

// =============================================================================
// Settings
// =============================================================================

/// What the debt ledger does with a payment that exceeds the remaining balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentPolicy {
    /// Record it; `remaining()` floors at zero and `overpaid()` reports the excess.
    #[default]
    Accept,
    /// Fail with `InvalidAmount`.
    Reject,
}

/// Branch-level knobs consumed by the ledgers and coordinators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleSettings {
    pub points_rate: PointsRate,
    pub overpayment: OverpaymentPolicy,
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale (and the unit of the inventory ledger).
///
/// `stock` is only ever changed through [`crate::inventory`] operations and
/// never goes below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to the cashier and frozen into sale items.
    pub name: String,

    /// Branch (sucursal) this product is stocked at.
    pub branch: String,

    /// Units on hand.
    pub stock: i64,

    /// Reorder threshold (stock mínimo).
    pub min_stock: i64,

    /// Sale price in cents.
    pub price_cents: i64,

    /// Current cost in cents (snapshotted into sale items).
    pub cost_cents: i64,

    /// Optimistic concurrency counter, bumped on every stock write.
    pub version: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new product with a generated ID.
    pub fn new(
        name: impl Into<String>,
        branch: impl Into<String>,
        price: Money,
        cost: Money,
        stock: i64,
        min_stock: i64,
    ) -> Self {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            branch: branch.into(),
            stock,
            min_stock,
            price_cents: price.cents(),
            cost_cents: cost.cents(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the cost as a Money type.
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Checks if `quantity` units can be taken from stock.
    #[inline]
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }

    /// Where the stock sits relative to the reorder threshold.
    pub fn stock_level(&self) -> StockLevel {
        StockLevel::classify(self.stock, self.min_stock)
    }
}

// =============================================================================
// Stock Level
// =============================================================================

/// Read-only low-stock signal derived from `stock` and `min_stock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    /// Above the reorder threshold.
    InStock,
    /// At or below the reorder threshold, but not empty.
    Low,
    /// Nothing left.
    OutOfStock,
}

impl StockLevel {
    pub fn classify(stock: i64, min_stock: i64) -> Self {
        if stock <= 0 {
            StockLevel::OutOfStock
        } else if stock <= min_stock {
            StockLevel::Low
        } else {
            StockLevel::InStock
        }
    }

    /// True for `Low` and `OutOfStock`.
    pub fn needs_reorder(&self) -> bool {
        !matches!(self, StockLevel::InStock)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A customer with a loyalty account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub branch: String,
    /// Accumulated loyalty points (puntos), never negative.
    pub points: i64,
    /// Lifetime spend in cents (totalGastado), never negative.
    pub total_spent_cents: i64,
    /// Optimistic concurrency counter, bumped on every loyalty write.
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Creates a customer with an empty loyalty account.
    pub fn new(name: impl Into<String>, branch: impl Into<String>) -> Self {
        let now = Utc::now();
        Customer {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            branch: branch.into(),
            points: 0,
            total_spent_cents: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn total_spent(&self) -> Money {
        Money::from_cents(self.total_spent_cents)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum PaymentMethod {
    #[serde(rename = "efectivo")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "efectivo"))]
    Cash,
    #[serde(rename = "tarjeta")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "tarjeta"))]
    Card,
    #[serde(rename = "transferencia")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "transferencia"))]
    Transfer,
    #[serde(rename = "yape")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "yape"))]
    Yape,
    /// Sale on credit: requires a customer and opens a debt.
    #[serde(rename = "fiado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "fiado"))]
    Fiado,
}

impl PaymentMethod {
    /// Credit sales must name a customer and open a debt.
    #[inline]
    pub fn is_credit(&self) -> bool {
        matches!(self, PaymentMethod::Fiado)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "efectivo",
            PaymentMethod::Card => "tarjeta",
            PaymentMethod::Transfer => "transferencia",
            PaymentMethod::Yape => "yape",
            PaymentMethod::Fiado => "fiado",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "efectivo" | "cash" => Ok(PaymentMethod::Cash),
            "tarjeta" | "card" => Ok(PaymentMethod::Card),
            "transferencia" | "transfer" => Ok(PaymentMethod::Transfer),
            "yape" => Ok(PaymentMethod::Yape),
            "fiado" | "credit" => Ok(PaymentMethod::Fiado),
            _ => Err(ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                allowed: ["efectivo", "tarjeta", "transferencia", "yape", "fiado"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line item in a sale (also snapshotted into debts).
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItem {
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    /// Quantity sold, always > 0.
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// Product cost in cents at commit time (costo histórico).
    pub unit_cost_cents: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    /// Gross profit of the line, using the historical cost.
    pub fn profit(&self) -> Money {
        self.line_total() - Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale. Never mutated after creation; only deleted by a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub branch: String,
    /// User who rang up the sale (vendedor).
    pub seller: String,
    pub customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub items: Vec<SaleItem>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    /// Points credited to the customer by this sale.
    pub points_earned: i64,
    /// Debt opened by this sale (fiado only).
    pub debt_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Total units across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

// =============================================================================
// Debt
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum DebtStatus {
    #[serde(rename = "pendiente")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "pendiente"))]
    Pending,
    #[serde(rename = "pagado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "pagado"))]
    Paid,
}

impl DebtStatus {
    /// `Paid` iff everything paid covers the total.
    pub fn for_amounts(paid: Money, total: Money) -> Self {
        if paid >= total {
            DebtStatus::Paid
        } else {
            DebtStatus::Pending
        }
    }
}

/// One installment against a debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DebtPayment {
    /// Always > 0.
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,
}

/// Outstanding balance from a credit (fiado) sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Debt {
    pub id: String,
    pub customer_id: String,
    /// Originating sale, if the debt was opened by one.
    pub sale_id: Option<String>,
    /// Snapshot of what was bought.
    pub items: Vec<SaleItem>,
    pub total_cents: i64,
    pub payments: Vec<DebtPayment>,
    pub status: DebtStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Debt {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Sum of all payments.
    pub fn paid(&self) -> Money {
        self.payments
            .iter()
            .map(|p| Money::from_cents(p.amount_cents))
            .sum()
    }

    /// What is still owed, floored at zero even when overpaid.
    pub fn remaining(&self) -> Money {
        (self.total() - self.paid()).floor_zero()
    }

    /// How much was paid beyond the total.
    pub fn overpaid(&self) -> Money {
        (self.paid() - self.total()).floor_zero()
    }

    #[inline]
    pub fn is_paid(&self) -> bool {
        self.status == DebtStatus::Paid
    }
}

// =============================================================================
// Orders
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum OrderStatus {
    #[serde(rename = "pendiente")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "pendiente"))]
    Pending,
    /// Goods are on the shelf: the order's quantities are part of stock.
    #[serde(rename = "recibido")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "recibido"))]
    Received,
    #[serde(rename = "cancelado")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "cancelado"))]
    Cancelled,
}

impl OrderStatus {
    #[inline]
    pub fn is_received(&self) -> bool {
        matches!(self, OrderStatus::Received)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

/// A line of a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub product_id: String,
    /// Units ordered, always > 0.
    pub quantity: i64,
    pub unit_cost_cents: i64,
}

/// A purchase order from a supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub branch: String,
    pub supplier: Option<String>,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Order value at cost.
    pub fn total(&self) -> Money {
        self.items
            .iter()
            .map(|i| Money::from_cents(i.unit_cost_cents).multiply_quantity(i.quantity))
            .sum()
    }
}

/// Typed partial update for an order.
///
/// Only the listed fields can change; items are fixed once the order exists.
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub supplier: Option<String>,
    pub notes: Option<String>,
}

impl OrderPatch {
    /// Patch that only changes the status.
    pub fn status(status: OrderStatus) -> Self {
        OrderPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.supplier.is_none() && self.notes.is_none()
    }

    /// Applies the patch in place.
    pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(supplier) = &self.supplier {
            order.supplier = Some(supplier.clone());
        }
        if let Some(notes) = &self.notes {
            order.notes = Some(notes.clone());
        }
        order.updated_at = now;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_rate_parsing() {
        assert_eq!("1".parse::<PointsRate>().unwrap(), PointsRate::per_unit(1));
        assert_eq!("0.5".parse::<PointsRate>().unwrap().bps(), 5_000);
        assert_eq!("1.25".parse::<PointsRate>().unwrap().bps(), 12_500);
        assert!("-1".parse::<PointsRate>().is_err());
        assert!("x".parse::<PointsRate>().is_err());
        assert_eq!(
            PointsRate::per_unit(1).points_for(Money::from_cents(1999)),
            19
        );
    }

    #[test]
    fn test_stock_level() {
        assert_eq!(StockLevel::classify(10, 2), StockLevel::InStock);
        assert_eq!(StockLevel::classify(2, 2), StockLevel::Low);
        assert_eq!(StockLevel::classify(1, 2), StockLevel::Low);
        assert_eq!(StockLevel::classify(0, 2), StockLevel::OutOfStock);
        assert!(StockLevel::Low.needs_reorder());
        assert!(!StockLevel::InStock.needs_reorder());
    }

    #[test]
    fn test_payment_method_wire_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::Fiado).unwrap(),
            "\"fiado\""
        );
        assert_eq!(
            serde_json::from_str::<PaymentMethod>("\"efectivo\"").unwrap(),
            PaymentMethod::Cash
        );
        assert_eq!("Yape".parse::<PaymentMethod>().unwrap(), PaymentMethod::Yape);
        assert!("cheque".parse::<PaymentMethod>().is_err());
        assert!(PaymentMethod::Fiado.is_credit());
        assert!(!PaymentMethod::Cash.is_credit());
    }

    #[test]
    fn test_debt_amounts() {
        let now = Utc::now();
        let mut debt = Debt {
            id: "d1".to_string(),
            customer_id: "c1".to_string(),
            sale_id: None,
            items: vec![],
            total_cents: 10000,
            payments: vec![DebtPayment {
                amount_cents: 6000,
                paid_at: now,
            }],
            status: DebtStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(debt.remaining().cents(), 4000);
        assert!(debt.overpaid().is_zero());

        debt.payments.push(DebtPayment {
            amount_cents: 5000,
            paid_at: now,
        });
        assert_eq!(debt.remaining(), Money::zero());
        assert_eq!(debt.overpaid().cents(), 1000);
        assert_eq!(
            DebtStatus::for_amounts(debt.paid(), debt.total()),
            DebtStatus::Paid
        );
    }

    #[test]
    fn test_sale_item_profit() {
        let item = SaleItem {
            product_id: "p1".to_string(),
            name_snapshot: "Inca Kola 500ml".to_string(),
            quantity: 3,
            unit_price_cents: 250,
            unit_cost_cents: 180,
            line_total_cents: 750,
        };
        assert_eq!(item.profit().cents(), 210);
    }

    #[test]
    fn test_order_patch() {
        let now = Utc::now();
        let mut order = Order {
            id: "o1".to_string(),
            branch: "central".to_string(),
            supplier: None,
            items: vec![OrderItem {
                product_id: "p1".to_string(),
                quantity: 4,
                unit_cost_cents: 150,
            }],
            status: OrderStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(order.total().cents(), 600);

        let patch = OrderPatch {
            notes: Some("llega el lunes".to_string()),
            ..OrderPatch::status(OrderStatus::Received)
        };
        patch.apply_to(&mut order, now);
        assert_eq!(order.status, OrderStatus::Received);
        assert_eq!(order.notes.as_deref(), Some("llega el lunes"));
        assert!(order.supplier.is_none());
        assert!(OrderPatch::default().is_empty());
    }
}

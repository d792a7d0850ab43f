//! # Cart (Draft)
//!
//! The cart being assembled at the counter. It has no side effects:
//! nothing is reserved until [`crate::sale::SaleCoordinator::execute`].
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Scan / click product ──► add_item() ───────► lines.push(line)         │
//! │                                               (or qty += n)             │
//! │  Change quantity ───────► update_quantity() ─► lines[i].qty = n        │
//! │                                               (0 removes)               │
//! │  Remove ────────────────► remove_item() ────► lines.remove(i)          │
//! │                                                                         │
//! │  Cobrar ────────────────► to_request() ─────► SaleRequest              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::sale::{SaleLine, SaleRequest};
use crate::types::{PaymentMethod, Product};
use crate::validation::{validate_cart_size, validate_quantity};

/// A line in the cart.
///
/// `name` and `unit_price_cents` are frozen when the product is added: a
/// price change in the catalog afterwards does not affect this cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartLine {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price_cents: product.price_cents,
            quantity,
            added_at: Utc::now(),
        }
    }

    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// The shopping cart.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding the same product increases quantity)
/// - Quantity is always in `1..=MAX_ITEM_QUANTITY`
/// - At most `MAX_CART_ITEMS` lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a product or increases the quantity if it is already in the cart.
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let new_qty = line.quantity + quantity;
            validate_quantity(new_qty)?;
            line.quantity = new_qty;
            return Ok(());
        }

        validate_cart_size(self.lines.len() + 1)?;
        self.lines.push(CartLine::from_product(product, quantity));
        Ok(())
    }

    /// Sets the quantity of a line; zero removes it.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(product_id);
        }
        validate_quantity(quantity)?;

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        let initial_len = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);

        if self.lines.len() == initial_len {
            Err(CoreError::ProductNotFound(product_id.to_string()))
        } else {
            Ok(())
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.created_at = Utc::now();
    }

    /// Number of distinct products.
    pub fn item_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Builds the request handed to the sale coordinator, with frozen prices.
    ///
    /// Shape checks (empty cart, fiado without customer) are left to the
    /// coordinator so both paths report the same errors.
    pub fn to_request(
        &self,
        payment_method: PaymentMethod,
        customer_id: Option<String>,
        discount: Money,
        seller: impl Into<String>,
        branch: impl Into<String>,
    ) -> CoreResult<SaleRequest> {
        if discount.is_negative() || discount > self.subtotal() {
            return Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: self.subtotal().cents(),
            }
            .into());
        }
        Ok(SaleRequest {
            lines: self
                .lines
                .iter()
                .map(|l| SaleLine {
                    product_id: l.product_id.clone(),
                    quantity: l.quantity,
                    unit_price_cents: Some(l.unit_price_cents),
                })
                .collect(),
            payment_method,
            customer_id,
            discount_cents: discount.cents(),
            seller: seller.into(),
            branch: branch.into(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::product;
    use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

    #[test]
    fn test_cart_add_item() {
        let mut cart = Cart::new();
        let p = product("Inca Kola 500ml", 250, 180, 10, 2);

        cart.add_item(&p, 2).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 2);
        assert_eq!(cart.subtotal(), Money::from_cents(500));
    }

    #[test]
    fn test_cart_add_same_product_increases_quantity() {
        let mut cart = Cart::new();
        let p = product("Inca Kola 500ml", 250, 180, 10, 2);

        cart.add_item(&p, 2).unwrap();
        cart.add_item(&p, 3).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_price_frozen_at_add() {
        let mut cart = Cart::new();
        let mut p = product("Inca Kola 500ml", 250, 180, 10, 2);
        cart.add_item(&p, 1).unwrap();

        p.price_cents = 300;
        cart.add_item(&p, 1).unwrap();

        assert_eq!(cart.lines[0].unit_price_cents, 250);
        assert_eq!(cart.subtotal().cents(), 500);
    }

    #[test]
    fn test_quantity_limits() {
        let mut cart = Cart::new();
        let p = product("Fósforos", 10, 5, 5000, 0);

        assert!(cart.add_item(&p, 0).is_err());
        cart.add_item(&p, MAX_ITEM_QUANTITY).unwrap();
        assert!(cart.add_item(&p, 1).is_err());
        assert_eq!(cart.total_quantity(), MAX_ITEM_QUANTITY);

        cart.update_quantity(&p.id, 0).unwrap();
        assert!(cart.is_empty());
        assert!(cart.update_quantity(&p.id, 3).is_err());
    }

    #[test]
    fn test_max_lines() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_ITEMS {
            cart.add_item(&product(&format!("Producto {i}"), 100, 50, 1, 0), 1)
                .unwrap();
        }
        assert!(cart
            .add_item(&product("Uno más", 100, 50, 1, 0), 1)
            .is_err());
    }

    #[test]
    fn test_to_request() {
        let mut cart = Cart::new();
        let a = product("Pan de molde", 790, 600, 10, 2);
        let b = product("Mantequilla", 650, 500, 10, 2);
        cart.add_item(&a, 1).unwrap();
        cart.add_item(&b, 2).unwrap();

        let req = cart
            .to_request(
                PaymentMethod::Fiado,
                Some("c1".to_string()),
                Money::from_cents(90),
                "rosa",
                "central",
            )
            .unwrap();
        assert_eq!(req.lines.len(), 2);
        assert_eq!(req.lines[1].unit_price_cents, Some(650));
        assert_eq!(req.discount_cents, 90);

        assert!(cart
            .to_request(PaymentMethod::Cash, None, Money::from_cents(2091), "rosa", "central")
            .is_err());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        let p = product("Inca Kola 500ml", 250, 180, 10, 2);
        cart.add_item(&p, 2).unwrap();

        assert!(cart.remove_item("other").is_err());
        cart.remove_item(&p.id).unwrap();
        assert!(cart.is_empty());

        cart.add_item(&p, 2).unwrap();
        cart.clear();
        assert!(cart.is_empty());
    }
}

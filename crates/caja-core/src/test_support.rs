//! Fixtures shared by the coordinator tests.

use crate::money::Money;
use crate::store::InMemoryStore;
use crate::types::{Customer, Product};

pub fn product(name: &str, price_cents: i64, cost_cents: i64, stock: i64, min_stock: i64) -> Product {
    Product::new(
        name,
        "central",
        Money::from_cents(price_cents),
        Money::from_cents(cost_cents),
        stock,
        min_stock,
    )
}

/// Inserts a product and returns its id.
pub fn add_product(store: &InMemoryStore, stock: i64, min_stock: i64) -> String {
    let p = product("Galletas Soda Field", 150, 100, stock, min_stock);
    let id = p.id.clone();
    store.insert_product(p).unwrap();
    id
}

pub fn add_customer(store: &InMemoryStore) -> String {
    let c = Customer::new("Doña Carmen", "central");
    let id = c.id.clone();
    store.insert_customer(c).unwrap();
    id
}

pub fn stock_of(store: &InMemoryStore, product_id: &str) -> i64 {
    store.product(product_id).unwrap().unwrap().stock
}

//! # Order Repository
//!
//! Purchase orders and their lines. Stock effects of receiving an order are
//! decided by `caja_core::OrderReceiptCoordinator`; this module only stores.

use caja_core::{Entity, Order, OrderItem, OrderPatch, OrderStatus};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

const SELECT_ORDER: &str = r#"
    SELECT id, branch, supplier, status, notes, created_at, updated_at
    FROM orders
"#;

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    branch: String,
    supplier: Option<String>,
    status: OrderStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            branch: self.branch,
            supplier: self.supplier,
            items,
            status: self.status,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    product_id: String,
    quantity: i64,
    unit_cost_cents: i64,
}

/// Repository for purchase order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Orders of a branch, newest first.
    pub async fn list_by_branch(&self, branch: &str) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "{SELECT_ORDER} WHERE branch = ?1 ORDER BY created_at DESC"
        ))
        .bind(branch)
        .fetch_all(&mut *conn)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = fetch_items(&mut conn, &row.id).await?;
            orders.push(row.into_order(items));
        }
        Ok(orders)
    }
}

async fn fetch_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let rows: Vec<OrderItemRow> = sqlx::query_as(
        r#"
        SELECT product_id, quantity, unit_cost_cents
        FROM order_items
        WHERE order_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| OrderItem {
            product_id: r.product_id,
            quantity: r.quantity,
            unit_cost_cents: r.unit_cost_cents,
        })
        .collect())
}

// =============================================================================
// Connection-level helpers (shared with the unit of work)
// =============================================================================

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_ORDER} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let items = fetch_items(conn, &row.id).await?;
            Ok(Some(row.into_order(items)))
        }
        None => Ok(None),
    }
}

pub(crate) async fn insert(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(id = %order.id, status = ?order.status, items = order.items.len(), "Inserting order");

    sqlx::query(
        r#"
        INSERT INTO orders (id, branch, supplier, status, notes, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&order.id)
    .bind(&order.branch)
    .bind(&order.supplier)
    .bind(order.status)
    .bind(&order.notes)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_cost_cents)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&order.id)
        .bind(line_no as i64)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_cost_cents)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Applies `patch` to the stored header; items never change after creation.
pub(crate) async fn update(
    conn: &mut SqliteConnection,
    id: &str,
    patch: &OrderPatch,
) -> DbResult<Order> {
    let mut order = fetch(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found(Entity::Order, id))?;

    patch.apply_to(&mut order, Utc::now());

    sqlx::query(
        "UPDATE orders SET status = ?1, supplier = ?2, notes = ?3, updated_at = ?4 WHERE id = ?5",
    )
    .bind(order.status)
    .bind(&order.supplier)
    .bind(&order.notes)
    .bind(order.updated_at)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(order)
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM orders WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(Entity::Order, id));
    }
    Ok(())
}

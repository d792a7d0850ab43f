//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. COMMIT (SaleCoordinator, inside one unit of work)                  │
//! │     └── insert() → sales row + one sale_items row per line             │
//! │                                                                         │
//! │  2. READ                                                               │
//! │     └── get_by_id() / list_by_branch() / list_by_customer()            │
//! │                                                                         │
//! │  3. (OPTIONAL) RESTORE (RestoreCoordinator)                            │
//! │     └── delete() → sale_items go with it (ON DELETE CASCADE)           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use caja_core::{Entity, PaymentMethod, Sale, SaleItem};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

const SELECT_SALE: &str = r#"
    SELECT id, branch, seller, customer_id, payment_method, subtotal_cents,
           discount_cents, total_cents, points_earned, debt_id, created_at
    FROM sales
"#;

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    branch: String,
    seller: String,
    customer_id: Option<String>,
    payment_method: PaymentMethod,
    subtotal_cents: i64,
    discount_cents: i64,
    total_cents: i64,
    points_earned: i64,
    debt_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl SaleRow {
    fn into_sale(self, items: Vec<SaleItem>) -> Sale {
        Sale {
            id: self.id,
            branch: self.branch,
            seller: self.seller,
            customer_id: self.customer_id,
            payment_method: self.payment_method,
            items,
            subtotal_cents: self.subtotal_cents,
            discount_cents: self.discount_cents,
            total_cents: self.total_cents,
            points_earned: self.points_earned,
            debt_id: self.debt_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    product_id: String,
    name_snapshot: String,
    quantity: i64,
    unit_price_cents: i64,
    unit_cost_cents: i64,
    line_total_cents: i64,
}

impl From<SaleItemRow> for SaleItem {
    fn from(row: SaleItemRow) -> Self {
        SaleItem {
            product_id: row.product_id,
            name_snapshot: row.name_snapshot,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            unit_cost_cents: row.unit_cost_cents,
            line_total_cents: row.line_total_cents,
        }
    }
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID, with its items in line order.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Sales of a branch, newest first.
    pub async fn list_by_branch(&self, branch: &str, limit: i64) -> DbResult<Vec<Sale>> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<SaleRow> = sqlx::query_as(&format!(
            "{SELECT_SALE} WHERE branch = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))
        .bind(branch)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        with_items(&mut conn, rows).await
    }

    /// A customer's purchase history, newest first.
    pub async fn list_by_customer(&self, customer_id: &str) -> DbResult<Vec<Sale>> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<SaleRow> = sqlx::query_as(&format!(
            "{SELECT_SALE} WHERE customer_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await?;

        with_items(&mut conn, rows).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

async fn with_items(conn: &mut SqliteConnection, rows: Vec<SaleRow>) -> DbResult<Vec<Sale>> {
    let mut sales = Vec::with_capacity(rows.len());
    for row in rows {
        let items = fetch_items(conn, &row.id).await?;
        sales.push(row.into_sale(items));
    }
    Ok(sales)
}

async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let rows: Vec<SaleItemRow> = sqlx::query_as(
        r#"
        SELECT product_id, name_snapshot, quantity, unit_price_cents,
               unit_cost_cents, line_total_cents
        FROM sale_items
        WHERE sale_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(SaleItem::from).collect())
}

// =============================================================================
// Connection-level helpers (shared with the unit of work)
// =============================================================================

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let row: Option<SaleRow> = sqlx::query_as(&format!("{SELECT_SALE} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let items = fetch_items(conn, &row.id).await?;
            Ok(Some(row.into_sale(items)))
        }
        None => Ok(None),
    }
}

/// Inserts the sale header and its items.
///
/// ## Snapshot Pattern
/// Product name, price and cost are copied to each item. This preserves
/// the sale history even if product details change later.
pub(crate) async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, items = sale.items.len(), "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, branch, seller, customer_id, payment_method,
            subtotal_cents, discount_cents, total_cents, points_earned,
            debt_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.branch)
    .bind(&sale.seller)
    .bind(&sale.customer_id)
    .bind(sale.payment_method)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_cents)
    .bind(sale.total_cents)
    .bind(sale.points_earned)
    .bind(&sale.debt_id)
    .bind(sale.created_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, item) in sale.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                sale_id, line_no, product_id, name_snapshot, quantity,
                unit_price_cents, unit_cost_cents, line_total_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&sale.id)
        .bind(line_no as i64)
        .bind(&item.product_id)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.unit_cost_cents)
        .bind(item.line_total_cents)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(Entity::Sale, id));
    }
    Ok(())
}

//! # Product Repository
//!
//! Database operations for products and their stock.
//!
//! ## Key Operations
//! - CRUD-style reads and inserts over the pool
//! - Versioned stock writes, used from inside a unit of work
//!
//! ## Versioned Stock Write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 How a stock write detects a race                        │
//! │                                                                         │
//! │  read:   SELECT ... → stock 5, version 7                               │
//! │  write:  UPDATE products SET stock = 3, version = 8                    │
//! │          WHERE id = ? AND version = 7                                  │
//! │                                                                         │
//! │  rows_affected = 1  → we won, return the fresh row                      │
//! │  rows_affected = 0  → someone else wrote first → Conflict              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use caja_core::{Entity, Product};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

const SELECT_PRODUCT: &str = r#"
    SELECT id, name, branch, stock, min_stock, price_cents, cost_cents,
           version, created_at, updated_at
    FROM products
"#;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: String,
    name: String,
    branch: String,
    stock: i64,
    min_stock: i64,
    price_cents: i64,
    cost_cents: i64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            branch: row.branch,
            stock: row.stock,
            min_stock: row.min_stock,
            price_cents: row.price_cents,
            cost_cents: row.cost_cents,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
///
/// repo.insert(&product).await?;
/// let low = repo.list_low_stock("central").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, branch, stock, min_stock, price_cents, cost_cents,
                version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.branch)
        .bind(product.stock)
        .bind(product.min_stock)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.version)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Lists every product of a branch, by name.
    pub async fn list_by_branch(&self, branch: &str) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> =
            sqlx::query_as(&format!("{SELECT_PRODUCT} WHERE branch = ?1 ORDER BY name"))
                .bind(branch)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Products at or below their reorder threshold (includes out of stock).
    pub async fn list_low_stock(&self, branch: &str) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "{SELECT_PRODUCT} WHERE branch = ?1 AND stock <= min_stock ORDER BY stock, name"
        ))
        .bind(branch)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Counts all products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Connection-level helpers (shared with the unit of work)
// =============================================================================

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let row: Option<ProductRow> = sqlx::query_as(&format!("{SELECT_PRODUCT} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(Product::from))
}

/// Writes `stock` if the row is still at `expected_version`.
pub(crate) async fn save_stock(
    conn: &mut SqliteConnection,
    id: &str,
    expected_version: i64,
    stock: i64,
) -> DbResult<Product> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET stock = ?1, version = version + 1, updated_at = ?2
        WHERE id = ?3 AND version = ?4
        "#,
    )
    .bind(stock)
    .bind(Utc::now())
    .bind(id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return match fetch(conn, id).await? {
            Some(_) => Err(DbError::conflict(Entity::Product, id)),
            None => Err(DbError::not_found(Entity::Product, id)),
        };
    }

    fetch(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found(Entity::Product, id))
}

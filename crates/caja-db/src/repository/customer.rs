//! # Customer Repository
//!
//! Customers and their loyalty accounts (points, total spent).

use caja_core::{Customer, Entity};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

const SELECT_CUSTOMER: &str = r#"
    SELECT id, name, branch, points, total_spent_cents, version, created_at, updated_at
    FROM customers
"#;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CustomerRow {
    id: String,
    name: String,
    branch: String,
    points: i64,
    total_spent_cents: i64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            name: row.name,
            branch: row.branch,
            points: row.points,
            total_spent_cents: row.total_spent_cents,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, name = %customer.name, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, branch, points, total_spent_cents, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.branch)
        .bind(customer.points)
        .bind(customer.total_spent_cents)
        .bind(customer.version)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Lists the customers of a branch, by name.
    pub async fn list_by_branch(&self, branch: &str) -> DbResult<Vec<Customer>> {
        let rows: Vec<CustomerRow> =
            sqlx::query_as(&format!("{SELECT_CUSTOMER} WHERE branch = ?1 ORDER BY name"))
                .bind(branch)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(Customer::from).collect())
    }
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
    let row: Option<CustomerRow> = sqlx::query_as(&format!("{SELECT_CUSTOMER} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(Customer::from))
}

/// Writes the loyalty figures if the row is still at `expected_version`.
pub(crate) async fn save_loyalty(
    conn: &mut SqliteConnection,
    id: &str,
    expected_version: i64,
    points: i64,
    total_spent_cents: i64,
) -> DbResult<Customer> {
    let result = sqlx::query(
        r#"
        UPDATE customers
        SET points = ?1, total_spent_cents = ?2, version = version + 1, updated_at = ?3
        WHERE id = ?4 AND version = ?5
        "#,
    )
    .bind(points)
    .bind(total_spent_cents)
    .bind(Utc::now())
    .bind(id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return match fetch(conn, id).await? {
            Some(_) => Err(DbError::conflict(Entity::Customer, id)),
            None => Err(DbError::not_found(Entity::Customer, id)),
        };
    }

    fetch(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found(Entity::Customer, id))
}

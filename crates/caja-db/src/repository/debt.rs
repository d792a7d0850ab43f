//! # Debt Repository
//!
//! Fiado debts and their payment history.
//!
//! Item snapshots are stored as JSON in `debts.items_json`; payments are
//! rows in `debt_payments`, ordered by `seq`.

use caja_core::{Debt, DebtPayment, DebtStatus, Entity, SaleItem};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

const SELECT_DEBT: &str = r#"
    SELECT id, customer_id, sale_id, items_json, total_cents, status, created_at, updated_at
    FROM debts
"#;

#[derive(Debug, sqlx::FromRow)]
struct DebtRow {
    id: String,
    customer_id: String,
    sale_id: Option<String>,
    items_json: String,
    total_cents: i64,
    status: DebtStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DebtRow {
    fn into_debt(self, payments: Vec<DebtPayment>) -> DbResult<Debt> {
        let items: Vec<SaleItem> = serde_json::from_str(&self.items_json)?;
        Ok(Debt {
            id: self.id,
            customer_id: self.customer_id,
            sale_id: self.sale_id,
            items,
            total_cents: self.total_cents,
            payments,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    amount_cents: i64,
    paid_at: DateTime<Utc>,
}

/// Repository for debt database operations.
#[derive(Debug, Clone)]
pub struct DebtRepository {
    pool: SqlitePool,
}

impl DebtRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DebtRepository { pool }
    }

    /// Gets a debt by ID, with its payments.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Debt>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Open debts of a customer, oldest first (the order they are collected in).
    pub async fn list_pending_by_customer(&self, customer_id: &str) -> DbResult<Vec<Debt>> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<DebtRow> = sqlx::query_as(&format!(
            "{SELECT_DEBT} WHERE customer_id = ?1 AND status = ?2 ORDER BY created_at"
        ))
        .bind(customer_id)
        .bind(DebtStatus::Pending)
        .fetch_all(&mut *conn)
        .await?;

        let mut debts = Vec::with_capacity(rows.len());
        for row in rows {
            let payments = fetch_payments(&mut conn, &row.id).await?;
            debts.push(row.into_debt(payments)?);
        }
        Ok(debts)
    }
}

async fn fetch_payments(conn: &mut SqliteConnection, debt_id: &str) -> DbResult<Vec<DebtPayment>> {
    let rows: Vec<PaymentRow> = sqlx::query_as(
        "SELECT amount_cents, paid_at FROM debt_payments WHERE debt_id = ?1 ORDER BY seq",
    )
    .bind(debt_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| DebtPayment {
            amount_cents: r.amount_cents,
            paid_at: r.paid_at,
        })
        .collect())
}

// =============================================================================
// Connection-level helpers (shared with the unit of work)
// =============================================================================

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Debt>> {
    let row: Option<DebtRow> = sqlx::query_as(&format!("{SELECT_DEBT} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let payments = fetch_payments(conn, &row.id).await?;
            Ok(Some(row.into_debt(payments)?))
        }
        None => Ok(None),
    }
}

/// Inserts a debt and any payments it already carries.
pub(crate) async fn insert(conn: &mut SqliteConnection, debt: &Debt) -> DbResult<()> {
    debug!(id = %debt.id, customer_id = %debt.customer_id, total_cents = debt.total_cents, "Inserting debt");

    let items_json = serde_json::to_string(&debt.items)?;

    sqlx::query(
        r#"
        INSERT INTO debts (
            id, customer_id, sale_id, items_json, total_cents, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&debt.id)
    .bind(&debt.customer_id)
    .bind(&debt.sale_id)
    .bind(items_json)
    .bind(debt.total_cents)
    .bind(debt.status)
    .bind(debt.created_at)
    .bind(debt.updated_at)
    .execute(&mut *conn)
    .await?;

    for (seq, payment) in debt.payments.iter().enumerate() {
        insert_payment(conn, &debt.id, seq as i64, payment).await?;
    }

    Ok(())
}

async fn insert_payment(
    conn: &mut SqliteConnection,
    debt_id: &str,
    seq: i64,
    payment: &DebtPayment,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO debt_payments (debt_id, seq, amount_cents, paid_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(debt_id)
    .bind(seq)
    .bind(payment.amount_cents)
    .bind(payment.paid_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Appends a payment and records the resulting status.
pub(crate) async fn append_payment(
    conn: &mut SqliteConnection,
    id: &str,
    payment: &DebtPayment,
    status: DebtStatus,
) -> DbResult<Debt> {
    let mut debt = fetch(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found(Entity::Debt, id))?;

    insert_payment(conn, id, debt.payments.len() as i64, payment).await?;

    let now = Utc::now();
    sqlx::query("UPDATE debts SET status = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    debt.payments.push(payment.clone());
    debt.status = status;
    debt.updated_at = now;
    Ok(debt)
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM debts WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(Entity::Debt, id));
    }
    Ok(())
}

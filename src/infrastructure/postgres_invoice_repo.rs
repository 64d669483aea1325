use crate::domain::{CustomerInfo, Invoice, InvoiceItem, InvoiceStatus};
use crate::infrastructure::repository::{not_found, parse_column};
use crate::infrastructure::{InvoiceRepository, MetricsRepository, RepositoryError};
use crate::ledger::{utilization_pct, DashboardMetrics, EXPIRING_SOON_DAYS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

pub struct PostgresInvoiceRepository {
    pool: PgPool,
}

impl PostgresInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INVOICE_COLUMNS: &str = r#"
    id, invoice_number, order_number, issue_date, due_date, status, items, subtotal,
    tax_rate, tax_amount, discount_amount, total_amount, customer_info, payment_terms,
    notes, created_at, updated_at
"#;

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    async fn create(&self, invoice: &Invoice) -> Result<(), RepositoryError> {
        let items_json = serde_json::to_value(&invoice.items).map_err(|e| {
            RepositoryError::InvalidData(format!("Failed to serialize invoice items: {}", e))
        })?;
        let customer_json = serde_json::to_value(&invoice.customer_info).map_err(|e| {
            RepositoryError::InvalidData(format!("Failed to serialize customer info: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO invoices (id, invoice_number, order_number, issue_date, due_date, status,
                                  items, subtotal, tax_rate, tax_amount, discount_amount,
                                  total_amount, customer_info, payment_terms, notes,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.order_number)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.status.to_string())
        .bind(items_json)
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount)
        .bind(invoice.discount_amount)
        .bind(invoice.total_amount)
        .bind(customer_json)
        .bind(&invoice.payment_terms)
        .bind(&invoice.notes)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepositoryError::Conflict(
                format!("Invoice {} already exists", invoice.invoice_number),
            ),
            _ => RepositoryError::DatabaseError(e),
        })?;

        Ok(())
    }

    async fn get_by_number(&self, invoice_number: &str) -> Result<Invoice, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE invoice_number = $1",
            INVOICE_COLUMNS
        ))
        .bind(invoice_number)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Invoice {}", invoice_number)))?;

        row_to_invoice(&row)
    }

    async fn list(&self) -> Result<Vec<Invoice>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM invoices ORDER BY issue_date DESC",
            INVOICE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_invoice).collect()
    }

    async fn update_status(
        &self,
        invoice_number: &str,
        status: InvoiceStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $1, updated_at = $2
            WHERE invoice_number = $3
            "#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(invoice_number)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Invoice {}", invoice_number)));
        }
        Ok(())
    }

    async fn next_sequence(&self, prefix: &str, period: &str) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO invoice_sequences (prefix, period, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (prefix, period)
            DO UPDATE SET last_value = invoice_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(prefix)
        .bind(period)
        .fetch_one(&self.pool)
        .await?;

        let value: i64 = row.try_get("last_value")?;
        Ok(value)
    }
}

fn row_to_invoice(row: &sqlx::postgres::PgRow) -> Result<Invoice, RepositoryError> {
    let items_json: serde_json::Value = row.try_get("items")?;
    let customer_json: serde_json::Value = row.try_get("customer_info")?;
    let status: String = row.try_get("status")?;

    let items: Vec<InvoiceItem> = serde_json::from_value(items_json).map_err(|e| {
        RepositoryError::InvalidData(format!("Failed to deserialize invoice items: {}", e))
    })?;
    let customer_info: CustomerInfo = serde_json::from_value(customer_json).map_err(|e| {
        RepositoryError::InvalidData(format!("Failed to deserialize customer info: {}", e))
    })?;

    Ok(Invoice {
        id: row.try_get("id")?,
        invoice_number: row.try_get("invoice_number")?,
        order_number: row.try_get("order_number")?,
        issue_date: row.try_get("issue_date")?,
        due_date: row.try_get("due_date")?,
        status: parse_column::<InvoiceStatus>("status", &status)?,
        items,
        subtotal: row.try_get("subtotal")?,
        tax_rate: row.try_get("tax_rate")?,
        tax_amount: row.try_get("tax_amount")?,
        discount_amount: row.try_get("discount_amount")?,
        total_amount: row.try_get("total_amount")?,
        customer_info,
        payment_terms: row.try_get("payment_terms")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PostgresMetricsRepository {
    pool: PgPool,
}

impl PostgresMetricsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsRepository for PostgresMetricsRepository {
    async fn load_metrics(&self, now: DateTime<Utc>) -> Result<DashboardMetrics, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM accounts) AS total_accounts,
                (SELECT COUNT(*) FROM accounts WHERE is_active) AS active_accounts,
                (SELECT COALESCE(SUM(max_user_slots), 0)::BIGINT
                   FROM accounts WHERE is_active) AS total_slots,
                (SELECT COALESCE(SUM(LEAST(current_users, max_user_slots)), 0)::BIGINT
                   FROM accounts WHERE is_active) AS used_slots,
                (SELECT COUNT(*) FROM sales WHERE status <> 'cancelled') AS total_sales,
                (SELECT COALESCE(SUM(total), 0)
                   FROM sales WHERE status <> 'cancelled') AS total_revenue,
                (SELECT COALESCE(SUM(total), 0)
                   FROM sales
                  WHERE status <> 'cancelled'
                    AND date_trunc('month', order_date AT TIME ZONE 'UTC')
                        = date_trunc('month', $1::timestamptz AT TIME ZONE 'UTC')) AS monthly_revenue,
                (SELECT COALESCE(ROUND(SUM(CASE WHEN subscription_type = 'annual'
                                                THEN cost / 12 ELSE cost END), 2), 0)
                   FROM accounts WHERE is_active) AS monthly_cost,
                (SELECT COUNT(*)
                   FROM accounts
                  WHERE is_active
                    AND renewal_status = 'renewable'
                    AND renewal_date BETWEEN $1 AND $1 + make_interval(days => $2)) AS expiring_soon
            "#,
        )
        .bind(now)
        .bind(EXPIRING_SOON_DAYS as i32)
        .fetch_one(&self.pool)
        .await?;

        let total_slots: i64 = row.try_get("total_slots")?;
        let used_slots: i64 = row.try_get("used_slots")?;
        let monthly_cost: Decimal = row.try_get("monthly_cost")?;

        Ok(DashboardMetrics {
            total_accounts: row.try_get("total_accounts")?,
            active_accounts: row.try_get("active_accounts")?,
            total_slots,
            used_slots,
            available_slots: total_slots - used_slots,
            slot_utilization_pct: utilization_pct(used_slots, total_slots),
            total_sales: row.try_get("total_sales")?,
            total_revenue: row.try_get("total_revenue")?,
            monthly_revenue: row.try_get("monthly_revenue")?,
            monthly_cost: monthly_cost.round_dp(2),
            expiring_soon: row.try_get("expiring_soon")?,
            from_aggregate: true,
        })
    }
}

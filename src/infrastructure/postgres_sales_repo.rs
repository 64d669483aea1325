use crate::domain::{
    CustomerContact, CustomerType, OrderItem, PaymentMethod, Sale, SaleStatus,
};
use crate::infrastructure::repository::{not_found, parse_column};
use crate::infrastructure::{RepositoryError, SaleRepository};
use crate::ledger::TermAuthority;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

pub struct PostgresSaleRepository {
    pool: PgPool,
}

impl PostgresSaleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SALE_COLUMNS: &str = r#"
    id, order_number, items, customer_id, customer_name, customer_email, customer_phone,
    customer_type, category_id, discount_rate, subtotal, discount_amount, total,
    payment_method, status, start_date, end_date, days_until_renewal, term_authority, notes,
    order_date, created_at, updated_at
"#;

fn items_to_json(items: &[OrderItem]) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(items)
        .map_err(|e| RepositoryError::InvalidData(format!("Failed to serialize order items: {}", e)))
}

#[async_trait]
impl SaleRepository for PostgresSaleRepository {
    async fn create(&self, sale: &Sale) -> Result<(), RepositoryError> {
        let items_json = items_to_json(&sale.items)?;

        sqlx::query(
            r#"
            INSERT INTO sales (id, order_number, items, customer_id, customer_name, customer_email,
                               customer_phone, customer_type, category_id, discount_rate, subtotal,
                               discount_amount, total, payment_method, status, start_date, end_date,
                               days_until_renewal, term_authority, notes, order_date, created_at,
                               updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(sale.id)
        .bind(&sale.order_number)
        .bind(items_json)
        .bind(&sale.customer.customer_id)
        .bind(&sale.customer.name)
        .bind(&sale.customer.email)
        .bind(&sale.customer.phone)
        .bind(sale.customer_type.to_string())
        .bind(sale.category_id)
        .bind(sale.discount_rate)
        .bind(sale.subtotal)
        .bind(sale.discount_amount)
        .bind(sale.total)
        .bind(sale.payment_method.to_string())
        .bind(sale.status.to_string())
        .bind(sale.start_date)
        .bind(sale.end_date)
        .bind(sale.days_until_renewal)
        .bind(sale.term_authority.to_string())
        .bind(&sale.notes)
        .bind(sale.order_date)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("Order {} already exists", sale.order_number))
            }
            _ => RepositoryError::DatabaseError(e),
        })?;

        Ok(())
    }

    async fn get_by_order_number(&self, order_number: &str) -> Result<Sale, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sales WHERE order_number = $1",
            SALE_COLUMNS
        ))
        .bind(order_number)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Sale {}", order_number)))?;

        row_to_sale(&row)
    }

    async fn list(&self) -> Result<Vec<Sale>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sales ORDER BY order_date DESC",
            SALE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_sale).collect()
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Sale>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sales ORDER BY order_date DESC LIMIT $1",
            SALE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_sale).collect()
    }

    async fn update(&self, sale: &Sale) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET payment_method = $1, status = $2, start_date = $3, end_date = $4,
                days_until_renewal = $5, term_authority = $6, notes = $7, subtotal = $8,
                discount_amount = $9, total = $10, updated_at = $11
            WHERE order_number = $12
            "#,
        )
        .bind(sale.payment_method.to_string())
        .bind(sale.status.to_string())
        .bind(sale.start_date)
        .bind(sale.end_date)
        .bind(sale.days_until_renewal)
        .bind(sale.term_authority.to_string())
        .bind(&sale.notes)
        .bind(sale.subtotal)
        .bind(sale.discount_amount)
        .bind(sale.total)
        .bind(sale.updated_at)
        .bind(&sale.order_number)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Sale {}", sale.order_number)));
        }
        Ok(())
    }

    async fn delete(&self, order_number: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sales
            WHERE order_number = $1
            "#,
        )
        .bind(order_number)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Sale {}", order_number)));
        }
        Ok(())
    }
}

fn row_to_sale(row: &sqlx::postgres::PgRow) -> Result<Sale, RepositoryError> {
    let items_json: serde_json::Value = row.try_get("items")?;
    let items: Vec<OrderItem> = serde_json::from_value(items_json).map_err(|e| {
        RepositoryError::InvalidData(format!("Failed to deserialize order items: {}", e))
    })?;

    let customer_type: String = row.try_get("customer_type")?;
    let payment_method: String = row.try_get("payment_method")?;
    let status: String = row.try_get("status")?;
    let term_authority: String = row.try_get("term_authority")?;

    Ok(Sale {
        id: row.try_get("id")?,
        order_number: row.try_get("order_number")?,
        items,
        customer: CustomerContact {
            customer_id: row.try_get("customer_id")?,
            name: row.try_get("customer_name")?,
            email: row.try_get("customer_email")?,
            phone: row.try_get("customer_phone")?,
        },
        customer_type: parse_column::<CustomerType>("customer_type", &customer_type)?,
        category_id: row.try_get("category_id")?,
        discount_rate: row.try_get("discount_rate")?,
        subtotal: row.try_get("subtotal")?,
        discount_amount: row.try_get("discount_amount")?,
        total: row.try_get("total")?,
        payment_method: parse_column::<PaymentMethod>("payment_method", &payment_method)?,
        status: parse_column::<SaleStatus>("status", &status)?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        days_until_renewal: row.try_get("days_until_renewal")?,
        term_authority: parse_column::<TermAuthority>("term_authority", &term_authority)?,
        notes: row.try_get("notes")?,
        order_date: row.try_get("order_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

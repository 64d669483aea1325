use crate::domain::{
    Account, Invoice, InvoiceStatus, PrimaryHolder, ProductCategory, RenewalStatus, Sale,
    ServiceType, SubscriptionType,
};
use crate::ledger::{recompute, DashboardMetrics};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    #[must_use]
    async fn create(&self, account: &Account) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError>;
    /// All accounts, optionally restricted to one category, newest first.
    #[must_use]
    async fn list(&self, category_id: Option<Uuid>) -> Result<Vec<Account>, RepositoryError>;
    /// Persists every editable field. Fails with `Conflict` if `max_user_slots`
    /// would drop below the usage stored at write time.
    #[must_use]
    async fn update(&self, account: &Account) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// Atomically takes `count` slots. Fails with `Conflict` when fewer remain.
    #[must_use]
    async fn allocate_slots(&self, id: Uuid, count: i32) -> Result<Account, RepositoryError>;
    /// Atomically gives back `count` slots, never going below zero usage.
    #[must_use]
    async fn release_slots(&self, id: Uuid, count: i32) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn count_by_category(&self, category_id: Uuid) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    #[must_use]
    async fn create(&self, category: &ProductCategory) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<ProductCategory, RepositoryError>;
    #[must_use]
    async fn list(&self) -> Result<Vec<ProductCategory>, RepositoryError>;
    #[must_use]
    async fn update(&self, category: &ProductCategory) -> Result<(), RepositoryError>;
    #[must_use]
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SaleRepository: Send + Sync {
    #[must_use]
    async fn create(&self, sale: &Sale) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_order_number(&self, order_number: &str) -> Result<Sale, RepositoryError>;
    /// All sales, newest order first.
    #[must_use]
    async fn list(&self) -> Result<Vec<Sale>, RepositoryError>;
    #[must_use]
    async fn list_recent(&self, limit: i64) -> Result<Vec<Sale>, RepositoryError>;
    #[must_use]
    async fn update(&self, sale: &Sale) -> Result<(), RepositoryError>;
    #[must_use]
    async fn delete(&self, order_number: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    #[must_use]
    async fn create(&self, invoice: &Invoice) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_number(&self, invoice_number: &str) -> Result<Invoice, RepositoryError>;
    #[must_use]
    async fn list(&self) -> Result<Vec<Invoice>, RepositoryError>;
    #[must_use]
    async fn update_status(
        &self,
        invoice_number: &str,
        status: InvoiceStatus,
    ) -> Result<(), RepositoryError>;
    /// Next per-period sequence value; atomic under concurrent issuers.
    #[must_use]
    async fn next_sequence(&self, prefix: &str, period: &str) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Dashboard figures from one aggregate query.
    #[must_use]
    async fn load_metrics(&self, now: DateTime<Utc>) -> Result<DashboardMetrics, RepositoryError>;
}

pub(crate) fn not_found(what: String) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    move |e| match e {
        sqlx::Error::RowNotFound => RepositoryError::NotFound(what),
        _ => RepositoryError::DatabaseError(e),
    }
}

pub(crate) fn parse_column<T: FromStr>(column: &str, raw: &str) -> Result<T, RepositoryError> {
    T::from_str(raw)
        .map_err(|_| RepositoryError::InvalidData(format!("Unknown {}: {}", column, raw)))
}

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ACCOUNT_COLUMNS: &str = r#"
    id, product_name, label, email,
    primary_holder_name, primary_holder_email, primary_holder_phone,
    max_user_slots, current_users, is_active, renewal_status, renewal_date,
    subscription_type, cost, is_shared_account, family_features, usage_restrictions,
    cost_per_additional_user, category_id, service_type, brand, created_at, updated_at
"#;

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, product_name, label, email,
                                  primary_holder_name, primary_holder_email, primary_holder_phone,
                                  max_user_slots, current_users, is_active, renewal_status, renewal_date,
                                  subscription_type, cost, is_shared_account, family_features,
                                  usage_restrictions, cost_per_additional_user, category_id,
                                  service_type, brand, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(account.id)
        .bind(&account.product_name)
        .bind(&account.label)
        .bind(&account.email)
        .bind(&account.primary_holder.name)
        .bind(&account.primary_holder.email)
        .bind(&account.primary_holder.phone)
        .bind(account.max_user_slots)
        .bind(account.current_users)
        .bind(account.is_active)
        .bind(account.renewal_status.to_string())
        .bind(account.renewal_date)
        .bind(account.subscription_type.to_string())
        .bind(account.cost)
        .bind(account.is_shared_account)
        .bind(&account.family_features)
        .bind(&account.usage_restrictions)
        .bind(account.cost_per_additional_user)
        .bind(account.category_id)
        .bind(account.service_type.to_string())
        .bind(&account.brand)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Account {}", id)))?;

        row_to_account(&row)
    }

    async fn list(&self, category_id: Option<Uuid>) -> Result<Vec<Account>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM accounts
            WHERE ($1::uuid IS NULL OR category_id = $1)
            ORDER BY created_at DESC
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn update(&self, account: &Account) -> Result<Account, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts
            SET product_name = $1, label = $2, email = $3,
                primary_holder_name = $4, primary_holder_email = $5, primary_holder_phone = $6,
                max_user_slots = $7, is_active = $8, renewal_status = $9, renewal_date = $10,
                subscription_type = $11, cost = $12, is_shared_account = $13,
                family_features = $14, usage_restrictions = $15, cost_per_additional_user = $16,
                category_id = $17, service_type = $18, brand = $19, updated_at = $20
            WHERE id = $21 AND current_users <= $7
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(&account.product_name)
        .bind(&account.label)
        .bind(&account.email)
        .bind(&account.primary_holder.name)
        .bind(&account.primary_holder.email)
        .bind(&account.primary_holder.phone)
        .bind(account.max_user_slots)
        .bind(account.is_active)
        .bind(account.renewal_status.to_string())
        .bind(account.renewal_date)
        .bind(account.subscription_type.to_string())
        .bind(account.cost)
        .bind(account.is_shared_account)
        .bind(&account.family_features)
        .bind(&account.usage_restrictions)
        .bind(account.cost_per_additional_user)
        .bind(account.category_id)
        .bind(account.service_type.to_string())
        .bind(&account.brand)
        .bind(Utc::now())
        .bind(account.id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_account(&row),
            None => {
                // Distinguish a missing row from a capacity race.
                let current = self.get_by_id(account.id).await?;
                Err(RepositoryError::Conflict(format!(
                    "cannot reduce slots below current users ({})",
                    current.current_users
                )))
            }
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Account {}", id)));
        }
        Ok(())
    }

    async fn allocate_slots(&self, id: Uuid, count: i32) -> Result<Account, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts
            SET current_users = current_users + $1, updated_at = $2
            WHERE id = $3 AND current_users + $1 <= max_user_slots
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(count)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_account(&row),
            None => {
                let current = self.get_by_id(id).await?;
                Err(RepositoryError::Conflict(format!(
                    "{} has {} available slots, {} requested",
                    current.display_name(),
                    current.available_slots,
                    count
                )))
            }
        }
    }

    async fn release_slots(&self, id: Uuid, count: i32) -> Result<Account, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts
            SET current_users = GREATEST(current_users - $1, 0), updated_at = $2
            WHERE id = $3
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(count)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Account {}", id)))?;

        row_to_account(&row)
    }

    async fn count_by_category(&self, category_id: Uuid) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM accounts
            WHERE category_id = $1
            "#,
        )
        .bind(category_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// Enum columns are stored as their strum snake_case names.
fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, RepositoryError> {
    let renewal_status: String = row.try_get("renewal_status")?;
    let subscription_type: String = row.try_get("subscription_type")?;
    let service_type: String = row.try_get("service_type")?;

    let mut account = Account {
        id: row.try_get("id")?,
        product_name: row.try_get("product_name")?,
        label: row.try_get("label")?,
        email: row.try_get("email")?,
        primary_holder: PrimaryHolder {
            name: row.try_get("primary_holder_name")?,
            email: row.try_get("primary_holder_email")?,
            phone: row.try_get("primary_holder_phone")?,
        },
        max_user_slots: row.try_get("max_user_slots")?,
        current_users: row.try_get("current_users")?,
        available_slots: 0,
        is_active: row.try_get("is_active")?,
        renewal_status: parse_column::<RenewalStatus>("renewal_status", &renewal_status)?,
        renewal_date: row.try_get("renewal_date")?,
        days_until_renewal: None,
        subscription_type: parse_column::<SubscriptionType>("subscription_type", &subscription_type)?,
        cost: row.try_get("cost")?,
        is_shared_account: row.try_get("is_shared_account")?,
        family_features: row.try_get("family_features")?,
        usage_restrictions: row.try_get("usage_restrictions")?,
        cost_per_additional_user: row.try_get("cost_per_additional_user")?,
        category_id: row.try_get("category_id")?,
        service_type: ServiceType::parse_lenient(&service_type),
        brand: row.try_get("brand")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    };

    // `recompute` stamps `updated_at`; keep the stored value.
    let updated_at = account.updated_at;
    recompute(&mut account);
    account.updated_at = updated_at;
    Ok(account)
}

pub struct PostgresCategoryRepository {
    pool: PgPool,
}

impl PostgresCategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PostgresCategoryRepository {
    async fn create(&self, category: &ProductCategory) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO product_categories (id, name, description, icon, color, service_types,
                                            is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(&category.service_types)
        .bind(category.is_active)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<ProductCategory, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, icon, color, service_types, is_active, created_at, updated_at
            FROM product_categories
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Category {}", id)))?;

        row_to_category(&row)
    }

    async fn list(&self) -> Result<Vec<ProductCategory>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, icon, color, service_types, is_active, created_at, updated_at
            FROM product_categories
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_category).collect()
    }

    async fn update(&self, category: &ProductCategory) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE product_categories
            SET name = $1, description = $2, icon = $3, color = $4, service_types = $5,
                is_active = $6, updated_at = $7
            WHERE id = $8
            "#,
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(&category.service_types)
        .bind(category.is_active)
        .bind(category.updated_at)
        .bind(category.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Category {}", category.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM product_categories
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Category {}", id)));
        }
        Ok(())
    }
}

fn row_to_category(row: &sqlx::postgres::PgRow) -> Result<ProductCategory, RepositoryError> {
    let service_types: Vec<String> = row.try_get("service_types")?;

    Ok(ProductCategory {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        icon: row.try_get("icon")?,
        color: row.try_get("color")?,
        service_types: crate::domain::ensure_service_types(service_types),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

use crate::application::{
    AccountService, CatalogService, DashboardService, InvoiceService, InvoiceSettings, SalesService,
};
use crate::infrastructure::{
    AppConfig, PostgresAccountRepository, PostgresCategoryRepository, PostgresInvoiceRepository,
    PostgresMetricsRepository, PostgresSaleRepository,
};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

pub type AccountServiceType = AccountService<PostgresAccountRepository>;

pub type CatalogServiceType = CatalogService<PostgresCategoryRepository, PostgresAccountRepository>;

pub type SalesServiceType = SalesService<PostgresSaleRepository, PostgresAccountRepository>;

pub type InvoiceServiceType = InvoiceService<PostgresInvoiceRepository, PostgresSaleRepository>;

pub type DashboardServiceType =
    DashboardService<PostgresAccountRepository, PostgresSaleRepository, PostgresMetricsRepository>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub accounts: Arc<AccountServiceType>,
    pub catalog: Arc<CatalogServiceType>,
    pub sales: Arc<SalesServiceType>,
    pub invoices: Arc<InvoiceServiceType>,
    pub dashboard: Arc<DashboardServiceType>,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let account_repo = Arc::new(PostgresAccountRepository::new(pool.clone()));
    let category_repo = Arc::new(PostgresCategoryRepository::new(pool.clone()));
    let sale_repo = Arc::new(PostgresSaleRepository::new(pool.clone()));
    let invoice_repo = Arc::new(PostgresInvoiceRepository::new(pool.clone()));
    let metrics_repo = Arc::new(PostgresMetricsRepository::new(pool.clone()));

    let settings = InvoiceSettings {
        prefix: config.invoice_prefix.clone(),
        default_tax_rate: config.default_tax_rate,
        due_days: config.invoice_due_days,
    };

    let accounts = Arc::new(AccountService::new(account_repo.clone()));
    let catalog = Arc::new(CatalogService::new(category_repo, account_repo.clone()));
    let sales = Arc::new(SalesService::new(sale_repo.clone(), account_repo.clone()));
    let invoices = Arc::new(InvoiceService::new(invoice_repo, sale_repo.clone(), settings));
    let dashboard = Arc::new(DashboardService::new(account_repo, sale_repo, metrics_repo));

    Ok(AppState {
        pool,
        config,
        accounts,
        catalog,
        sales,
        invoices,
        dashboard,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}

use crate::domain::{Account, Sale};
use crate::infrastructure::{AccountRepository, MetricsRepository, RepositoryError, SaleRepository};
use crate::ledger::{
    account_days_until_renewal, account_reminders, compute_metrics, filter_expiring_within_days,
    filter_upcoming, project_sales_renewals, AccountReminder, DashboardMetrics, SalesRenewal,
    UPCOMING_RENEWAL_WINDOW,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct DashboardService<A, S, M>
where
    A: AccountRepository,
    S: SaleRepository,
    M: MetricsRepository,
{
    account_repo: Arc<A>,
    sale_repo: Arc<S>,
    metrics_repo: Arc<M>,
}

fn with_countdown(accounts: Vec<&Account>, now: DateTime<Utc>) -> Vec<Account> {
    accounts
        .into_iter()
        .map(|a| {
            let mut account = a.clone();
            account.days_until_renewal = account_days_until_renewal(&account, now);
            account
        })
        .collect()
}

impl<A, S, M> DashboardService<A, S, M>
where
    A: AccountRepository,
    S: SaleRepository,
    M: MetricsRepository,
{
    pub fn new(account_repo: Arc<A>, sale_repo: Arc<S>, metrics_repo: Arc<M>) -> Self {
        Self {
            account_repo,
            sale_repo,
            metrics_repo,
        }
    }

    /// Aggregate figures from the database, or computed here from the raw
    /// account and sale lists when the aggregate query fails.
    pub async fn metrics(&self, now: DateTime<Utc>) -> Result<DashboardMetrics, DashboardError> {
        match self.metrics_repo.load_metrics(now).await {
            Ok(metrics) => Ok(metrics),
            Err(e) => {
                warn!(error = %e, "Aggregate metrics unavailable, computing locally");
                let accounts = self.account_repo.list(None).await?;
                let sales = self.sale_repo.list().await?;
                Ok(compute_metrics(&accounts, &sales, now))
            }
        }
    }

    pub async fn recent_sales(&self, limit: i64) -> Result<Vec<Sale>, DashboardError> {
        Ok(self.sale_repo.list_recent(limit.max(0)).await?)
    }

    /// Renewable accounts due within `days`, soonest first.
    pub async fn expiring(&self, days: i64, now: DateTime<Utc>) -> Result<Vec<Account>, DashboardError> {
        let accounts = self.account_repo.list(None).await?;
        let matched = filter_expiring_within_days(&accounts, now, days.max(0));
        Ok(with_countdown(matched, now))
    }

    pub async fn upcoming_renewals(&self, now: DateTime<Utc>) -> Result<Vec<Account>, DashboardError> {
        let accounts = self.account_repo.list(None).await?;
        let (low, high) = UPCOMING_RENEWAL_WINDOW;
        let matched = filter_upcoming(&accounts, now, low, high);
        Ok(with_countdown(matched, now))
    }

    pub async fn account_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccountReminder>, DashboardError> {
        let accounts = self.account_repo.list(None).await?;
        Ok(account_reminders(&accounts, now))
    }

    pub async fn sales_reminders(&self, now: DateTime<Utc>) -> Result<Vec<SalesRenewal>, DashboardError> {
        let sales = self.sale_repo.list().await?;
        Ok(project_sales_renewals(&sales, now))
    }
}

//! Client-side view of the ledger.
//!
//! Mutations are applied to the local snapshot first, then sent to the
//! backend. When the backend refuses, the snapshot is re-fetched rather than
//! patched back by hand. Everything read from it is recomputed by the pure
//! calculators on demand.

use crate::domain::{Account, CustomerSummary, ProductCategory, Sale, SaleStatus};
use crate::infrastructure::{BackendError, LedgerBackend};
use crate::ledger::{
    account_reminders, aggregate_customers, compute_metrics, derive_categories, project_sales_renewals,
    AccountReminder, DashboardMetrics, SalesRenewal,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Not in snapshot: {0}")]
    Missing(String),
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotState {
    pub accounts: Vec<Account>,
    pub categories: Vec<ProductCategory>,
    pub sales: Vec<Sale>,
    /// Categories were derived from account service types.
    pub categories_derived: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

pub struct LedgerSnapshot<B>
where
    B: LedgerBackend,
{
    backend: Arc<B>,
    state: RwLock<SnapshotState>,
}

impl<B> LedgerSnapshot<B>
where
    B: LedgerBackend,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: RwLock::new(SnapshotState::default()),
        }
    }

    /// Replaces the snapshot with the backend's current state. A failing
    /// category source falls back to categories derived from the accounts.
    pub async fn refresh(&self) -> Result<(), SnapshotError> {
        let (accounts, sales) =
            tokio::try_join!(self.backend.fetch_accounts(), self.backend.fetch_sales())?;

        let (categories, categories_derived) = match self.backend.fetch_categories().await {
            Ok(categories) if !categories.is_empty() => (categories, false),
            Ok(_) => (derive_categories(&accounts), true),
            Err(e) => {
                warn!(error = %e, "Category source unavailable, deriving from accounts");
                (derive_categories(&accounts), true)
            }
        };

        let mut state = self.state.write().await;
        *state = SnapshotState {
            accounts,
            categories,
            sales,
            categories_derived,
            fetched_at: Some(Utc::now()),
        };
        Ok(())
    }

    async fn reconcile(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Re-fetch after failed mutation also failed");
        }
    }

    pub async fn state(&self) -> SnapshotState {
        self.state.read().await.clone()
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.state.read().await.accounts.clone()
    }

    pub async fn sales(&self) -> Vec<Sale> {
        self.state.read().await.sales.clone()
    }

    pub async fn categories(&self) -> Vec<ProductCategory> {
        self.state.read().await.categories.clone()
    }

    pub async fn metrics(&self, now: DateTime<Utc>) -> DashboardMetrics {
        let state = self.state.read().await;
        compute_metrics(&state.accounts, &state.sales, now)
    }

    pub async fn account_reminders(&self, now: DateTime<Utc>) -> Vec<AccountReminder> {
        account_reminders(&self.state.read().await.accounts, now)
    }

    pub async fn sales_reminders(&self, now: DateTime<Utc>) -> Vec<SalesRenewal> {
        project_sales_renewals(&self.state.read().await.sales, now)
    }

    pub async fn customers(&self) -> Vec<CustomerSummary> {
        aggregate_customers(&self.state.read().await.sales)
    }

    pub async fn delete_sale(&self, order_number: &str) -> Result<(), SnapshotError> {
        {
            let mut state = self.state.write().await;
            let before = state.sales.len();
            state.sales.retain(|s| s.order_number != order_number);
            if state.sales.len() == before {
                return Err(SnapshotError::Missing(format!("sale {}", order_number)));
            }
        }

        match self.backend.delete_sale(order_number).await {
            Ok(()) => {
                info!(order_number, "Sale deleted");
                // Slot counters moved server-side.
                self.reload_accounts().await;
                Ok(())
            }
            Err(e) => {
                warn!(order_number, error = %e, "Sale delete rejected, re-fetching");
                self.reconcile().await;
                Err(e.into())
            }
        }
    }

    pub async fn delete_account(&self, id: Uuid) -> Result<(), SnapshotError> {
        {
            let mut state = self.state.write().await;
            let before = state.accounts.len();
            state.accounts.retain(|a| a.id != id);
            if state.accounts.len() == before {
                return Err(SnapshotError::Missing(format!("account {}", id)));
            }
        }

        match self.backend.delete_account(id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(account_id = %id, error = %e, "Account delete rejected, re-fetching");
                self.reconcile().await;
                Err(e.into())
            }
        }
    }

    pub async fn update_sale_status(
        &self,
        order_number: &str,
        status: SaleStatus,
    ) -> Result<Sale, SnapshotError> {
        let previous = {
            let mut state = self.state.write().await;
            let sale = state
                .sales
                .iter_mut()
                .find(|s| s.order_number == order_number)
                .ok_or_else(|| SnapshotError::Missing(format!("sale {}", order_number)))?;
            let previous = sale.status;
            sale.status = status;
            previous
        };

        match self
            .backend
            .update_sale(order_number, &json!({ "status": status }))
            .await
        {
            Ok(updated) => {
                {
                    let mut state = self.state.write().await;
                    if let Some(sale) = state
                        .sales
                        .iter_mut()
                        .find(|s| s.order_number == order_number)
                    {
                        *sale = updated.clone();
                    }
                }
                if previous.holds_slots() != status.holds_slots() {
                    self.reload_accounts().await;
                }
                Ok(updated)
            }
            Err(e) => {
                warn!(order_number, error = %e, "Status change rejected, re-fetching");
                self.reconcile().await;
                Err(e.into())
            }
        }
    }

    /// Sends an account edit. The backend's answer replaces the local copy.
    pub async fn update_account(&self, id: Uuid, changes: &Value) -> Result<Account, SnapshotError> {
        match self.backend.update_account(id, changes).await {
            Ok(updated) => {
                let mut state = self.state.write().await;
                match state.accounts.iter_mut().find(|a| a.id == id) {
                    Some(account) => *account = updated.clone(),
                    None => state.accounts.push(updated.clone()),
                }
                Ok(updated)
            }
            Err(e) => {
                warn!(account_id = %id, error = %e, "Account update rejected, re-fetching");
                self.reconcile().await;
                Err(e.into())
            }
        }
    }

    async fn reload_accounts(&self) {
        match self.backend.fetch_accounts().await {
            Ok(accounts) => self.state.write().await.accounts = accounts,
            Err(e) => warn!(error = %e, "Could not reload accounts"),
        }
    }
}

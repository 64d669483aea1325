use crate::domain::{CustomerSummary, OrderItem, Sale, SaleDraft, SalePatch};
use crate::infrastructure::{AccountRepository, RepositoryError, SaleRepository};
use crate::ledger::{
    aggregate_customers, allocate_slots, discount_for_customer_type, order_totals, RenewalTerm,
    SlotError, TermError,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

/// Term used when an order names neither an end date nor a duration.
pub const DEFAULT_TERM_DAYS: u32 = 30;

#[derive(Error, Debug)]
pub enum SalesError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Slots(#[from] SlotError),
    #[error(transparent)]
    Term(#[from] TermError),
    #[error("{0} is not active")]
    InactiveAccount(String),
}

/// `ORD-YYYYMMDD-XXXXXXXX`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "ORD-{}-{}",
        now.format("%Y%m%d"),
        suffix[..8].to_ascii_uppercase()
    )
}

/// Seats requested per account, merging repeated lines for the same account.
pub fn slot_demand(items: &[OrderItem]) -> BTreeMap<Uuid, i32> {
    let mut demand = BTreeMap::new();
    for item in items {
        *demand.entry(item.account_id).or_insert(0) += item.quantity;
    }
    demand
}

pub struct SalesService<S, A>
where
    S: SaleRepository,
    A: AccountRepository,
{
    sale_repo: Arc<S>,
    account_repo: Arc<A>,
}

impl<S, A> SalesService<S, A>
where
    S: SaleRepository,
    A: AccountRepository,
{
    pub fn new(sale_repo: Arc<S>, account_repo: Arc<A>) -> Self {
        Self {
            sale_repo,
            account_repo,
        }
    }

    /// Validates, prices and records an order, then takes its slots. If any
    /// account runs out of slots midway, slots already taken are given back
    /// and the order is removed.
    pub async fn create_sale(&self, mut draft: SaleDraft, now: DateTime<Utc>) -> Result<Sale, SalesError> {
        draft.discount_rate = discount_for_customer_type(draft.customer_type, draft.discount_rate);
        draft.validate()?;

        let demand = slot_demand(&draft.items);
        for (account_id, quantity) in &demand {
            let mut account = self.account_repo.get_by_id(*account_id).await?;
            if !account.is_active {
                return Err(SalesError::InactiveAccount(account.display_name()));
            }
            // Dry run against the fetched snapshot; the conditional update decides.
            allocate_slots(&mut account, *quantity)?;
        }

        let totals = order_totals(&draft.items, draft.discount_rate);
        let term = match (draft.end_date, draft.duration_days) {
            (Some(end_date), _) => RenewalTerm::from_end_date(draft.start_date, end_date),
            (None, Some(days)) => RenewalTerm::from_duration(draft.start_date, days)?,
            (None, None) => RenewalTerm::from_duration(draft.start_date, DEFAULT_TERM_DAYS)?,
        };

        let sale = Sale {
            id: Uuid::new_v4(),
            order_number: generate_order_number(now),
            items: draft.items,
            customer: draft.customer,
            customer_type: draft.customer_type,
            category_id: draft.category_id,
            discount_rate: draft.discount_rate,
            subtotal: totals.subtotal,
            discount_amount: totals.discount_amount,
            total: totals.total,
            payment_method: draft.payment_method,
            status: draft.status,
            start_date: term.start_date,
            end_date: term.end_date,
            days_until_renewal: term.days_until_renewal,
            term_authority: term.authority,
            notes: draft.notes,
            order_date: now,
            created_at: now,
            updated_at: now,
        };

        self.sale_repo.create(&sale).await?;

        if sale.status.holds_slots() {
            if let Err(e) = self.allocate(&demand).await {
                if let Err(cleanup) = self.sale_repo.delete(&sale.order_number).await {
                    error!(order_number = %sale.order_number, error = %cleanup, "Failed to remove order after slot allocation failure");
                }
                return Err(e);
            }
        }

        info!(
            order_number = %sale.order_number,
            total = %sale.total,
            items = sale.items.len(),
            "Created sale"
        );
        Ok(sale)
    }

    pub async fn get_sale(&self, order_number: &str) -> Result<Sale, SalesError> {
        Ok(self.sale_repo.get_by_order_number(order_number).await?)
    }

    pub async fn list_sales(&self) -> Result<Vec<Sale>, SalesError> {
        Ok(self.sale_repo.list().await?)
    }

    pub async fn recent_sales(&self, limit: i64) -> Result<Vec<Sale>, SalesError> {
        Ok(self.sale_repo.list_recent(limit.max(0)).await?)
    }

    pub async fn list_customers(&self) -> Result<Vec<CustomerSummary>, SalesError> {
        let sales = self.sale_repo.list().await?;
        Ok(aggregate_customers(&sales))
    }

    /// Status, payment method, term and notes. Cancelling gives the order's
    /// slots back; reinstating a cancelled order takes them again.
    pub async fn update_sale(
        &self,
        order_number: &str,
        patch: SalePatch,
        now: DateTime<Utc>,
    ) -> Result<Sale, SalesError> {
        patch.validate()?;
        let mut sale = self.sale_repo.get_by_order_number(order_number).await?;
        let was_holding = sale.status.holds_slots();

        let mut term = RenewalTerm {
            start_date: sale.start_date,
            end_date: sale.end_date,
            days_until_renewal: sale.days_until_renewal,
            authority: sale.term_authority,
        };
        if let Some(start_date) = patch.start_date {
            term.set_start_date(start_date)?;
        }
        if let Some(days) = patch.duration_days {
            term.set_duration(days)?;
        }
        if let Some(end_date) = patch.end_date {
            term.set_end_date(end_date);
        }
        sale.start_date = term.start_date;
        sale.end_date = term.end_date;
        sale.days_until_renewal = term.days_until_renewal;
        sale.term_authority = term.authority;

        if let Some(status) = patch.status {
            sale.status = status;
        }
        if let Some(payment_method) = patch.payment_method {
            sale.payment_method = payment_method;
        }
        if patch.notes.is_some() {
            sale.notes = patch.notes;
        }

        let totals = order_totals(&sale.items, sale.discount_rate);
        sale.subtotal = totals.subtotal;
        sale.discount_amount = totals.discount_amount;
        sale.total = totals.total;
        sale.updated_at = now;

        let demand = slot_demand(&sale.items);
        let holds = sale.status.holds_slots();
        match (was_holding, holds) {
            (true, false) => self.release(&demand).await?,
            (false, true) => self.allocate(&demand).await?,
            _ => {}
        }

        if let Err(e) = self.sale_repo.update(&sale).await {
            // Undo the slot movement so counters match the stored status.
            let undo = match (was_holding, holds) {
                (true, false) => self.allocate(&demand).await,
                (false, true) => self.release(&demand).await,
                _ => Ok(()),
            };
            if let Err(undo_err) = undo {
                error!(order_number, error = %undo_err, "Failed to restore slots after sale update failure");
            }
            return Err(e.into());
        }

        info!(order_number, status = %sale.status, "Updated sale");
        Ok(sale)
    }

    /// Removes an order, giving its slots back unless it was already cancelled.
    pub async fn delete_sale(&self, order_number: &str) -> Result<(), SalesError> {
        let sale = self.sale_repo.get_by_order_number(order_number).await?;
        let demand = slot_demand(&sale.items);

        if sale.status.holds_slots() {
            self.release(&demand).await?;
        }

        if let Err(e) = self.sale_repo.delete(order_number).await {
            if sale.status.holds_slots() {
                if let Err(undo_err) = self.allocate(&demand).await {
                    error!(order_number, error = %undo_err, "Failed to restore slots after sale delete failure");
                }
            }
            return Err(e.into());
        }

        info!(order_number, "Deleted sale");
        Ok(())
    }

    /// Takes slots account by account; on the first refusal every slot taken
    /// so far is given back.
    async fn allocate(&self, demand: &BTreeMap<Uuid, i32>) -> Result<(), SalesError> {
        let mut taken: Vec<(Uuid, i32)> = Vec::with_capacity(demand.len());

        for (account_id, quantity) in demand {
            match self.account_repo.allocate_slots(*account_id, *quantity).await {
                Ok(_) => taken.push((*account_id, *quantity)),
                Err(e) => {
                    warn!(account_id = %account_id, quantity, error = %e, "Slot allocation refused, rolling back");
                    for (id, qty) in taken {
                        if let Err(undo_err) = self.account_repo.release_slots(id, qty).await {
                            error!(account_id = %id, error = %undo_err, "Failed to release slots during rollback");
                        }
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Gives slots back. Accounts that no longer exist are skipped; on any
    /// other failure the slots released so far are taken again.
    async fn release(&self, demand: &BTreeMap<Uuid, i32>) -> Result<(), SalesError> {
        let mut released: Vec<(Uuid, i32)> = Vec::with_capacity(demand.len());

        for (account_id, quantity) in demand {
            match self.account_repo.release_slots(*account_id, *quantity).await {
                Ok(_) => released.push((*account_id, *quantity)),
                Err(RepositoryError::NotFound(_)) => {
                    warn!(account_id = %account_id, "Account gone, nothing to release");
                }
                Err(e) => {
                    warn!(account_id = %account_id, quantity, error = %e, "Slot release failed, rolling back");
                    for (id, qty) in released {
                        if let Err(undo_err) = self.account_repo.allocate_slots(id, qty).await {
                            error!(account_id = %id, error = %undo_err, "Failed to re-allocate slots during rollback");
                        }
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

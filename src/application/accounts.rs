use crate::domain::{Account, AccountPatch, NewAccount};
use crate::infrastructure::{AccountRepository, RepositoryError};
use crate::ledger::{account_days_until_renewal, apply_capacity, SlotError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Slots(#[from] SlotError),
}

pub struct AccountService<A>
where
    A: AccountRepository,
{
    account_repo: Arc<A>,
}

impl<A> AccountService<A>
where
    A: AccountRepository,
{
    pub fn new(account_repo: Arc<A>) -> Self {
        Self { account_repo }
    }

    pub async fn create_account(&self, input: NewAccount) -> Result<Account, AccountError> {
        input.validate()?;

        let account = Account::new(input);
        self.account_repo.create(&account).await?;

        info!(
            account_id = %account.id,
            slots = account.max_user_slots,
            "Created account {}",
            account.display_name()
        );
        Ok(account)
    }

    pub async fn get_account(&self, id: Uuid, now: DateTime<Utc>) -> Result<Account, AccountError> {
        let mut account = self.account_repo.get_by_id(id).await?;
        account.days_until_renewal = account_days_until_renewal(&account, now);
        Ok(account)
    }

    /// Accounts with their renewal countdown filled in.
    pub async fn list_accounts(
        &self,
        category_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Account>, AccountError> {
        let mut accounts = self.account_repo.list(category_id).await?;
        for account in accounts.iter_mut() {
            account.days_until_renewal = account_days_until_renewal(account, now);
        }
        Ok(accounts)
    }

    /// Applies `patch` to the stored account. A capacity change below current
    /// usage, or a result that would fail creation rules, is rejected and
    /// nothing is written.
    pub async fn update_account(
        &self,
        id: Uuid,
        patch: AccountPatch,
        now: DateTime<Utc>,
    ) -> Result<Account, AccountError> {
        let mut account = self.account_repo.get_by_id(id).await?;

        if let Some(new_max) = patch.max_user_slots {
            if let Err(e) = apply_capacity(&mut account, new_max) {
                warn!(account_id = %id, new_max, current_users = account.current_users, "Rejected slot reduction");
                return Err(e.into());
            }
        }
        apply_patch(&mut account, patch);
        if let Err(e) = account.to_input().validate() {
            warn!(account_id = %id, error = %e, "Rejected invalid account edit");
            return Err(e.into());
        }

        let mut updated = self.account_repo.update(&account).await?;
        updated.days_until_renewal = account_days_until_renewal(&updated, now);

        info!(account_id = %id, "Updated account");
        Ok(updated)
    }

    pub async fn delete_account(&self, id: Uuid) -> Result<(), AccountError> {
        self.account_repo.delete(id).await?;
        info!(account_id = %id, "Deleted account");
        Ok(())
    }
}

// Capacity is handled by `apply_capacity`; usage is never patchable.
fn apply_patch(account: &mut Account, patch: AccountPatch) {
    let AccountPatch {
        product_name,
        label,
        email,
        primary_holder,
        max_user_slots: _,
        is_active,
        renewal_status,
        renewal_date,
        subscription_type,
        cost,
        is_shared_account,
        family_features,
        usage_restrictions,
        cost_per_additional_user,
        category_id,
        service_type,
        brand,
    } = patch;

    if let Some(v) = product_name {
        account.product_name = v;
    }
    if let Some(v) = label {
        account.label = v;
    }
    if let Some(v) = email {
        account.email = v;
    }
    if let Some(v) = primary_holder {
        account.primary_holder = v;
    }
    if let Some(v) = is_active {
        account.is_active = v;
    }
    if let Some(v) = renewal_status {
        account.renewal_status = v;
    }
    if renewal_date.is_some() {
        account.renewal_date = renewal_date;
    }
    if let Some(v) = subscription_type {
        account.subscription_type = v;
    }
    if let Some(v) = cost {
        account.cost = v;
    }
    if let Some(v) = is_shared_account {
        account.is_shared_account = v;
    }
    if let Some(v) = family_features {
        account.family_features = v;
    }
    if let Some(v) = usage_restrictions {
        account.usage_restrictions = v;
    }
    if cost_per_additional_user.is_some() {
        account.cost_per_additional_user = cost_per_additional_user;
    }
    if category_id.is_some() {
        account.category_id = category_id;
    }
    if let Some(v) = service_type {
        account.service_type = v;
    }
    if brand.is_some() {
        account.brand = brand;
    }
    account.updated_at = Utc::now();
}

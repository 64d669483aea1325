//! Slot allocation engine.
//!
//! `available_slots` is always derived from `max_user_slots - current_users`
//! and written back after every capacity-affecting change. The primary holder
//! never counts against capacity.

use crate::domain::Account;
use chrono::Utc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("cannot reduce slots below current users ({current_users})")]
    ReductionBelowUsage { current_users: i32 },
    #[error("{account} has no available slots")]
    Exhausted { account: String },
    #[error("{account} has only {available} slot(s) available, {requested} requested")]
    Insufficient {
        account: String,
        requested: i32,
        available: i32,
    },
    #[error("slot count cannot be negative: {0}")]
    Negative(i32),
}

pub fn compute_available_slots(max_user_slots: i32, current_users: i32) -> i32 {
    (max_user_slots - current_users).max(0)
}

/// Must run before persisting any edit that changes `max_user_slots`.
pub fn validate_slot_reduction(new_max: i32, current_users: i32) -> Result<(), SlotError> {
    if new_max < 0 {
        return Err(SlotError::Negative(new_max));
    }
    if new_max < current_users {
        return Err(SlotError::ReductionBelowUsage { current_users });
    }
    Ok(())
}

/// Changes capacity in place. On rejection the account is left untouched.
pub fn apply_capacity(account: &mut Account, new_max: i32) -> Result<(), SlotError> {
    validate_slot_reduction(new_max, account.current_users)?;
    account.max_user_slots = new_max;
    recompute(account);
    Ok(())
}

/// Rejects accounts that cannot take one more user.
pub fn ensure_addable(account: &Account) -> Result<(), SlotError> {
    if compute_available_slots(account.max_user_slots, account.current_users) <= 0 {
        return Err(SlotError::Exhausted {
            account: account.display_name(),
        });
    }
    Ok(())
}

pub fn allocate_slots(account: &mut Account, count: i32) -> Result<(), SlotError> {
    if count < 0 {
        return Err(SlotError::Negative(count));
    }
    ensure_addable(account)?;

    let available = compute_available_slots(account.max_user_slots, account.current_users);
    if count > available {
        return Err(SlotError::Insufficient {
            account: account.display_name(),
            requested: count,
            available,
        });
    }

    account.current_users += count;
    recompute(account);
    Ok(())
}

/// Frees slots; usage never drops below zero.
pub fn release_slots(account: &mut Account, count: i32) -> Result<(), SlotError> {
    if count < 0 {
        return Err(SlotError::Negative(count));
    }
    account.current_users = (account.current_users - count).max(0);
    recompute(account);
    Ok(())
}

/// Re-derives `available_slots`, clamping usage into `[0, max_user_slots]`.
pub fn recompute(account: &mut Account) {
    account.current_users = account.current_users.clamp(0, account.max_user_slots.max(0));
    account.available_slots =
        compute_available_slots(account.max_user_slots, account.current_users);
    account.updated_at = Utc::now();
}

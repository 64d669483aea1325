//! Renewal countdowns and urgency tiers.
//!
//! Two scales coexist and are kept apart on purpose: the account scale drives
//! the dashboard "expiring soon" list and account reminders, the sales scale
//! drives reminders for customers whose yearly subscription comes up again.

use crate::domain::{Account, Sale};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

const SECONDS_PER_DAY: i64 = 86_400;

/// Display cutoff for the dashboard "expiring soon" list.
pub const EXPIRING_SOON_DAYS: i64 = 7;
/// Window for "upcoming renewals", starting after the expiring-soon cutoff.
pub const UPCOMING_RENEWAL_WINDOW: (i64, i64) = (8, 14);
/// How far ahead sales renewals become visible.
pub const SALES_RENEWAL_VISIBILITY_DAYS: i64 = 30;
/// Sales renew one year after the original order.
pub const SALES_RENEWAL_CYCLE_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UrgencyTier {
    Critical,
    Warning,
    Normal,
}

/// Whole days until `target`, rounded up. Negative once `target` has passed.
pub fn days_until(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (target - now).num_seconds();
    let days = secs.div_euclid(SECONDS_PER_DAY);
    if secs.rem_euclid(SECONDS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

/// Countdown for an account, or `None` when it is not in the renewal cycle
/// (inactive, not renewable, or no renewal date).
pub fn account_days_until_renewal(account: &Account, now: DateTime<Utc>) -> Option<i64> {
    if !account.is_renewable() {
        return None;
    }
    account.renewal_date.map(|date| days_until(date, now))
}

/// Account scale: due today or overdue is critical, tomorrow is a warning.
pub fn account_urgency(days_remaining: i64) -> UrgencyTier {
    if days_remaining <= 0 {
        UrgencyTier::Critical
    } else if days_remaining <= 1 {
        UrgencyTier::Warning
    } else {
        UrgencyTier::Normal
    }
}

/// Sales scale: within a week is critical, within fifteen days a warning.
pub fn sales_urgency(days_remaining: i64) -> UrgencyTier {
    if days_remaining <= 7 {
        UrgencyTier::Critical
    } else if days_remaining <= 15 {
        UrgencyTier::Warning
    } else {
        UrgencyTier::Normal
    }
}

fn renewal_in_cycle(account: &Account) -> Option<DateTime<Utc>> {
    if account.is_renewable() {
        account.renewal_date
    } else {
        None
    }
}

/// `now + days`, or `None` when that lies outside chrono's range.
fn offset_days(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|delta| now.checked_add_signed(delta))
}

fn within(date: DateTime<Utc>, from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> bool {
    date >= from && to.map_or(true, |to| date <= to)
}

/// Active renewable accounts renewing in `[now, now + window_days]`, soonest first.
/// A window past the representable range has no upper bound.
pub fn filter_expiring_within_days<'a>(
    accounts: &'a [Account],
    now: DateTime<Utc>,
    window_days: i64,
) -> Vec<&'a Account> {
    let horizon = offset_days(now, window_days.max(0));
    let mut matched: Vec<&Account> = accounts
        .iter()
        .filter(|a| matches!(renewal_in_cycle(a), Some(d) if within(d, now, horizon)))
        .collect();
    matched.sort_by_key(|a| a.renewal_date);
    matched
}

/// Active renewable accounts renewing in `[now + low_days, now + high_days]`.
pub fn filter_upcoming<'a>(
    accounts: &'a [Account],
    now: DateTime<Utc>,
    low_days: i64,
    high_days: i64,
) -> Vec<&'a Account> {
    let Some(from) = offset_days(now, low_days) else {
        return Vec::new();
    };
    let to = offset_days(now, high_days);
    let mut matched: Vec<&Account> = accounts
        .iter()
        .filter(|a| matches!(renewal_in_cycle(a), Some(d) if within(d, from, to)))
        .collect();
    matched.sort_by_key(|a| a.renewal_date);
    matched
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountReminder {
    pub account: Account,
    pub days_until_renewal: i64,
    pub urgency: UrgencyTier,
}

/// Accounts due within the expiring-soon cutoff, including overdue ones,
/// classified on the account scale.
pub fn account_reminders(accounts: &[Account], now: DateTime<Utc>) -> Vec<AccountReminder> {
    let mut reminders: Vec<AccountReminder> = accounts
        .iter()
        .filter_map(|a| {
            let days = account_days_until_renewal(a, now)?;
            (days <= EXPIRING_SOON_DAYS).then(|| AccountReminder {
                account: a.clone(),
                days_until_renewal: days,
                urgency: account_urgency(days),
            })
        })
        .collect();
    reminders.sort_by_key(|r| r.days_until_renewal);
    reminders
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesRenewal {
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub products: Vec<String>,
    pub original_order_date: DateTime<Utc>,
    pub renewal_date: DateTime<Utc>,
    pub days_until_renewal: i64,
    pub urgency: UrgencyTier,
}

/// Projects each sale one cycle forward from its order date and keeps those
/// due within the visibility cutoff. Cancelled sales never renew.
pub fn project_sales_renewals(sales: &[Sale], now: DateTime<Utc>) -> Vec<SalesRenewal> {
    let mut renewals: Vec<SalesRenewal> = sales
        .iter()
        .filter(|s| s.status.holds_slots())
        .filter_map(|s| {
            let renewal_date = s
                .order_date
                .checked_add_months(Months::new(SALES_RENEWAL_CYCLE_MONTHS))?;
            let days = days_until(renewal_date, now);
            if !(0..=SALES_RENEWAL_VISIBILITY_DAYS).contains(&days) {
                return None;
            }
            Some(SalesRenewal {
                order_number: s.order_number.clone(),
                customer_name: s.customer.name.clone(),
                customer_email: s.customer.email.clone(),
                products: s.items.iter().map(|i| i.product_name.clone()).collect(),
                original_order_date: s.order_date,
                renewal_date,
                days_until_renewal: days,
                urgency: sales_urgency(days),
            })
        })
        .collect();
    renewals.sort_by_key(|r| r.days_until_renewal);
    renewals
}

//! Dashboard figures computed from fetched snapshots. Used directly when the
//! aggregate query is unavailable.

use super::pricing::monthly_cost;
use super::renewal::{filter_expiring_within_days, EXPIRING_SOON_DAYS};
use crate::domain::{Account, ProductCategory, Sale, ServiceType};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardMetrics {
    pub total_accounts: i64,
    pub active_accounts: i64,
    pub total_slots: i64,
    pub used_slots: i64,
    pub available_slots: i64,
    pub slot_utilization_pct: Decimal,
    pub total_sales: i64,
    pub total_revenue: Decimal,
    pub monthly_revenue: Decimal,
    pub monthly_cost: Decimal,
    pub expiring_soon: i64,
    /// `false` when the figures were computed locally instead of by the aggregate query.
    pub from_aggregate: bool,
}

pub fn compute_metrics(accounts: &[Account], sales: &[Sale], now: DateTime<Utc>) -> DashboardMetrics {
    let active: Vec<&Account> = accounts.iter().filter(|a| a.is_active).collect();

    let total_slots: i64 = active.iter().map(|a| i64::from(a.max_user_slots)).sum();
    let used_slots: i64 = active.iter().map(|a| i64::from(a.current_users)).sum();

    let counted: Vec<&Sale> = sales.iter().filter(|s| s.status.holds_slots()).collect();
    let total_revenue: Decimal = counted.iter().map(|s| s.total).sum();
    let monthly_revenue: Decimal = counted
        .iter()
        .filter(|s| s.order_date.year() == now.year() && s.order_date.month() == now.month())
        .map(|s| s.total)
        .sum();

    DashboardMetrics {
        total_accounts: accounts.len() as i64,
        active_accounts: active.len() as i64,
        total_slots,
        used_slots,
        available_slots: total_slots - used_slots,
        slot_utilization_pct: utilization_pct(used_slots, total_slots),
        total_sales: counted.len() as i64,
        total_revenue,
        monthly_revenue,
        monthly_cost: active
            .iter()
            .map(|a| monthly_cost(a.cost, a.subscription_type))
            .sum::<Decimal>()
            .round_dp(2),
        expiring_soon: filter_expiring_within_days(accounts, now, EXPIRING_SOON_DAYS).len() as i64,
        from_aggregate: false,
    }
}

pub fn utilization_pct(used: i64, total: i64) -> Decimal {
    if total <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(used) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(1)
}

/// Stand-in categories built from the service types present on accounts.
pub fn derive_categories(accounts: &[Account]) -> Vec<ProductCategory> {
    let service_types: BTreeSet<String> = accounts
        .iter()
        .map(|a| a.service_type.to_string())
        .collect();

    let now = Utc::now();
    service_types
        .into_iter()
        .map(|service_type| ProductCategory {
            id: uuid::Uuid::nil(),
            name: title_case(&service_type),
            description: String::new(),
            icon: String::new(),
            color: String::new(),
            service_types: vec![service_type],
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

fn title_case(raw: &str) -> String {
    if raw == ServiceType::Ai.to_string() || raw == ServiceType::Vpn.to_string() {
        return raw.to_uppercase();
    }
    raw.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

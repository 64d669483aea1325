use crate::domain::{CustomerInfo, Invoice};
use crate::ledger::EXPIRING_SOON_DAYS;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub(super) struct HealthResponse {
    pub(super) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) error: Option<String>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub(super) struct AccountsQuery {
    /// Only accounts in this category.
    pub(super) category: Option<Uuid>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub(super) struct ExpiringQuery {
    #[serde(default = "default_expiring_days")]
    #[param(default = 7, minimum = 0, maximum = 3650)]
    pub(super) days: i64,
}

pub(super) const MAX_EXPIRING_DAYS: i64 = 3650;

pub(super) fn default_expiring_days() -> i64 {
    EXPIRING_SOON_DAYS
}

impl ExpiringQuery {
    /// The requested window, or `None` when it falls outside `0..=MAX_EXPIRING_DAYS`.
    pub(super) fn window_days(&self) -> Option<i64> {
        (0..=MAX_EXPIRING_DAYS).contains(&self.days).then_some(self.days)
    }
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub(super) struct RecentSalesQuery {
    #[param(maximum = 100)]
    pub(super) limit: Option<i64>,
}

pub(super) const MAX_RECENT_SALES: i64 = 100;

#[derive(Deserialize, ToSchema)]
pub(super) struct InvoiceCreateRequest {
    #[schema(example = "ORD-20250101-1A2B3C4D")]
    pub(super) order_number: String,
    /// Overrides the customer snapshot taken from the sale.
    #[schema(value_type = Option<Object>)]
    #[serde(default)]
    pub(super) customer_info: Option<CustomerInfo>,
    #[schema(value_type = Option<String>, example = "11")]
    #[serde(default)]
    pub(super) tax_rate: Option<Decimal>,
    #[serde(default)]
    pub(super) payment_terms: Option<String>,
    #[serde(default)]
    pub(super) due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(super) notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct StatusUpdateRequest {
    #[schema(example = "sent")]
    pub(super) status: String,
}

/// Invoice with its read-time overdue flag.
#[derive(Serialize)]
pub(super) struct InvoiceView {
    #[serde(flatten)]
    pub(super) invoice: Invoice,
    pub(super) is_overdue: bool,
}

impl InvoiceView {
    pub(super) fn new(invoice: Invoice, now: DateTime<Utc>) -> Self {
        let is_overdue = invoice.is_overdue(now);
        Self { invoice, is_overdue }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiring_window_is_bounded() {
        let query = |days| ExpiringQuery { days };
        assert_eq!(query(0).window_days(), Some(0));
        assert_eq!(query(EXPIRING_SOON_DAYS).window_days(), Some(7));
        assert_eq!(query(MAX_EXPIRING_DAYS).window_days(), Some(3650));
        assert_eq!(query(MAX_EXPIRING_DAYS + 1).window_days(), None);
        assert_eq!(query(1_000_000_000_000).window_days(), None);
        assert_eq!(query(-1).window_days(), None);
    }

    #[test]
    fn expiring_window_defaults_to_a_week() {
        let query: ExpiringQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(query.days, EXPIRING_SOON_DAYS);
    }
}

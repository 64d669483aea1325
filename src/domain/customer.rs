use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::CustomerType;

/// Reporting view aggregated over sales; not stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerSummary {
    pub customer_key: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub customer_type: CustomerType,
    pub total_spent: Decimal,
    pub total_orders: usize,
    pub last_order_date: DateTime<Utc>,
    pub preferred_products: Vec<String>,
}

use crate::ledger::TermAuthority;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// One purchase transaction. Totals and the renewal countdown are derived
/// from the items, discount rate and term at write time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sale {
    pub id: Uuid,
    pub order_number: String,
    pub items: Vec<OrderItem>,
    pub customer: CustomerContact,
    pub customer_type: CustomerType,
    pub category_id: Option<Uuid>,
    pub discount_rate: Decimal,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_until_renewal: i64,
    /// Whether the end date or the duration decided the term last.
    #[serde(default)]
    pub term_authority: TermAuthority,
    pub notes: Option<String>,
    pub order_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub account_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct CustomerContact {
    pub customer_id: Option<String>,
    #[validate(length(min = 1, max = 100, message = "customer name is required"))]
    pub name: String,
    #[validate(email(message = "customer email is invalid"))]
    pub email: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CustomerType {
    #[default]
    Standard,
    Reseller,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    BankTransfer,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SaleStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl SaleStatus {
    /// Whether a sale in this status still holds slots on its accounts.
    pub fn holds_slots(&self) -> bool {
        !matches!(self, SaleStatus::Cancelled)
    }
}

/// Order form input, validated before anything is persisted.
#[derive(Debug, Clone, Validate)]
pub struct SaleDraft {
    #[validate(required(message = "a category must be selected"))]
    pub category_id: Option<Uuid>,
    #[validate(custom = "validate_items")]
    pub items: Vec<OrderItem>,
    #[validate]
    pub customer: CustomerContact,
    pub customer_type: CustomerType,
    #[validate(custom = "validate_discount_rate")]
    pub discount_rate: Decimal,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 3650, message = "duration must be between 1 and 3650 days"))]
    pub duration_days: Option<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Validate)]
pub struct SalePatch {
    pub status: Option<SaleStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 3650, message = "duration must be between 1 and 3650 days"))]
    pub duration_days: Option<u32>,
    pub notes: Option<String>,
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();

    if allowed && (7..=15).contains(&digits) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("customer phone is invalid".into());
        Err(err)
    }
}

fn validate_items(items: &[OrderItem]) -> Result<(), ValidationError> {
    if items.is_empty() {
        let mut err = ValidationError::new("no_items");
        err.message = Some("at least one account must be selected".into());
        return Err(err);
    }

    if let Some(item) = items.iter().find(|i| i.quantity <= 0) {
        let mut err = ValidationError::new("quantity");
        err.message = Some(format!("quantity for {} must be at least 1", item.product_name).into());
        return Err(err);
    }

    if let Some(item) = items.iter().find(|i| i.unit_price.is_sign_negative()) {
        let mut err = ValidationError::new("unit_price");
        err.message = Some(format!("price for {} cannot be negative", item.product_name).into());
        return Err(err);
    }

    Ok(())
}

fn validate_discount_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if *rate < Decimal::ZERO || *rate > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("discount_rate");
        err.message = Some("discount must be between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

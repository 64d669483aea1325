//! Payload normalization boundary.
//!
//! Every payload that crosses the wire (request bodies on the server side,
//! responses on the client side) is read through the types here. They accept
//! snake_case and camelCase field names, tolerate numbers sent as strings and
//! loosely formatted dates, and repair list fields that arrive as raw, JSON
//! encoded or comma separated strings. The calculators in `ledger` only ever
//! see the canonical domain types these adapters produce.

use crate::domain::{
    ensure_service_types, Account, AccountPatch, CategoryPatch, CustomerContact, CustomerType,
    NewAccount, NewCategory, OrderItem, PaymentMethod, PrimaryHolder, ProductCategory,
    RenewalStatus, Sale, SaleDraft, SalePatch, SaleStatus, ServiceType, SubscriptionType,
};
use crate::ledger::{order_totals, recompute, RenewalTerm, TermAuthority};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[cfg(feature = "server")]
use utoipa::ToSchema;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// Field-level helpers
// ---------------------------------------------------------------------------

/// Reads a list of strings from whatever shape arrived. Blank entries are dropped.
pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.starts_with('[') {
                if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(trimmed) {
                    return string_list(&parsed);
                }
            }
            trimmed
                .split(',')
                .map(|s| s.trim().trim_matches('"').trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Service types for a category; `["other"]` when nothing usable arrived.
pub fn normalize_service_types(value: &Value) -> Vec<String> {
    ensure_service_types(string_list(value))
}

pub fn parse_datetime_lenient(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    parse_date_lenient(raw).map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

pub fn parse_date_lenient(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn int_from_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => parse_datetime_lenient(&s),
        _ => None,
    })
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => parse_date_lenient(&s),
        _ => None,
    })
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_value))
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(int_from_value))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(bool_from_value))
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(string_list(&v)),
    })
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_uuid(field: &'static str, raw: &str) -> Result<Uuid, NormalizeError> {
    Uuid::parse_str(raw.trim()).map_err(|_| NormalizeError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}

fn parse_optional_uuid(field: &'static str, raw: Option<&str>) -> Result<Option<Uuid>, NormalizeError> {
    raw.map(|r| parse_uuid(field, r)).transpose()
}

fn required<T>(field: &'static str, value: Option<T>) -> Result<T, NormalizeError> {
    value.ok_or(NormalizeError::MissingField(field))
}

fn parse_enum<T: FromStr>(field: &'static str, raw: &str) -> Result<T, NormalizeError> {
    let normalized = raw.trim().to_ascii_lowercase().replace(' ', "_");
    T::from_str(&normalized)
        .or_else(|_| T::from_str(&normalized.replace('_', "-")))
        .map_err(|_| NormalizeError::InvalidValue {
            field,
            value: raw.to_string(),
        })
}

fn parse_renewal_status(raw: &str) -> Result<RenewalStatus, NormalizeError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "non_renewable" | "nonrenewable" => Ok(RenewalStatus::NonRenewable),
        _ => parse_enum("renewal_status", raw),
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "server", derive(ToSchema))]
pub struct PrimaryHolderPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Account as it travels over the wire. `available_slots` is accepted but
/// ignored; it is always re-derived.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "server", derive(ToSchema))]
pub struct AccountPayload {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, alias = "productName")]
    pub product_name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "primaryHolder")]
    pub primary_holder: Option<PrimaryHolderPayload>,
    #[serde(default, alias = "maxUserSlots", deserialize_with = "lenient_int")]
    pub max_user_slots: Option<i32>,
    #[serde(default, alias = "currentUsers", deserialize_with = "lenient_int")]
    pub current_users: Option<i32>,
    #[serde(default, alias = "availableSlots", deserialize_with = "lenient_int")]
    pub available_slots: Option<i32>,
    #[serde(default, alias = "isActive", deserialize_with = "lenient_bool")]
    pub is_active: Option<bool>,
    #[serde(default, alias = "renewalStatus")]
    pub renewal_status: Option<String>,
    #[serde(default, alias = "renewalDate", deserialize_with = "lenient_datetime")]
    pub renewal_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "subscriptionType")]
    pub subscription_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub cost: Option<Decimal>,
    #[serde(default, alias = "isSharedAccount", deserialize_with = "lenient_bool")]
    pub is_shared_account: Option<bool>,
    #[serde(default, alias = "familyFeatures", deserialize_with = "lenient_list")]
    pub family_features: Option<Vec<String>>,
    #[serde(default, alias = "usageRestrictions", deserialize_with = "lenient_list")]
    pub usage_restrictions: Option<Vec<String>>,
    #[serde(default, alias = "costPerAdditionalUser", deserialize_with = "lenient_decimal")]
    pub cost_per_additional_user: Option<Decimal>,
    #[serde(default, alias = "categoryId", deserialize_with = "lenient_id")]
    pub category_id: Option<String>,
    #[serde(default, alias = "serviceType")]
    pub service_type: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt", deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AccountPayload {
    fn holder(&self) -> Option<PrimaryHolder> {
        let holder = self.primary_holder.as_ref()?;
        Some(PrimaryHolder {
            name: holder.name.clone().unwrap_or_default(),
            email: holder.email.clone().unwrap_or_default(),
            phone: holder.phone.clone().filter(|p| !p.trim().is_empty()),
        })
    }

    fn renewal_status_value(&self) -> Result<Option<RenewalStatus>, NormalizeError> {
        self.renewal_status
            .as_deref()
            .map(parse_renewal_status)
            .transpose()
    }

    fn subscription_type_value(&self) -> Result<Option<SubscriptionType>, NormalizeError> {
        self.subscription_type
            .as_deref()
            .map(|s| parse_enum("subscription_type", s))
            .transpose()
    }

    /// Input for account creation. Usage counters in the payload are ignored.
    pub fn into_new_account(self) -> Result<NewAccount, NormalizeError> {
        let renewal_status = self
            .renewal_status_value()?
            .unwrap_or(RenewalStatus::Renewable);
        let subscription_type = self
            .subscription_type_value()?
            .unwrap_or(SubscriptionType::Monthly);
        let primary_holder = self.holder().ok_or(NormalizeError::MissingField("primary_holder"))?;
        let category_id = parse_optional_uuid("category_id", self.category_id.as_deref())?;

        Ok(NewAccount {
            product_name: required("product_name", self.product_name)?,
            label: self.label.unwrap_or_default(),
            email: required("email", self.email)?,
            primary_holder,
            max_user_slots: self.max_user_slots.unwrap_or(0),
            is_active: self.is_active.unwrap_or(true),
            renewal_status,
            renewal_date: self.renewal_date,
            subscription_type,
            cost: self.cost.unwrap_or(Decimal::ZERO),
            is_shared_account: self.is_shared_account.unwrap_or(false),
            family_features: self.family_features.unwrap_or_default(),
            usage_restrictions: self.usage_restrictions.unwrap_or_default(),
            cost_per_additional_user: self.cost_per_additional_user,
            category_id,
            service_type: self
                .service_type
                .as_deref()
                .map(ServiceType::parse_lenient)
                .unwrap_or_default(),
            brand: self.brand,
        })
    }

    pub fn into_patch(self) -> Result<AccountPatch, NormalizeError> {
        Ok(AccountPatch {
            renewal_status: self.renewal_status_value()?,
            subscription_type: self.subscription_type_value()?,
            primary_holder: self.holder(),
            category_id: parse_optional_uuid("category_id", self.category_id.as_deref())?,
            service_type: self.service_type.as_deref().map(ServiceType::parse_lenient),
            product_name: self.product_name,
            label: self.label,
            email: self.email,
            max_user_slots: self.max_user_slots,
            is_active: self.is_active,
            renewal_date: self.renewal_date,
            cost: self.cost,
            is_shared_account: self.is_shared_account,
            family_features: self.family_features,
            usage_restrictions: self.usage_restrictions,
            cost_per_additional_user: self.cost_per_additional_user,
            brand: self.brand,
        })
    }

    /// Full account as stored by the backend. Missing audit dates fall back to `now`.
    pub fn into_account(self, now: DateTime<Utc>) -> Result<Account, NormalizeError> {
        let id = parse_uuid("id", &required("id", self.id.clone())?)?;
        let current_users = self.current_users.unwrap_or(0);
        let created_at = self.created_at.unwrap_or(now);
        let updated_at = self.updated_at.unwrap_or(created_at);
        let input = self.into_new_account()?;

        let mut account = Account::new(input);
        account.id = id;
        account.current_users = current_users;
        recompute(&mut account);
        account.created_at = created_at;
        account.updated_at = updated_at;
        Ok(account)
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "server", derive(ToSchema))]
pub struct CategoryPayload {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Array, JSON-encoded array, or comma separated string.
    #[serde(default, alias = "serviceTypes")]
    #[cfg_attr(feature = "server", schema(value_type = Option<Vec<String>>))]
    pub service_types: Option<Value>,
    #[serde(default, alias = "isActive", deserialize_with = "lenient_bool")]
    pub is_active: Option<bool>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt", deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CategoryPayload {
    fn service_types_value(&self) -> Vec<String> {
        self.service_types
            .as_ref()
            .map(normalize_service_types)
            .unwrap_or_else(|| ensure_service_types(Vec::new()))
    }

    pub fn into_new_category(self) -> Result<NewCategory, NormalizeError> {
        let service_types = self.service_types_value();
        Ok(NewCategory {
            name: required("name", self.name)?,
            description: self.description.unwrap_or_default(),
            icon: self.icon.unwrap_or_default(),
            color: self.color.unwrap_or_default(),
            service_types,
        })
    }

    pub fn into_patch(self) -> CategoryPatch {
        let service_types = self.service_types.as_ref().map(normalize_service_types);
        CategoryPatch {
            name: self.name,
            description: self.description,
            icon: self.icon,
            color: self.color,
            service_types,
            is_active: self.is_active,
        }
    }

    pub fn into_category(self, now: DateTime<Utc>) -> Result<ProductCategory, NormalizeError> {
        let id = parse_uuid("id", &required("id", self.id.clone())?)?;
        let is_active = self.is_active.unwrap_or(true);
        let created_at = self.created_at.unwrap_or(now);
        let updated_at = self.updated_at.unwrap_or(created_at);

        let mut category = ProductCategory::new(self.into_new_category()?);
        category.id = id;
        category.is_active = is_active;
        category.created_at = created_at;
        category.updated_at = updated_at;
        Ok(category)
    }
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "server", derive(ToSchema))]
pub struct OrderItemPayload {
    #[serde(default, alias = "accountId", deserialize_with = "lenient_id")]
    pub account_id: Option<String>,
    #[serde(default, alias = "productName")]
    pub product_name: Option<String>,
    #[serde(default, alias = "unitPrice", alias = "price", deserialize_with = "lenient_decimal")]
    pub unit_price: Option<Decimal>,
    #[serde(default, alias = "qty", deserialize_with = "lenient_int")]
    pub quantity: Option<i32>,
}

impl OrderItemPayload {
    fn into_item(self) -> Result<OrderItem, NormalizeError> {
        let raw_id = required("account_id", self.account_id)?;
        Ok(OrderItem {
            account_id: parse_uuid("account_id", &raw_id)?,
            product_name: self.product_name.unwrap_or_default(),
            unit_price: self.unit_price.unwrap_or(Decimal::ZERO),
            quantity: self.quantity.unwrap_or(1),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "server", derive(ToSchema))]
pub struct CustomerPayload {
    #[serde(default, alias = "customerId", alias = "id", deserialize_with = "lenient_id")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Sale as it travels over the wire. Customer details may come nested under
/// `customer` or flat as `customer_name`/`customer_email`/`customer_phone`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "server", derive(ToSchema))]
pub struct SalePayload {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, alias = "orderNumber")]
    pub order_number: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemPayload>,
    #[serde(default)]
    pub customer: Option<CustomerPayload>,
    #[serde(default, alias = "customerId", deserialize_with = "lenient_id")]
    pub customer_id: Option<String>,
    #[serde(default, alias = "customerName")]
    pub customer_name: Option<String>,
    #[serde(default, alias = "customerEmail")]
    pub customer_email: Option<String>,
    #[serde(default, alias = "customerPhone")]
    pub customer_phone: Option<String>,
    #[serde(default, alias = "customerType")]
    pub customer_type: Option<String>,
    #[serde(default, alias = "categoryId", deserialize_with = "lenient_id")]
    pub category_id: Option<String>,
    #[serde(default, alias = "discountRate", alias = "discount", deserialize_with = "lenient_decimal")]
    pub discount_rate: Option<Decimal>,
    #[serde(default, alias = "paymentMethod")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "startDate", deserialize_with = "lenient_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, alias = "endDate", deserialize_with = "lenient_date")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, alias = "durationDays", deserialize_with = "lenient_int")]
    pub duration_days: Option<i32>,
    #[serde(default, alias = "termAuthority")]
    pub term_authority: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "orderDate", deserialize_with = "lenient_datetime")]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt", deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SalePayload {
    fn contact(&self) -> CustomerContact {
        let nested = self.customer.clone().unwrap_or_default();
        CustomerContact {
            customer_id: nested.customer_id.or_else(|| self.customer_id.clone()),
            name: nested
                .name
                .or_else(|| self.customer_name.clone())
                .unwrap_or_default()
                .trim()
                .to_string(),
            email: nested
                .email
                .or_else(|| self.customer_email.clone())
                .unwrap_or_default()
                .trim()
                .to_string(),
            phone: nested
                .phone
                .or_else(|| self.customer_phone.clone())
                .unwrap_or_default()
                .trim()
                .to_string(),
        }
    }

    fn duration(&self) -> Result<Option<u32>, NormalizeError> {
        self.duration_days
            .map(|d| {
                u32::try_from(d).map_err(|_| NormalizeError::InvalidValue {
                    field: "duration_days",
                    value: d.to_string(),
                })
            })
            .transpose()
    }

    fn customer_type_value(&self) -> Result<CustomerType, NormalizeError> {
        self.customer_type
            .as_deref()
            .map(|s| parse_enum("customer_type", s))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn payment_method_value(&self) -> Result<PaymentMethod, NormalizeError> {
        self.payment_method
            .as_deref()
            .map(|s| parse_enum("payment_method", s))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn status_value(&self) -> Result<Option<SaleStatus>, NormalizeError> {
        self.status
            .as_deref()
            .map(|s| parse_enum("status", s))
            .transpose()
    }

    /// Order form input. A missing start date means "today".
    pub fn into_draft(self, now: DateTime<Utc>) -> Result<SaleDraft, NormalizeError> {
        let customer = self.contact();
        let customer_type = self.customer_type_value()?;
        let payment_method = self.payment_method_value()?;
        let status = self.status_value()?.unwrap_or_default();
        let duration_days = self.duration()?;
        let category_id = parse_optional_uuid("category_id", self.category_id.as_deref())?;
        let items = self
            .items
            .into_iter()
            .map(OrderItemPayload::into_item)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SaleDraft {
            category_id,
            items,
            customer,
            customer_type,
            discount_rate: self.discount_rate.unwrap_or(Decimal::ZERO),
            payment_method,
            status,
            start_date: self.start_date.unwrap_or_else(|| now.date_naive()),
            end_date: self.end_date,
            duration_days,
            notes: self.notes,
        })
    }

    pub fn into_patch(self) -> Result<SalePatch, NormalizeError> {
        Ok(SalePatch {
            status: self.status_value()?,
            payment_method: self
                .payment_method
                .as_deref()
                .map(|s| parse_enum("payment_method", s))
                .transpose()?,
            duration_days: self.duration()?,
            start_date: self.start_date,
            end_date: self.end_date,
            notes: self.notes,
        })
    }

    /// Full sale as stored by the backend. Totals and the countdown are
    /// re-derived from items, rate and dates rather than taken from the payload.
    pub fn into_sale(self, now: DateTime<Utc>) -> Result<Sale, NormalizeError> {
        let order_number = required("order_number", self.order_number.clone())?;
        let id = match self.id.as_deref() {
            Some(raw) => parse_uuid("id", raw)?,
            None => Uuid::new_v4(),
        };
        let order_date = self.order_date.or(self.created_at).unwrap_or(now);
        let created_at = self.created_at.unwrap_or(order_date);
        let updated_at = self.updated_at.unwrap_or(created_at);

        let authority = self
            .term_authority
            .as_deref()
            .map(|s| parse_enum::<TermAuthority>("term_authority", s))
            .transpose()?;
        let draft = self.into_draft(now)?;
        let mut term = match (draft.end_date, draft.duration_days) {
            (Some(end), _) => RenewalTerm::from_end_date(draft.start_date, end),
            (None, Some(days)) => RenewalTerm::from_duration(draft.start_date, days).map_err(|_| {
                NormalizeError::InvalidValue {
                    field: "duration_days",
                    value: days.to_string(),
                }
            })?,
            (None, None) => RenewalTerm::from_end_date(draft.start_date, draft.start_date),
        };
        if let Some(authority) = authority {
            term.authority = authority;
        }
        let totals = order_totals(&draft.items, draft.discount_rate);

        Ok(Sale {
            id,
            order_number,
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
            order_date,
            created_at,
            updated_at,
        })
    }
}

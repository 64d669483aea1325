use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// A subscription credential owned by the reseller and shared across user slots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub product_name: String,
    pub label: String,
    pub email: String,
    pub primary_holder: PrimaryHolder,
    pub max_user_slots: i32,
    pub current_users: i32,
    pub available_slots: i32,
    pub is_active: bool,
    pub renewal_status: RenewalStatus,
    pub renewal_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_until_renewal: Option<i64>,
    pub subscription_type: SubscriptionType,
    pub cost: Decimal,
    pub is_shared_account: bool,
    pub family_features: Vec<String>,
    pub usage_restrictions: Vec<String>,
    pub cost_per_additional_user: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub service_type: ServiceType,
    pub brand: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The owner of the credential. Never occupies a slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct PrimaryHolder {
    #[validate(length(min = 1, message = "primary holder name is required"))]
    pub name: String,
    #[validate(email(message = "primary holder email is invalid"))]
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
pub enum RenewalStatus {
    #[serde(rename = "renewable")]
    #[strum(serialize = "renewable")]
    Renewable,
    #[serde(rename = "non-renewable")]
    #[strum(serialize = "non-renewable")]
    NonRenewable,
    #[serde(rename = "expired")]
    #[strum(serialize = "expired")]
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionType {
    Monthly,
    Annual,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceType {
    Streaming,
    Music,
    Productivity,
    Gaming,
    Education,
    CloudStorage,
    Vpn,
    Design,
    Ai,
    #[default]
    Other,
}

impl ServiceType {
    /// Lenient parse used at payload boundaries; unknown values fall back to `Other`.
    pub fn parse_lenient(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        normalized.parse().unwrap_or_default()
    }
}

/// Input for creating an account. Slot usage always starts at zero.
#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_renewal_date", skip_on_field_errors = false))]
pub struct NewAccount {
    #[validate(length(min = 1, message = "product name is required"))]
    pub product_name: String,
    #[validate(length(min = 1, message = "label is required"))]
    pub label: String,
    #[validate(email(message = "account email is invalid"))]
    pub email: String,
    #[validate]
    pub primary_holder: PrimaryHolder,
    #[validate(range(min = 0, message = "slot count cannot be negative"))]
    pub max_user_slots: i32,
    pub is_active: bool,
    pub renewal_status: RenewalStatus,
    pub renewal_date: Option<DateTime<Utc>>,
    pub subscription_type: SubscriptionType,
    #[validate(custom = "validate_cost")]
    pub cost: Decimal,
    pub is_shared_account: bool,
    pub family_features: Vec<String>,
    pub usage_restrictions: Vec<String>,
    pub cost_per_additional_user: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub service_type: ServiceType,
    pub brand: Option<String>,
}

/// Partial edit of an account. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub product_name: Option<String>,
    pub label: Option<String>,
    pub email: Option<String>,
    pub primary_holder: Option<PrimaryHolder>,
    pub max_user_slots: Option<i32>,
    pub is_active: Option<bool>,
    pub renewal_status: Option<RenewalStatus>,
    pub renewal_date: Option<DateTime<Utc>>,
    pub subscription_type: Option<SubscriptionType>,
    pub cost: Option<Decimal>,
    pub is_shared_account: Option<bool>,
    pub family_features: Option<Vec<String>>,
    pub usage_restrictions: Option<Vec<String>>,
    pub cost_per_additional_user: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub service_type: Option<ServiceType>,
    pub brand: Option<String>,
}

fn validate_cost(cost: &Decimal) -> Result<(), ValidationError> {
    if cost.is_sign_negative() && !cost.is_zero() {
        let mut err = ValidationError::new("cost");
        err.message = Some("cost cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_renewal_date(account: &NewAccount) -> Result<(), ValidationError> {
    if account.renewal_status == RenewalStatus::Renewable && account.renewal_date.is_none() {
        let mut err = ValidationError::new("renewal_date");
        err.message = Some("renewal date is required for renewable accounts".into());
        return Err(err);
    }
    Ok(())
}

impl Account {
    pub fn new(input: NewAccount) -> Self {
        let now = Utc::now();
        let max_user_slots = input.max_user_slots.max(0);

        Self {
            id: Uuid::new_v4(),
            product_name: input.product_name,
            label: input.label,
            email: input.email,
            primary_holder: input.primary_holder,
            max_user_slots,
            current_users: 0,
            available_slots: max_user_slots,
            is_active: input.is_active,
            renewal_status: input.renewal_status,
            renewal_date: input.renewal_date,
            days_until_renewal: None,
            subscription_type: input.subscription_type,
            cost: input.cost,
            is_shared_account: input.is_shared_account,
            family_features: input.family_features,
            usage_restrictions: input.usage_restrictions,
            cost_per_additional_user: input.cost_per_additional_user,
            category_id: input.category_id,
            service_type: input.service_type,
            brand: input.brand,
            created_at: now,
            updated_at: now,
        }
    }

    /// Editable fields as creation input, so an edited account is held to
    /// the same rules as a new one.
    pub fn to_input(&self) -> NewAccount {
        NewAccount {
            product_name: self.product_name.clone(),
            label: self.label.clone(),
            email: self.email.clone(),
            primary_holder: self.primary_holder.clone(),
            max_user_slots: self.max_user_slots,
            is_active: self.is_active,
            renewal_status: self.renewal_status,
            renewal_date: self.renewal_date,
            subscription_type: self.subscription_type,
            cost: self.cost,
            is_shared_account: self.is_shared_account,
            family_features: self.family_features.clone(),
            usage_restrictions: self.usage_restrictions.clone(),
            cost_per_additional_user: self.cost_per_additional_user,
            category_id: self.category_id,
            service_type: self.service_type,
            brand: self.brand.clone(),
        }
    }

    pub fn is_renewable(&self) -> bool {
        self.is_active && self.renewal_status == RenewalStatus::Renewable
    }

    /// Display name used in user-facing messages.
    pub fn display_name(&self) -> String {
        if self.label.is_empty() {
            self.product_name.clone()
        } else {
            format!("{} ({})", self.product_name, self.label)
        }
    }
}

//! Order totals, discounts and the order renewal term.

use crate::domain::{CustomerType, OrderItem, SubscriptionType};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Durations offered as one-click choices on the order form.
pub const QUICK_DURATIONS: [u32; 7] = [7, 14, 30, 60, 90, 180, 365];

/// Rate applied when a reseller is selected and no rate was typed yet.
pub const RESELLER_DEFAULT_DISCOUNT: Decimal = Decimal::TEN;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
}

pub fn subtotal(items: &[OrderItem]) -> Decimal {
    items
        .iter()
        .map(|i| i.unit_price * Decimal::from(i.quantity))
        .sum()
}

pub fn clamp_discount_rate(rate: Decimal) -> Decimal {
    rate.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
}

pub fn discount_amount(subtotal: Decimal, discount_rate: Decimal) -> Decimal {
    subtotal * clamp_discount_rate(discount_rate) / Decimal::ONE_HUNDRED
}

pub fn total(subtotal: Decimal, discount_amount: Decimal) -> Decimal {
    subtotal - discount_amount
}

pub fn order_totals(items: &[OrderItem], discount_rate: Decimal) -> OrderTotals {
    let subtotal = subtotal(items);
    let discount_amount = discount_amount(subtotal, discount_rate);
    OrderTotals {
        subtotal,
        discount_amount,
        total: total(subtotal, discount_amount),
    }
}

/// Discount rate after the customer type changes. Selecting a reseller fills
/// in the default only over an untouched (zero) rate; going back to standard
/// keeps whatever is there.
pub fn discount_for_customer_type(customer_type: CustomerType, current_rate: Decimal) -> Decimal {
    match customer_type {
        CustomerType::Reseller if current_rate.is_zero() => RESELLER_DEFAULT_DISCOUNT,
        _ => current_rate,
    }
}

/// Whole days between two dates, floored at zero.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days().max(0)
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermError {
    #[error("a term of {0} days is out of range")]
    OutOfRange(u32),
}

/// Which input last decided the term. Stored with the sale so later edits
/// re-derive from the same side.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TermAuthority {
    #[default]
    EndDate,
    Duration,
}

/// Start/end dates and countdown of an order, kept mutually consistent.
///
/// The field edited most recently wins; the other is recomputed from it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenewalTerm {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_until_renewal: i64,
    pub authority: TermAuthority,
}

impl RenewalTerm {
    pub fn from_duration(start_date: NaiveDate, days: u32) -> Result<Self, TermError> {
        let end_date = start_date
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or(TermError::OutOfRange(days))?;
        Ok(Self {
            start_date,
            end_date,
            days_until_renewal: i64::from(days),
            authority: TermAuthority::Duration,
        })
    }

    pub fn from_end_date(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            days_until_renewal: days_between(start_date, end_date),
            authority: TermAuthority::EndDate,
        }
    }

    pub fn set_duration(&mut self, days: u32) -> Result<(), TermError> {
        *self = Self::from_duration(self.start_date, days)?;
        Ok(())
    }

    pub fn set_end_date(&mut self, end_date: NaiveDate) {
        *self = Self::from_end_date(self.start_date, end_date);
    }

    /// Moves the start, re-deriving from whichever side is authoritative.
    pub fn set_start_date(&mut self, start_date: NaiveDate) -> Result<(), TermError> {
        *self = match self.authority {
            TermAuthority::Duration => {
                let days = u32::try_from(self.days_until_renewal).unwrap_or(0);
                Self::from_duration(start_date, days)?
            }
            TermAuthority::EndDate => Self::from_end_date(start_date, self.end_date),
        };
        Ok(())
    }
}

const WEEKS_PER_MONTH: Decimal = Decimal::from_parts(433, 0, 0, false, 2);
const MONTHS_PER_YEAR: Decimal = Decimal::from_parts(12, 0, 0, false, 0);

/// Approximate weekly cost for display, assuming 4.33 weeks per month.
pub fn weekly_cost(cost: Decimal, subscription_type: SubscriptionType) -> Decimal {
    let monthly = match subscription_type {
        SubscriptionType::Monthly => cost,
        SubscriptionType::Annual => cost / MONTHS_PER_YEAR,
    };
    (monthly / WEEKS_PER_MONTH).round_dp(2)
}

/// Cost per calendar month, used for dashboard cost totals.
pub fn monthly_cost(cost: Decimal, subscription_type: SubscriptionType) -> Decimal {
    match subscription_type {
        SubscriptionType::Monthly => cost,
        SubscriptionType::Annual => cost / MONTHS_PER_YEAR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item(price: i64, qty: i32) -> OrderItem {
        OrderItem {
            account_id: Uuid::new_v4(),
            product_name: "Disney+".to_string(),
            unit_price: Decimal::from(price),
            quantity: qty,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn order_scenario_with_ten_percent_discount() {
        let totals = order_totals(&[item(1000, 2), item(500, 1)], Decimal::from(10));
        assert_eq!(totals.subtotal, Decimal::from(2500));
        assert_eq!(totals.discount_amount, Decimal::from(250));
        assert_eq!(totals.total, Decimal::from(2250));
    }

    #[test]
    fn discount_rate_is_clamped() {
        let sub = Decimal::from(400);
        assert_eq!(discount_amount(sub, Decimal::from(150)), sub);
        assert_eq!(discount_amount(sub, Decimal::from(-5)), Decimal::ZERO);
    }

    #[test]
    fn zero_and_full_discount_edges() {
        let sub = Decimal::from(999);
        assert_eq!(total(sub, discount_amount(sub, Decimal::ZERO)), sub);
        assert_eq!(
            total(sub, discount_amount(sub, Decimal::ONE_HUNDRED)),
            Decimal::ZERO
        );
    }

    #[test]
    fn reseller_default_only_over_zero_rate() {
        assert_eq!(
            discount_for_customer_type(CustomerType::Reseller, Decimal::ZERO),
            Decimal::from(10)
        );
        assert_eq!(
            discount_for_customer_type(CustomerType::Reseller, Decimal::from(15)),
            Decimal::from(15)
        );
        assert_eq!(
            discount_for_customer_type(CustomerType::Standard, Decimal::from(10)),
            Decimal::from(10)
        );
    }

    #[test]
    fn one_month_quick_duration() {
        let term = RenewalTerm::from_duration(date(2025, 1, 1), 30).unwrap();
        assert_eq!(term.end_date, date(2025, 1, 31));
        assert_eq!(term.days_until_renewal, 30);
    }

    #[test]
    fn quick_durations_round_trip() {
        let start = date(2024, 2, 20);
        for d in QUICK_DURATIONS {
            let term = RenewalTerm::from_duration(start, d).unwrap();
            assert_eq!(days_between(term.start_date, term.end_date), i64::from(d));
            assert_eq!(term.days_until_renewal, i64::from(d));
        }
    }

    #[test]
    fn end_date_before_start_floors_at_zero() {
        let term = RenewalTerm::from_end_date(date(2025, 5, 10), date(2025, 5, 1));
        assert_eq!(term.days_until_renewal, 0);
    }

    #[test]
    fn most_recent_edit_is_authoritative() {
        let mut term = RenewalTerm::from_duration(date(2025, 1, 1), 30).unwrap();
        term.set_start_date(date(2025, 1, 11)).unwrap();
        assert_eq!(term.end_date, date(2025, 2, 10));
        assert_eq!(term.days_until_renewal, 30);

        term.set_end_date(date(2025, 3, 1));
        assert_eq!(term.authority, TermAuthority::EndDate);
        assert_eq!(term.days_until_renewal, 49);

        term.set_start_date(date(2025, 2, 1)).unwrap();
        assert_eq!(term.end_date, date(2025, 3, 1));
        assert_eq!(term.days_until_renewal, 28);

        term.set_duration(7).unwrap();
        assert_eq!(term.end_date, date(2025, 2, 8));
        assert_eq!(term.authority, TermAuthority::Duration);
    }

    #[test]
    fn duration_past_the_calendar_is_an_error() {
        let start = date(2025, 1, 1);
        assert_eq!(
            RenewalTerm::from_duration(start, 2_000_000_000),
            Err(TermError::OutOfRange(2_000_000_000))
        );

        let mut term = RenewalTerm::from_duration(start, 30).unwrap();
        assert!(term.set_duration(u32::MAX).is_err());
        assert_eq!(term.end_date, date(2025, 1, 31));
    }

    #[test]
    fn term_authority_round_trips_through_its_column_text() {
        assert_eq!(TermAuthority::Duration.to_string(), "duration");
        assert_eq!("end_date".parse::<TermAuthority>().unwrap(), TermAuthority::EndDate);
        assert_eq!(TermAuthority::default(), TermAuthority::EndDate);
    }

    #[test]
    fn weekly_cost_uses_four_point_three_three_weeks() {
        assert_eq!(
            weekly_cost(Decimal::from(433), SubscriptionType::Monthly),
            Decimal::from(100)
        );
        assert_eq!(
            weekly_cost(Decimal::from(5196), SubscriptionType::Annual),
            Decimal::from(100)
        );
    }
}

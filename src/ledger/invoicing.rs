//! Invoice derivation from a sale snapshot.

use crate::domain::{CustomerInfo, InvoiceItem, InvoiceStatus, OrderItem, Sale, SaleStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvoiceDerivationError {
    #[error("sale {0} has no items to invoice")]
    NoItems(String),
    #[error("cannot invoice a cancelled sale ({0})")]
    CancelledSale(String),
    #[error("tax rate must be between 0 and 100, got {0}")]
    InvalidTaxRate(Decimal),
    #[error("reseller discount must be between 0 and 100, got {0}")]
    InvalidResellerDiscount(Decimal),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

fn percent(value: Decimal, pct: Decimal) -> Decimal {
    value * pct / Decimal::ONE_HUNDRED
}

pub fn standard_line(item: &OrderItem) -> InvoiceItem {
    InvoiceItem {
        account_id: item.account_id,
        description: item.product_name.clone(),
        quantity: item.quantity,
        unit_price: item.unit_price,
        original_price: None,
        discount_percentage: None,
        line_total: item.unit_price * Decimal::from(item.quantity),
    }
}

/// Reseller pricing: the sale price becomes the original price and the
/// reseller discount is applied per line.
pub fn reseller_line(item: &OrderItem, discount_percentage: Decimal) -> InvoiceItem {
    let original_price = item.unit_price;
    let keep = Decimal::ONE - discount_percentage / Decimal::ONE_HUNDRED;
    InvoiceItem {
        account_id: item.account_id,
        description: item.product_name.clone(),
        quantity: item.quantity,
        unit_price: original_price * keep,
        original_price: Some(original_price),
        discount_percentage: Some(discount_percentage),
        line_total: original_price * Decimal::from(item.quantity) * keep,
    }
}

/// Discount carried by a reseller line; zero for standard lines.
pub fn line_discount(line: &InvoiceItem) -> Decimal {
    match (line.original_price, line.discount_percentage) {
        (Some(original), Some(pct)) => percent(original * Decimal::from(line.quantity), pct),
        _ => Decimal::ZERO,
    }
}

pub fn invoice_totals(lines: &[InvoiceItem], tax_rate: Decimal) -> InvoiceTotals {
    let subtotal: Decimal = lines.iter().map(|l| l.line_total).sum();
    let discount_amount: Decimal = lines.iter().map(line_discount).sum();
    let tax_amount = percent(subtotal - discount_amount, tax_rate);
    InvoiceTotals {
        subtotal,
        discount_amount,
        tax_rate,
        tax_amount,
        total_amount: subtotal - discount_amount + tax_amount,
    }
}

/// Builds invoice lines for a sale. A reseller block on the customer snapshot
/// switches every line to reseller pricing.
pub fn derive_lines(
    sale: &Sale,
    customer: &CustomerInfo,
) -> Result<Vec<InvoiceItem>, InvoiceDerivationError> {
    if sale.status == SaleStatus::Cancelled {
        return Err(InvoiceDerivationError::CancelledSale(sale.order_number.clone()));
    }
    if sale.items.is_empty() {
        return Err(InvoiceDerivationError::NoItems(sale.order_number.clone()));
    }

    match &customer.reseller_info {
        Some(reseller) => {
            let pct = reseller.discount_rate;
            if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                return Err(InvoiceDerivationError::InvalidResellerDiscount(pct));
            }
            Ok(sale.items.iter().map(|i| reseller_line(i, pct)).collect())
        }
        None => Ok(sale.items.iter().map(standard_line).collect()),
    }
}

/// Lines plus totals for a sale, ready to be frozen into an invoice.
pub fn derive_invoice(
    sale: &Sale,
    customer: &CustomerInfo,
    tax_rate: Decimal,
) -> Result<(Vec<InvoiceItem>, InvoiceTotals), InvoiceDerivationError> {
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
        return Err(InvoiceDerivationError::InvalidTaxRate(tax_rate));
    }
    let lines = derive_lines(sale, customer)?;
    let totals = invoice_totals(&lines, tax_rate);
    Ok((lines, totals))
}

pub fn is_overdue(status: InvoiceStatus, due_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    status != InvoiceStatus::Paid && now > due_date
}

/// `{prefix}-{YYYYMM}-{seq:04}`
pub fn format_invoice_number(prefix: &str, issued: DateTime<Utc>, sequence: i64) -> String {
    format!("{}-{}-{:04}", prefix, issued.format("%Y%m"), sequence)
}

use crate::domain::{
    CustomerInfo, CustomerType, Invoice, InvoiceStatus, ResellerInfo, Sale,
};
use crate::infrastructure::{InvoiceRepository, RepositoryError, SaleRepository};
use crate::ledger::{customer_key, derive_invoice, format_invoice_number, InvoiceDerivationError};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum InvoiceError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Derivation(#[from] InvoiceDerivationError),
    #[error("Invoice cannot move from {from} to {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },
}

/// Everything needed to bill a sale. Unset fields fall back to the sale and
/// the configured invoicing defaults.
#[derive(Debug, Clone, Default)]
pub struct InvoiceRequest {
    pub order_number: String,
    pub customer_info: Option<CustomerInfo>,
    pub tax_rate: Option<Decimal>,
    pub payment_terms: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvoiceSettings {
    pub prefix: String,
    pub default_tax_rate: Decimal,
    pub due_days: i64,
}

/// Customer snapshot taken from the sale. Reseller orders carry their
/// discount rate into the reseller block.
pub fn customer_info_from_sale(sale: &Sale) -> CustomerInfo {
    let reseller_info = (sale.customer_type == CustomerType::Reseller).then(|| ResellerInfo {
        reseller_id: customer_key(sale),
        discount_rate: sale.discount_rate,
        minimum_order_quantity: 1,
        special_terms: None,
    });

    CustomerInfo {
        name: sale.customer.name.clone(),
        email: sale.customer.email.clone(),
        phone: Some(sale.customer.phone.clone()).filter(|p| !p.is_empty()),
        address: None,
        reseller_info,
    }
}

pub struct InvoiceService<I, S>
where
    I: InvoiceRepository,
    S: SaleRepository,
{
    invoice_repo: Arc<I>,
    sale_repo: Arc<S>,
    settings: InvoiceSettings,
}

impl<I, S> InvoiceService<I, S>
where
    I: InvoiceRepository,
    S: SaleRepository,
{
    pub fn new(invoice_repo: Arc<I>, sale_repo: Arc<S>, settings: InvoiceSettings) -> Self {
        Self {
            invoice_repo,
            sale_repo,
            settings,
        }
    }

    /// Derives lines and totals from the sale and freezes them as a draft invoice.
    pub async fn create_invoice(
        &self,
        request: InvoiceRequest,
        now: DateTime<Utc>,
    ) -> Result<Invoice, InvoiceError> {
        let sale = self
            .sale_repo
            .get_by_order_number(&request.order_number)
            .await?;

        let customer_info = request
            .customer_info
            .unwrap_or_else(|| customer_info_from_sale(&sale));
        let tax_rate = request.tax_rate.unwrap_or(self.settings.default_tax_rate);
        let (items, totals) = derive_invoice(&sale, &customer_info, tax_rate)?;

        let period = now.format("%Y%m").to_string();
        let sequence = self
            .invoice_repo
            .next_sequence(&self.settings.prefix, &period)
            .await?;

        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number: format_invoice_number(&self.settings.prefix, now, sequence),
            order_number: sale.order_number.clone(),
            issue_date: now,
            due_date: request
                .due_date
                .unwrap_or_else(|| now + Duration::days(self.settings.due_days)),
            status: InvoiceStatus::Draft,
            items,
            subtotal: totals.subtotal,
            tax_rate: totals.tax_rate,
            tax_amount: totals.tax_amount,
            discount_amount: totals.discount_amount,
            total_amount: totals.total_amount,
            customer_info,
            payment_terms: request
                .payment_terms
                .unwrap_or_else(|| format!("Net {}", self.settings.due_days)),
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };

        self.invoice_repo.create(&invoice).await?;

        info!(
            invoice_number = %invoice.invoice_number,
            order_number = %invoice.order_number,
            total = %invoice.total_amount,
            "Created invoice"
        );
        Ok(invoice)
    }

    pub async fn get_invoice(&self, invoice_number: &str) -> Result<Invoice, InvoiceError> {
        Ok(self.invoice_repo.get_by_number(invoice_number).await?)
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>, InvoiceError> {
        Ok(self.invoice_repo.list().await?)
    }

    /// Moves the invoice along its lifecycle. Amounts are never recomputed.
    pub async fn update_status(
        &self,
        invoice_number: &str,
        status: InvoiceStatus,
    ) -> Result<Invoice, InvoiceError> {
        let mut invoice = self.invoice_repo.get_by_number(invoice_number).await?;
        if !invoice.status.can_transition_to(status) {
            return Err(InvoiceError::InvalidTransition {
                from: invoice.status,
                to: status,
            });
        }

        self.invoice_repo.update_status(invoice_number, status).await?;

        info!(invoice_number, from = %invoice.status, to = %status, "Invoice status changed");
        invoice.status = status;
        invoice.updated_at = Utc::now();
        Ok(invoice)
    }
}

use crate::application::{
    AccountError, CatalogError, DashboardError, InvoiceError, SalesError,
};
use crate::infrastructure::{NormalizeError, RepositoryError};
use crate::ledger::{InvoiceDerivationError, SlotError};
use axum::http::StatusCode;
use tracing::error;
use validator::ValidationErrors;

pub(super) type ErrorBody = (StatusCode, serde_json::Value);

pub(super) fn map_normalize_error(err: &NormalizeError) -> ErrorBody {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({ "error": err.to_string() }),
    )
}

fn validation_error(errors: &ValidationErrors) -> ErrorBody {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({ "error": "Validation failed", "details": errors }),
    )
}

fn slot_error(err: &SlotError) -> ErrorBody {
    let body = match err {
        SlotError::ReductionBelowUsage { current_users } => serde_json::json!({
            "error": err.to_string(),
            "current_users": current_users,
        }),
        SlotError::Negative(_) => {
            return (StatusCode::BAD_REQUEST, serde_json::json!({ "error": err.to_string() }))
        }
        _ => serde_json::json!({ "error": err.to_string() }),
    };
    (StatusCode::CONFLICT, body)
}

fn repository_error(err: &RepositoryError, what: &str, fallback: &str) -> ErrorBody {
    match err {
        RepositoryError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": format!("{} not found", what) }),
        ),
        RepositoryError::Conflict(msg) => {
            (StatusCode::CONFLICT, serde_json::json!({ "error": msg }))
        }
        _ => {
            error!(error = %err, "{}", fallback);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": fallback }),
            )
        }
    }
}

pub(super) fn map_account_error(err: &AccountError) -> ErrorBody {
    match err {
        AccountError::Validation(errors) => validation_error(errors),
        AccountError::Slots(e) => slot_error(e),
        AccountError::Repository(e) => repository_error(e, "Account", "Account operation failed"),
    }
}

pub(super) fn map_catalog_error(err: &CatalogError) -> ErrorBody {
    match err {
        CatalogError::NameRequired => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string() }),
        ),
        CatalogError::InUse { in_use } => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string(), "in_use": in_use }),
        ),
        CatalogError::Repository(e) => repository_error(e, "Category", "Category operation failed"),
    }
}

pub(super) fn map_sales_error(err: &SalesError) -> ErrorBody {
    match err {
        SalesError::Validation(errors) => validation_error(errors),
        SalesError::Slots(e) => slot_error(e),
        SalesError::Term(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string() }),
        ),
        SalesError::InactiveAccount(_) => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string() }),
        ),
        SalesError::Repository(e) => repository_error(e, "Sale", "Sale operation failed"),
    }
}

pub(super) fn map_invoice_error(err: &InvoiceError) -> ErrorBody {
    match err {
        InvoiceError::Derivation(InvoiceDerivationError::CancelledSale(_)) => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string() }),
        ),
        InvoiceError::Derivation(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string() }),
        ),
        InvoiceError::InvalidTransition { from, to } => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "error": err.to_string(),
                "from": from.to_string(),
                "to": to.to_string(),
            }),
        ),
        InvoiceError::Repository(e) => repository_error(e, "Invoice", "Invoice operation failed"),
    }
}

pub(super) fn map_dashboard_error(err: &DashboardError) -> ErrorBody {
    match err {
        DashboardError::Repository(e) => {
            repository_error(e, "Dashboard data", "Failed to load dashboard")
        }
    }
}

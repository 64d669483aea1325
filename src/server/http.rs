use super::http_auth::require_admin;
use super::http_errors::{
    map_account_error, map_catalog_error, map_dashboard_error, map_invoice_error,
    map_normalize_error, map_sales_error,
};
use super::http_types::{
    AccountsQuery, ExpiringQuery, HealthResponse, InvoiceCreateRequest, InvoiceView,
    RecentSalesQuery, StatusUpdateRequest, MAX_EXPIRING_DAYS, MAX_RECENT_SALES,
};
use super::state::AppState;
use crate::application::InvoiceRequest;
use crate::domain::InvoiceStatus;
use crate::infrastructure::{
    AccountPayload, CategoryPayload, CustomerPayload, OrderItemPayload, PrimaryHolderPayload,
    SalePayload,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/accounts", get(list_accounts).post(create_account))
        .route(
            "/accounts/:id",
            get(get_account).put(update_account).delete(delete_account),
        )
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/customers", get(list_customers))
        .route("/sales", get(list_sales).post(create_sale))
        .route(
            "/sales/:order_number",
            get(get_sale).put(update_sale).delete(delete_sale),
        )
        .route("/dashboard/metrics", get(dashboard_metrics))
        .route("/dashboard/recent-sales", get(recent_sales))
        .route("/dashboard/upcoming-renewals", get(upcoming_renewals))
        .route("/dashboard/expiring", get(expiring_accounts))
        .route("/reminders/accounts", get(account_reminders))
        .route("/reminders/sales", get(sales_reminders))
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/:invoice_number", get(get_invoice))
        .route("/invoices/:invoice_number/status", put(update_invoice_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        list_accounts,
        create_account,
        get_account,
        update_account,
        delete_account,
        list_categories,
        create_category,
        update_category,
        delete_category,
        list_customers,
        list_sales,
        create_sale,
        get_sale,
        update_sale,
        delete_sale,
        dashboard_metrics,
        recent_sales,
        upcoming_renewals,
        expiring_accounts,
        account_reminders,
        sales_reminders,
        list_invoices,
        create_invoice,
        get_invoice,
        update_invoice_status,
    ),
    components(
        schemas(
            HealthResponse,
            AccountPayload,
            PrimaryHolderPayload,
            CategoryPayload,
            SalePayload,
            OrderItemPayload,
            CustomerPayload,
            InvoiceCreateRequest,
            StatusUpdateRequest,
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Accounts", description = "Shared subscription accounts and their slots"),
        (name = "Categories", description = "Product categories"),
        (name = "Sales", description = "Orders, customers and renewal terms"),
        (name = "Dashboard", description = "Aggregate figures and renewal lists"),
        (name = "Reminders", description = "Renewal reminders on both urgency scales"),
        (name = "Invoices", description = "Invoices derived from sales")
    ),
    info(
        title = "Slot Ledger API",
        version = "0.1.0",
        description = "Bookkeeping for resold shared subscription accounts"
    )
)]
struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/accounts",
    tag = "Accounts",
    params(AccountsQuery),
    responses(
        (status = 200, description = "Accounts with their renewal countdown", body = Object),
        (status = 500, description = "Failed to list accounts", body = Object)
    )
)]
async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<AccountsQuery>,
) -> impl IntoResponse {
    match state.accounts.list_accounts(query.category, Utc::now()).await {
        Ok(accounts) => (StatusCode::OK, Json(serde_json::json!(accounts))),
        Err(e) => {
            let (status, body) = map_account_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/accounts",
    tag = "Accounts",
    request_body = AccountPayload,
    responses(
        (status = 201, description = "Account created", body = Object),
        (status = 400, description = "Invalid account", body = Object),
        (status = 500, description = "Failed to create account", body = Object)
    )
)]
async fn create_account(
    State(state): State<AppState>,
    Json(payload): Json<AccountPayload>,
) -> impl IntoResponse {
    let input = match payload.into_new_account() {
        Ok(input) => input,
        Err(e) => {
            let (status, body) = map_normalize_error(&e);
            return (status, Json(body));
        }
    };

    match state.accounts.create_account(input).await {
        Ok(account) => (StatusCode::CREATED, Json(serde_json::json!(account))),
        Err(e) => {
            let (status, body) = map_account_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account found", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn get_account(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.accounts.get_account(id, Utc::now()).await {
        Ok(account) => (StatusCode::OK, Json(serde_json::json!(account))),
        Err(e) => {
            let (status, body) = map_account_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account ID")),
    request_body = AccountPayload,
    responses(
        (status = 200, description = "Account updated", body = Object),
        (status = 400, description = "Invalid changes", body = Object),
        (status = 404, description = "Account not found", body = Object),
        (status = 409, description = "Slots would drop below current users", body = Object)
    )
)]
async fn update_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AccountPayload>,
) -> impl IntoResponse {
    let patch = match payload.into_patch() {
        Ok(patch) => patch,
        Err(e) => {
            let (status, body) = map_normalize_error(&e);
            return (status, Json(body));
        }
    };

    match state.accounts.update_account(id, patch, Utc::now()).await {
        Ok(account) => (StatusCode::OK, Json(serde_json::json!(account))),
        Err(e) => {
            let (status, body) = map_account_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account deleted", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn delete_account(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.accounts.delete_account(id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "deleted" }))),
        Err(e) => {
            let (status, body) = map_account_error(&e);
            (status, Json(body))
        }
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/categories",
    tag = "Categories",
    responses(
        (status = 200, description = "Stored or derived categories", body = Object),
        (status = 500, description = "Failed to list categories", body = Object)
    )
)]
async fn list_categories(State(state): State<AppState>) -> impl IntoResponse {
    match state.catalog.list_categories().await {
        Ok(categories) => (StatusCode::OK, Json(serde_json::json!(categories))),
        Err(e) => {
            let (status, body) = map_catalog_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/categories",
    tag = "Categories",
    request_body = CategoryPayload,
    responses(
        (status = 201, description = "Category created", body = Object),
        (status = 400, description = "Name missing", body = Object)
    )
)]
async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CategoryPayload>,
) -> impl IntoResponse {
    let input = match payload.into_new_category() {
        Ok(input) => input,
        Err(e) => {
            let (status, body) = map_normalize_error(&e);
            return (status, Json(body));
        }
    };

    match state.catalog.create_category(input).await {
        Ok(category) => (StatusCode::CREATED, Json(serde_json::json!(category))),
        Err(e) => {
            let (status, body) = map_catalog_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/categories/{id}",
    tag = "Categories",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = CategoryPayload,
    responses(
        (status = 200, description = "Category updated", body = Object),
        (status = 404, description = "Category not found", body = Object)
    )
)]
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryPayload>,
) -> impl IntoResponse {
    match state.catalog.update_category(id, payload.into_patch()).await {
        Ok(category) => (StatusCode::OK, Json(serde_json::json!(category))),
        Err(e) => {
            let (status, body) = map_catalog_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    tag = "Categories",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category deleted", body = Object),
        (status = 404, description = "Category not found", body = Object),
        (status = 409, description = "Category still used by accounts", body = Object)
    )
)]
async fn delete_category(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.catalog.delete_category(id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "deleted" }))),
        Err(e) => {
            let (status, body) = map_catalog_error(&e);
            (status, Json(body))
        }
    }
}

// ---------------------------------------------------------------------------
// Sales and customers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/customers",
    tag = "Sales",
    responses(
        (status = 200, description = "Customers aggregated from sales", body = Object),
        (status = 500, description = "Failed to list customers", body = Object)
    )
)]
async fn list_customers(State(state): State<AppState>) -> impl IntoResponse {
    match state.sales.list_customers().await {
        Ok(customers) => (StatusCode::OK, Json(serde_json::json!(customers))),
        Err(e) => {
            let (status, body) = map_sales_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/sales",
    tag = "Sales",
    responses(
        (status = 200, description = "All sales, newest first", body = Object),
        (status = 500, description = "Failed to list sales", body = Object)
    )
)]
async fn list_sales(State(state): State<AppState>) -> impl IntoResponse {
    match state.sales.list_sales().await {
        Ok(sales) => (StatusCode::OK, Json(serde_json::json!(sales))),
        Err(e) => {
            let (status, body) = map_sales_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/sales",
    tag = "Sales",
    request_body = SalePayload,
    responses(
        (status = 201, description = "Sale recorded and slots allocated", body = Object),
        (status = 400, description = "Invalid order", body = Object),
        (status = 404, description = "Account not found", body = Object),
        (status = 409, description = "Not enough slots or inactive account", body = Object)
    )
)]
async fn create_sale(
    State(state): State<AppState>,
    Json(payload): Json<SalePayload>,
) -> impl IntoResponse {
    let now = Utc::now();
    let draft = match payload.into_draft(now) {
        Ok(draft) => draft,
        Err(e) => {
            let (status, body) = map_normalize_error(&e);
            return (status, Json(body));
        }
    };

    match state.sales.create_sale(draft, now).await {
        Ok(sale) => (StatusCode::CREATED, Json(serde_json::json!(sale))),
        Err(e) => {
            let (status, body) = map_sales_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/sales/{order_number}",
    tag = "Sales",
    params(("order_number" = String, Path, description = "Order number")),
    responses(
        (status = 200, description = "Sale found", body = Object),
        (status = 404, description = "Sale not found", body = Object)
    )
)]
async fn get_sale(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> impl IntoResponse {
    match state.sales.get_sale(&order_number).await {
        Ok(sale) => (StatusCode::OK, Json(serde_json::json!(sale))),
        Err(e) => {
            let (status, body) = map_sales_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/sales/{order_number}",
    tag = "Sales",
    params(("order_number" = String, Path, description = "Order number")),
    request_body = SalePayload,
    responses(
        (status = 200, description = "Sale updated", body = Object),
        (status = 400, description = "Invalid changes", body = Object),
        (status = 404, description = "Sale not found", body = Object),
        (status = 409, description = "Slots no longer available", body = Object)
    )
)]
async fn update_sale(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    Json(payload): Json<SalePayload>,
) -> impl IntoResponse {
    let patch = match payload.into_patch() {
        Ok(patch) => patch,
        Err(e) => {
            let (status, body) = map_normalize_error(&e);
            return (status, Json(body));
        }
    };

    match state.sales.update_sale(&order_number, patch, Utc::now()).await {
        Ok(sale) => (StatusCode::OK, Json(serde_json::json!(sale))),
        Err(e) => {
            let (status, body) = map_sales_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/sales/{order_number}",
    tag = "Sales",
    params(("order_number" = String, Path, description = "Order number")),
    responses(
        (status = 200, description = "Sale deleted and slots released", body = Object),
        (status = 404, description = "Sale not found", body = Object)
    )
)]
async fn delete_sale(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> impl IntoResponse {
    match state.sales.delete_sale(&order_number).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "deleted" }))),
        Err(e) => {
            let (status, body) = map_sales_error(&e);
            (status, Json(body))
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard and reminders
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/dashboard/metrics",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Dashboard metrics", body = Object),
        (status = 500, description = "Failed to load metrics", body = Object)
    )
)]
async fn dashboard_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.dashboard.metrics(Utc::now()).await {
        Ok(metrics) => (StatusCode::OK, Json(serde_json::json!(metrics))),
        Err(e) => {
            let (status, body) = map_dashboard_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/dashboard/recent-sales",
    tag = "Dashboard",
    params(RecentSalesQuery),
    responses(
        (status = 200, description = "Most recent sales", body = Object),
        (status = 500, description = "Failed to load sales", body = Object)
    )
)]
async fn recent_sales(
    State(state): State<AppState>,
    Query(query): Query<RecentSalesQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(state.config.recent_sales_limit)
        .clamp(1, MAX_RECENT_SALES);

    match state.dashboard.recent_sales(limit).await {
        Ok(sales) => (StatusCode::OK, Json(serde_json::json!(sales))),
        Err(e) => {
            let (status, body) = map_dashboard_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/dashboard/upcoming-renewals",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Accounts renewing in 8 to 14 days", body = Object),
        (status = 500, description = "Failed to load accounts", body = Object)
    )
)]
async fn upcoming_renewals(State(state): State<AppState>) -> impl IntoResponse {
    match state.dashboard.upcoming_renewals(Utc::now()).await {
        Ok(accounts) => (StatusCode::OK, Json(serde_json::json!(accounts))),
        Err(e) => {
            let (status, body) = map_dashboard_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/dashboard/expiring",
    tag = "Dashboard",
    params(ExpiringQuery),
    responses(
        (status = 200, description = "Renewable accounts due within the window", body = Object),
        (status = 400, description = "Window out of range", body = Object),
        (status = 500, description = "Failed to load accounts", body = Object)
    )
)]
async fn expiring_accounts(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> impl IntoResponse {
    let Some(days) = query.window_days() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": format!("days must be between 0 and {MAX_EXPIRING_DAYS}"),
            })),
        );
    };

    match state.dashboard.expiring(days, Utc::now()).await {
        Ok(accounts) => (StatusCode::OK, Json(serde_json::json!(accounts))),
        Err(e) => {
            let (status, body) = map_dashboard_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/reminders/accounts",
    tag = "Reminders",
    responses(
        (status = 200, description = "Account renewals with urgency", body = Object),
        (status = 500, description = "Failed to load reminders", body = Object)
    )
)]
async fn account_reminders(State(state): State<AppState>) -> impl IntoResponse {
    match state.dashboard.account_reminders(Utc::now()).await {
        Ok(reminders) => (StatusCode::OK, Json(serde_json::json!(reminders))),
        Err(e) => {
            let (status, body) = map_dashboard_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/reminders/sales",
    tag = "Reminders",
    responses(
        (status = 200, description = "Customer renewals due within 30 days", body = Object),
        (status = 500, description = "Failed to load reminders", body = Object)
    )
)]
async fn sales_reminders(State(state): State<AppState>) -> impl IntoResponse {
    match state.dashboard.sales_reminders(Utc::now()).await {
        Ok(reminders) => (StatusCode::OK, Json(serde_json::json!(reminders))),
        Err(e) => {
            let (status, body) = map_dashboard_error(&e);
            (status, Json(body))
        }
    }
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/invoices",
    tag = "Invoices",
    responses(
        (status = 200, description = "Invoices with their overdue flag", body = Object),
        (status = 500, description = "Failed to list invoices", body = Object)
    )
)]
async fn list_invoices(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    match state.invoices.list_invoices().await {
        Ok(invoices) => {
            let views: Vec<InvoiceView> = invoices
                .into_iter()
                .map(|invoice| InvoiceView::new(invoice, now))
                .collect();
            (StatusCode::OK, Json(serde_json::json!(views)))
        }
        Err(e) => {
            let (status, body) = map_invoice_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/invoices",
    tag = "Invoices",
    request_body = InvoiceCreateRequest,
    responses(
        (status = 201, description = "Draft invoice created", body = Object),
        (status = 400, description = "Sale cannot be billed", body = Object),
        (status = 404, description = "Sale not found", body = Object),
        (status = 409, description = "Sale was cancelled", body = Object)
    )
)]
async fn create_invoice(
    State(state): State<AppState>,
    Json(req): Json<InvoiceCreateRequest>,
) -> impl IntoResponse {
    let now = Utc::now();
    let request = InvoiceRequest {
        order_number: req.order_number,
        customer_info: req.customer_info,
        tax_rate: req.tax_rate,
        payment_terms: req.payment_terms,
        due_date: req.due_date,
        notes: req.notes,
    };

    match state.invoices.create_invoice(request, now).await {
        Ok(invoice) => (
            StatusCode::CREATED,
            Json(serde_json::json!(InvoiceView::new(invoice, now))),
        ),
        Err(e) => {
            let (status, body) = map_invoice_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/invoices/{invoice_number}",
    tag = "Invoices",
    params(("invoice_number" = String, Path, description = "Invoice number")),
    responses(
        (status = 200, description = "Invoice found", body = Object),
        (status = 404, description = "Invoice not found", body = Object)
    )
)]
async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_number): Path<String>,
) -> impl IntoResponse {
    match state.invoices.get_invoice(&invoice_number).await {
        Ok(invoice) => (
            StatusCode::OK,
            Json(serde_json::json!(InvoiceView::new(invoice, Utc::now()))),
        ),
        Err(e) => {
            let (status, body) = map_invoice_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/invoices/{invoice_number}/status",
    tag = "Invoices",
    params(("invoice_number" = String, Path, description = "Invoice number")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status changed", body = Object),
        (status = 400, description = "Unknown status", body = Object),
        (status = 404, description = "Invoice not found", body = Object),
        (status = 409, description = "Transition not allowed", body = Object)
    )
)]
async fn update_invoice_status(
    State(state): State<AppState>,
    Path(invoice_number): Path<String>,
    Json(req): Json<StatusUpdateRequest>,
) -> impl IntoResponse {
    let status: InvoiceStatus = match req.status.trim().to_lowercase().parse() {
        Ok(status) => status,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Invalid invoice status",
                    "allowed": ["draft", "sent", "paid", "overdue", "cancelled"]
                })),
            );
        }
    };

    match state.invoices.update_status(&invoice_number, status).await {
        Ok(invoice) => {
            info!(invoice_number = %invoice.invoice_number, status = %status, "Invoice status updated via API");
            (
                StatusCode::OK,
                Json(serde_json::json!(InvoiceView::new(invoice, Utc::now()))),
            )
        }
        Err(e) => {
            let (status, body) = map_invoice_error(&e);
            (status, Json(body))
        }
    }
}

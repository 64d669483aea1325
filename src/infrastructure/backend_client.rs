use crate::domain::{Account, ProductCategory, Sale};
use crate::infrastructure::normalize::{AccountPayload, CategoryPayload, NormalizeError, SalePayload};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        in_use: Option<i64>,
    },
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<NormalizeError> for BackendError {
    fn from(e: NormalizeError) -> Self {
        BackendError::InvalidResponse(e.to_string())
    }
}

/// Remote store behind the client-side snapshot. Every record it returns has
/// already been through the normalization boundary.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    async fn fetch_accounts(&self) -> Result<Vec<Account>, BackendError>;
    async fn fetch_categories(&self) -> Result<Vec<ProductCategory>, BackendError>;
    async fn fetch_sales(&self) -> Result<Vec<Sale>, BackendError>;
    async fn update_account(&self, id: Uuid, changes: &Value) -> Result<Account, BackendError>;
    async fn delete_account(&self, id: Uuid) -> Result<(), BackendError>;
    async fn update_sale(&self, order_number: &str, changes: &Value) -> Result<Sale, BackendError>;
    async fn delete_sale(&self, order_number: &str) -> Result<(), BackendError>;
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

/// Reads `{"error": "...", "in_use": N}` as sent by the server's 409 responses.
fn conflict_from_body(body: &Value) -> BackendError {
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("conflict")
        .to_string();
    let in_use = body
        .get("in_use")
        .or_else(|| body.get("inUse"))
        .and_then(Value::as_i64);
    BackendError::Conflict { message, in_use }
}

/// Records may come bare or wrapped in a `data` envelope.
fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Decodes a list, skipping records that cannot be normalized.
fn decode_list<P, T, F>(body: Value, kind: &str, convert: F) -> Result<Vec<T>, BackendError>
where
    P: DeserializeOwned,
    F: Fn(P) -> Result<T, NormalizeError>,
{
    let items = match unwrap_envelope(body) {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(BackendError::InvalidResponse(format!(
                "expected a list of {}, got {}",
                kind, other
            )))
        }
    };

    let mut decoded = Vec::with_capacity(items.len());
    for item in items {
        let result = serde_json::from_value::<P>(item)
            .map_err(|e| NormalizeError::InvalidValue {
                field: "record",
                value: e.to_string(),
            })
            .and_then(&convert);
        match result {
            Ok(record) => decoded.push(record),
            Err(e) => tracing::warn!(kind, error = %e, "Skipping malformed record"),
        }
    }
    Ok(decoded)
}

fn decode_one<P: DeserializeOwned>(body: Value) -> Result<P, BackendError> {
    serde_json::from_value(unwrap_envelope(body))
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

pub struct LedgerApiClient {
    client: Client,
    base_url: String,
}

impl LedgerApiClient {
    pub fn new(base_url: impl Into<String>, api_token: Option<&str>) -> Result<Self, BackendError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = api_token.filter(|t| !t.is_empty()) {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| {
                    BackendError::InvalidConfig(format!("Invalid API token format: {}", e))
                })?;
            headers.insert(header::AUTHORIZATION, auth_value);
        }
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                BackendError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn send_with_retry<F>(
        &self,
        mut request_builder: F,
        resource: &str,
    ) -> Result<reqwest::Response, BackendError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut last_error: Option<String> = None;

        for attempt in 0..MAX_RETRIES {
            match request_builder().send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(BackendError::RateLimited);
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(BackendError::NotFound(resource.to_string()));
                    }
                    if status == StatusCode::CONFLICT {
                        let body: Value = resp.json().await.unwrap_or(Value::Null);
                        return Err(conflict_from_body(&body));
                    }
                    if is_retryable_status(status.as_u16()) && attempt < MAX_RETRIES - 1 {
                        let backoff = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        tracing::debug!(resource, attempt, backoff, "Retrying after server error");
                        sleep(Duration::from_millis(backoff)).await;
                        continue;
                    }
                    if !status.is_success() {
                        let message = resp
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(BackendError::Rejected {
                            status: status.as_u16(),
                            message,
                        });
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempt < MAX_RETRIES - 1 {
                        let backoff = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(BackendError::RequestFailed(
            last_error.unwrap_or_else(|| "Max retries exceeded".to_string()),
        ))
    }

    async fn get_json(&self, path: &str, resource: &str) -> Result<Value, BackendError> {
        let url = self.url(path);
        let resp = self
            .send_with_retry(|| self.client.get(&url), resource)
            .await?;
        resp.json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn put_json(&self, path: &str, body: &Value, resource: &str) -> Result<Value, BackendError> {
        let url = self.url(path);
        let resp = self
            .send_with_retry(|| self.client.put(&url).json(body), resource)
            .await?;
        resp.json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn delete(&self, path: &str, resource: &str) -> Result<(), BackendError> {
        let url = self.url(path);
        self.send_with_retry(|| self.client.delete(&url), resource)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerBackend for LedgerApiClient {
    async fn fetch_accounts(&self) -> Result<Vec<Account>, BackendError> {
        let body = self.get_json("/accounts", "accounts").await?;
        let now = Utc::now();
        decode_list(body, "accounts", |p: AccountPayload| p.into_account(now))
    }

    async fn fetch_categories(&self) -> Result<Vec<ProductCategory>, BackendError> {
        let body = self.get_json("/categories", "categories").await?;
        let now = Utc::now();
        decode_list(body, "categories", |p: CategoryPayload| p.into_category(now))
    }

    async fn fetch_sales(&self) -> Result<Vec<Sale>, BackendError> {
        let body = self.get_json("/sales", "sales").await?;
        let now = Utc::now();
        decode_list(body, "sales", |p: SalePayload| p.into_sale(now))
    }

    async fn update_account(&self, id: Uuid, changes: &Value) -> Result<Account, BackendError> {
        let resource = format!("account {}", id);
        let body = self
            .put_json(&format!("/accounts/{}", id), changes, &resource)
            .await?;
        let payload: AccountPayload = decode_one(body)?;
        Ok(payload.into_account(Utc::now())?)
    }

    async fn delete_account(&self, id: Uuid) -> Result<(), BackendError> {
        self.delete(&format!("/accounts/{}", id), &format!("account {}", id))
            .await
    }

    async fn update_sale(&self, order_number: &str, changes: &Value) -> Result<Sale, BackendError> {
        let resource = format!("sale {}", order_number);
        let body = self
            .put_json(&format!("/sales/{}", order_number), changes, &resource)
            .await?;
        let payload: SalePayload = decode_one(body)?;
        Ok(payload.into_sale(Utc::now())?)
    }

    async fn delete_sale(&self, order_number: &str) -> Result<(), BackendError> {
        self.delete(
            &format!("/sales/{}", order_number),
            &format!("sale {}", order_number),
        )
        .await
    }
}

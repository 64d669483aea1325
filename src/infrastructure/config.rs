use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Bearer token required on `/api` routes. Empty disables the check.
    pub admin_token: String,

    // Invoicing
    pub default_tax_rate: Decimal,
    pub invoice_prefix: String,
    pub invoice_due_days: i64,

    // Dashboard
    pub recent_sales_limit: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("SLOT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("admin_token", "")?
            .set_default("default_tax_rate", "0")?
            .set_default("invoice_prefix", "INV")?
            .set_default("invoice_due_days", 30)?
            .set_default("recent_sales_limit", 10)?
            .build()?;

        config.try_deserialize()
    }
}

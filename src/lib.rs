//! Slot Ledger
//!
//! Bookkeeping for resold shared subscription accounts: user slots, renewal
//! countdowns, sales with discounts, and invoices derived from sales.
//!
//! ## Standalone
//!
//! Run the binary:
//! ```bash
//! slot-ledger-server
//! ```
//!
//! ## Embedded (Axum)
//!
//! When the `server` feature is enabled, this crate can be embedded into a larger Axum app:
//! ```rust,ignore
//! use axum::Router;
//! use slot_ledger::infrastructure::AppConfig;
//! use slot_ledger::server::{build_state_with_pool, router};
//! use sqlx::PgPool;
//!
//! let cfg = AppConfig::from_env()?;
//! let pool = PgPool::connect(&cfg.database_url).await?;
//! let state = build_state_with_pool(cfg, pool, true).await?;
//! let app = Router::new().nest("/ledger", router(state));
//! ```
//!
//! ## Client
//!
//! `LedgerSnapshot` over `LedgerApiClient` keeps a local copy of accounts and
//! sales, applies edits optimistically and re-fetches when the backend refuses.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ledger;

// Standalone + embedded HTTP server support (Axum).
// Enabled behind the `server` feature so the core library can be used without Axum.
#[cfg(feature = "server")]
pub mod server;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;
pub use ledger::*;

#[cfg(feature = "server")]
pub use server::*;

pub mod backend_client;
pub mod config;
pub mod normalize;
pub mod postgres_invoice_repo;
pub mod postgres_sales_repo;
pub mod repository;

pub use backend_client::*;
pub use config::*;
pub use normalize::*;
pub use postgres_invoice_repo::*;
pub use postgres_sales_repo::*;
pub use repository::*;

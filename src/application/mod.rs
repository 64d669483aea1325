pub mod accounts;
pub mod catalog;
pub mod dashboard;
pub mod invoices;
pub mod sales;
pub mod snapshot;

pub use accounts::*;
pub use catalog::*;
pub use dashboard::*;
pub use invoices::*;
pub use sales::*;
pub use snapshot::*;

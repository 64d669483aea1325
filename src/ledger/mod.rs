//! Pure bookkeeping: no I/O, every result re-derivable from the latest snapshot.

pub mod customers;
pub mod invoicing;
pub mod metrics;
pub mod pricing;
pub mod renewal;
pub mod slots;

pub use customers::*;
pub use invoicing::*;
pub use metrics::*;
pub use pricing::*;
pub use renewal::*;
pub use slots::*;

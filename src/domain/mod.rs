pub mod account;
pub mod category;
pub mod customer;
pub mod invoice;
pub mod sale;

pub use account::*;
pub use category::*;
pub use customer::*;
pub use invoice::*;
pub use sale::*;

//! Portfolio ledger and the shared account book.

mod account;
mod portfolio;

pub use account::*;
pub use portfolio::*;

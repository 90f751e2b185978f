//! Position and order lifecycle.

mod exit;
mod manager;
mod views;

pub use exit::*;
pub use manager::*;
pub use views::*;

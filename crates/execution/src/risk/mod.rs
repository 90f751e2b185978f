//! Risk gate, limits, warning alerts and the trading halt latch.

mod alerts;
mod config;
mod gate;
mod halt;

pub use alerts::*;
pub use config::*;
pub use gate::*;
pub use halt::*;

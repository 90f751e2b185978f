//! Engine event bus.

mod event_bus;
mod events;

pub use event_bus::*;
pub use events::*;

pub mod percentage;
pub mod symbol;
pub mod trailing_stop;

pub use percentage::Percentage;
pub use symbol::Symbol;
pub use trailing_stop::TrailingStop;

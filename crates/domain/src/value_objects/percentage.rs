use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fraction expressed as a decimal, `0.02` meaning 2%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(pub Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);

    pub fn new(fraction: Decimal) -> Self {
        Self(fraction)
    }

    pub fn from_bps(bps: u32) -> Self {
        Self(Decimal::from(bps) / Decimal::from(10000))
    }

    pub fn to_bps(&self) -> u32 {
        (self.0 * Decimal::from(10000)).to_u32().unwrap_or(0)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Applies the fraction to `amount`.
    pub fn of(&self, amount: Decimal) -> Decimal {
        amount * self.0
    }

    /// True when the fraction lies in `(0, 1]`.
    pub fn is_valid_limit(&self) -> bool {
        self.0 > Decimal::ZERO && self.0 <= Decimal::ONE
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.0 * Decimal::ONE_HUNDRED).normalize())
    }
}

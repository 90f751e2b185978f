//! Indicator calculations over candle history.
//!
//! Every function returns `None` when there is not enough history.

use ftrade_domain::entities::Candle;
use ftrade_execution::strategy::{BB_MIDDLE, BB_UPPER, EMA_FAST, EMA_SLOW, GRID_CENTER, RSI, VOLUME_SMA};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use std::collections::BTreeMap;

pub const RSI_PERIOD: usize = 14;
pub const EMA_FAST_PERIOD: usize = 12;
pub const EMA_SLOW_PERIOD: usize = 26;
pub const SMA_PERIOD: usize = 20;
pub const BB_WIDTH: Decimal = Decimal::TWO;

/// Lower Bollinger band.
pub const BB_LOWER: &str = "bb_lower";

/// Simple moving average of the last `period` values.
pub fn sma(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<Decimal>() / Decimal::from(period))
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values.
pub fn ema(values: &[Decimal], period: usize) -> Option<Decimal> {
    let seed = sma(&values[..period.min(values.len())], period)?;
    let alpha = Decimal::TWO / Decimal::from(period + 1);
    Some(
        values[period..]
            .iter()
            .fold(seed, |acc, v| (*v - acc) * alpha + acc),
    )
}

/// Relative strength index from simple average gains and losses.
pub fn rsi(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() <= period {
        return None;
    }
    let window = &values[values.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((Decimal::ZERO, Decimal::ZERO), |(g, l), delta| {
            if delta > Decimal::ZERO {
                (g + delta, l)
            } else {
                (g, l - delta)
            }
        });

    let hundred = Decimal::ONE_HUNDRED;
    if losses.is_zero() {
        // flat history reads as neutral
        return Some(if gains.is_zero() { Decimal::from(50) } else { hundred });
    }
    let rs = gains / losses;
    Some((hundred - hundred / (Decimal::ONE + rs)).round_dp(4))
}

/// Upper, middle and lower Bollinger bands.
pub fn bollinger(values: &[Decimal], period: usize, width: Decimal) -> Option<(Decimal, Decimal, Decimal)> {
    let middle = sma(values, period)?;
    let window = &values[values.len() - period..];
    let variance = window
        .iter()
        .map(|v| (*v - middle) * (*v - middle))
        .sum::<Decimal>()
        / Decimal::from(period);
    let std_dev = variance
        .to_f64()
        .map(f64::sqrt)
        .and_then(Decimal::from_f64)
        .unwrap_or(Decimal::ZERO);
    let band = (std_dev * width).round_dp(6);
    Some((middle + band, middle, middle - band))
}

/// Indicator map consumed by the built-in strategies.
pub fn compute_indicators(candles: &[Candle]) -> BTreeMap<String, Decimal> {
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<Decimal> = candles.iter().map(|c| c.volume).collect();

    let mut out = BTreeMap::new();
    let mut put = |name: &str, value: Option<Decimal>| {
        if let Some(value) = value {
            out.insert(name.to_string(), value);
        }
    };
    put(RSI, rsi(&closes, RSI_PERIOD));
    put(EMA_FAST, ema(&closes, EMA_FAST_PERIOD));
    put(EMA_SLOW, ema(&closes, EMA_SLOW_PERIOD));
    put(VOLUME_SMA, sma(&volumes, SMA_PERIOD));
    put(GRID_CENTER, sma(&closes, SMA_PERIOD));
    if let Some((upper, middle, lower)) = bollinger(&closes, SMA_PERIOD, BB_WIDTH) {
        put(BB_UPPER, Some(upper));
        put(BB_MIDDLE, Some(middle));
        put(BB_LOWER, Some(lower));
    }
    out
}

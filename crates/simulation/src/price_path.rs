use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Produces one price per step.
pub trait PricePathGenerator: Send {
    /// Advances the path and returns the new price.
    fn next_price(&mut self) -> Decimal;

    /// Next `steps` prices.
    fn generate(&mut self, steps: usize) -> Vec<Decimal> {
        (0..steps).map(|_| self.next_price()).collect()
    }
}

pub struct GeometricBrownianMotion {
    pub drift: f64,      // annualized drift (mu)
    pub volatility: f64, // annualized volatility (sigma)
    pub time_step: f64,  // time step in years (dt)
    current: f64,
    started: bool,
    rng: StdRng,
}

impl GeometricBrownianMotion {
    pub fn new(initial_price: Decimal, drift: f64, volatility: f64, time_step: f64) -> Self {
        Self::with_rng(initial_price, drift, volatility, time_step, StdRng::from_os_rng())
    }

    /// Reproducible path for a given seed.
    pub fn seeded(
        initial_price: Decimal,
        drift: f64,
        volatility: f64,
        time_step: f64,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            initial_price,
            drift,
            volatility,
            time_step,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        initial_price: Decimal,
        drift: f64,
        volatility: f64,
        time_step: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            drift,
            volatility,
            time_step,
            current: initial_price.to_f64().unwrap_or(0.0),
            started: false,
            rng,
        }
    }
}

impl PricePathGenerator for GeometricBrownianMotion {
    /// The first call returns the initial price.
    fn next_price(&mut self) -> Decimal {
        if self.started {
            let dt = self.time_step;
            let drift_term = (self.drift - 0.5 * self.volatility.powi(2)) * dt;
            let vol_term = self.volatility * dt.sqrt();
            let z: f64 = StandardNormal.sample(&mut self.rng);
            self.current *= (drift_term + vol_term * z).exp();
        }
        self.started = true;

        // f64 is fine for the walk; prices are cut back to 4 dp.
        Decimal::from_f64(self.current)
            .unwrap_or(Decimal::ZERO)
            .round_dp(4)
    }
}

/// Replays a fixed list of prices, then repeats the last one.
#[derive(Debug, Clone)]
pub struct DeterministicPricePath {
    pub prices: Vec<Decimal>,
    cursor: usize,
}

impl DeterministicPricePath {
    pub fn new(prices: Vec<Decimal>) -> Self {
        Self { prices, cursor: 0 }
    }
}

impl PricePathGenerator for DeterministicPricePath {
    fn next_price(&mut self) -> Decimal {
        let price = self
            .prices
            .get(self.cursor)
            .or_else(|| self.prices.last())
            .copied()
            .unwrap_or(Decimal::ZERO);
        self.cursor += 1;
        price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_gbm_generation() {
        let initial = Decimal::from(100);
        let mut gbm = GeometricBrownianMotion::new(initial, 0.0, 0.2, 1.0 / 365.0);
        let path = gbm.generate(11);

        assert_eq!(path.len(), 11);
        assert_eq!(path[0], initial);
        assert!(path.iter().all(|p| *p > Decimal::ZERO));
        assert!(!path.iter().all(|p| *p == initial));
    }

    #[test]
    fn test_seeded_paths_repeat() {
        let mut a = GeometricBrownianMotion::seeded(dec!(50), 0.1, 0.5, 1.0 / 365.0, 7);
        let mut b = GeometricBrownianMotion::seeded(dec!(50), 0.1, 0.5, 1.0 / 365.0, 7);
        assert_eq!(a.generate(20), b.generate(20));
    }

    #[test]
    fn test_deterministic_path_holds_last_price() {
        let mut path = DeterministicPricePath::new(vec![dec!(100), dec!(97)]);
        assert_eq!(path.generate(4), vec![dec!(100), dec!(97), dec!(97), dec!(97)]);

        let mut empty = DeterministicPricePath::new(vec![]);
        assert_eq!(empty.next_price(), Decimal::ZERO);
    }
}

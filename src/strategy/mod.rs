//! Strategy seam for the execution engines.
//!
//! The engines require exactly one thing of a strategy: evaluate a market
//! snapshot and maybe produce a trade signal. Scoring sophistication lives
//! behind this trait; the engines never look inside.

pub mod value;

use anyhow::{bail, Result};

use crate::config::AppConfig;
use crate::data::{Indicators, MarketSnapshot};
use crate::types::TradeSignal;

pub use value::ValueBettingStrategy;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Evaluate a market and return a trade signal, or None to pass.
    fn evaluate(&self, snapshot: &MarketSnapshot, indicators: &Indicators)
        -> Option<TradeSignal>;
}

/// Construct the configured strategy by name.
pub fn build(name: &str, cfg: &AppConfig) -> Result<Box<dyn Strategy>> {
    match name {
        "value_betting" => Ok(Box::new(ValueBettingStrategy::new(cfg))),
        other => bail!("Unknown strategy: {other}"),
    }
}

/// Fraction of bankroll to bet per the Kelly criterion, damped by
/// `fraction` (0.25 = quarter Kelly). Zero on negative edge or degenerate
/// prices.
pub fn kelly_fraction(probability: f64, odds_price: f64, fraction: f64) -> f64 {
    if odds_price <= 0.0 || odds_price >= 1.0 || probability <= 0.0 || probability >= 1.0 {
        return 0.0;
    }
    // Net profit per dollar if the bet wins
    let b = (1.0 - odds_price) / odds_price;
    let q = 1.0 - probability;
    let kelly = (probability * b - q) / b;
    if kelly <= 0.0 {
        return 0.0;
    }
    kelly * fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kelly_is_zero_without_edge() {
        assert_eq!(kelly_fraction(0.50, 0.50, 0.25), 0.0);
        assert_eq!(kelly_fraction(0.40, 0.50, 0.25), 0.0);
        assert_eq!(kelly_fraction(0.60, 0.0, 0.25), 0.0);
    }

    #[test]
    fn kelly_scales_with_edge_and_damping() {
        let quarter = kelly_fraction(0.60, 0.50, 0.25);
        let full = kelly_fraction(0.60, 0.50, 1.0);
        assert!(quarter > 0.0);
        assert!((full - 4.0 * quarter).abs() < 1e-9);
        // p=0.6 at even odds: full Kelly bets 20% of bankroll
        assert!((full - 0.20).abs() < 1e-9);
    }

    #[test]
    fn registry_rejects_unknown_names() {
        let cfg = AppConfig::load(None).unwrap();
        assert!(build("value_betting", &cfg).is_ok());
        assert!(build("nope", &cfg).is_err());
    }
}

//! Value betting: buy outcomes whose market price looks mispriced.
//!
//! When the estimated true probability differs from the displayed price by
//! more than a minimum edge, there is value to capture. Sizing is a
//! Kelly-damped bump on the default position size, clamped to the
//! configured band.

use tracing::debug;

use crate::config::AppConfig;
use crate::data::{Indicators, MarketSnapshot};
use crate::strategy::{kelly_fraction, Strategy};
use crate::types::{Side, SignalMeta, TradeSignal};

pub const STRATEGY_NAME: &str = "value_betting";

pub struct ValueBettingStrategy {
    min_edge: f64,
    kelly_frac: f64,
    prob_low: f64,
    prob_high: f64,
    default_size: f64,
    max_size: f64,
    min_size: f64,
    min_volume: f64,
    min_liquidity: f64,
}

impl ValueBettingStrategy {
    pub fn new(cfg: &AppConfig) -> Self {
        let vb = &cfg.strategy.value_betting;
        Self {
            min_edge: vb.min_edge,
            kelly_frac: vb.kelly_fraction,
            prob_low: vb.prob_range_low,
            prob_high: vb.prob_range_high,
            default_size: cfg.trading.default_position_usdc,
            max_size: cfg.trading.max_position_usdc,
            min_size: cfg.trading.min_position_usdc,
            min_volume: cfg.filters.min_volume_usd,
            min_liquidity: cfg.filters.min_liquidity_usd,
        }
    }

    /// Heuristic estimate of the true YES probability.
    ///
    /// Thin, low-volume markets are where mispricing lives; the estimate
    /// shades the displayed price toward 0.5 there, so an outcome trading
    /// rich gets a negative tilt and one trading cheap a positive one.
    fn estimate_probability(&self, snapshot: &MarketSnapshot, indicators: &Indicators) -> f64 {
        let base = snapshot.yes_price;

        let mut shade: f64 = 0.0;
        if snapshot.volume < self.min_volume * 10.0 {
            shade += 0.05;
        }
        if snapshot.liquidity < self.min_liquidity * 2.0 {
            shade += 0.03;
        }
        // Wide quoted spread means the displayed price is stale
        if indicators.get("spread").copied().unwrap_or(0.0) > 0.02 {
            shade += 0.02;
        }

        let direction = if base <= 0.5 { 1.0 } else { -1.0 };
        (base + direction * shade).clamp(0.01, 0.99)
    }
}

impl Strategy for ValueBettingStrategy {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    fn evaluate(
        &self,
        snapshot: &MarketSnapshot,
        indicators: &Indicators,
    ) -> Option<TradeSignal> {
        if snapshot.closed || !snapshot.active {
            return None;
        }
        if snapshot.volume < self.min_volume || snapshot.liquidity < self.min_liquidity {
            return None;
        }

        let estimated = self.estimate_probability(snapshot, indicators);
        let yes_edge = estimated - snapshot.yes_price;
        let no_edge = (1.0 - estimated) - snapshot.no_price;

        let (side, edge, entry_price) = if yes_edge >= self.min_edge
            && (self.prob_low..=self.prob_high).contains(&snapshot.yes_price)
        {
            (Side::BuyYes, yes_edge, snapshot.yes_price)
        } else if no_edge >= self.min_edge
            && (self.prob_low..=self.prob_high).contains(&snapshot.no_price)
        {
            (Side::BuyNo, no_edge, snapshot.no_price)
        } else {
            debug!(
                market_id = %snapshot.market_id,
                yes_edge, no_edge, "No actionable edge"
            );
            return None;
        };

        let win_prob = match side {
            Side::BuyYes => estimated,
            Side::BuyNo => 1.0 - estimated,
        };
        let kelly = kelly_fraction(win_prob, entry_price, self.kelly_frac);
        let size = (self.default_size * (1.0 + kelly * 10.0))
            .clamp(self.min_size, self.max_size);

        let confidence = (edge / self.min_edge * 0.5 + 0.3).min(1.0);

        let mut meta = SignalMeta::for_strategy(STRATEGY_NAME);
        meta.estimated_prob = Some(win_prob);

        Some(TradeSignal {
            side,
            market_id: snapshot.market_id.clone(),
            question: snapshot.question.clone(),
            confidence,
            entry_price,
            position_size_usdc: (size * 100.0).round() / 100.0,
            edge: (edge * 10_000.0).round() / 10_000.0,
            reason: format!("Value edge={edge:.3}, estimated_prob={estimated:.3}"),
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::compute_indicators;
    use chrono::Utc;

    fn snapshot(yes: f64, volume: f64, liquidity: f64) -> MarketSnapshot {
        MarketSnapshot {
            market_id: "m1".to_string(),
            question: "Test?".to_string(),
            slug: String::new(),
            yes_price: yes,
            no_price: 1.0 - yes,
            spread: 0.0,
            volume,
            liquidity,
            active: true,
            closed: false,
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            token_ids: vec!["ty".to_string(), "tn".to_string()],
            end_date: String::new(),
            timestamp: Utc::now(),
        }
    }

    fn strategy() -> ValueBettingStrategy {
        ValueBettingStrategy::new(&AppConfig::load(None).unwrap())
    }

    #[test]
    fn skips_thin_and_closed_markets() {
        let strat = strategy();
        let thin = snapshot(0.30, 100.0, 50.0);
        assert!(strat.evaluate(&thin, &compute_indicators(&thin)).is_none());

        let mut closed = snapshot(0.30, 60_000.0, 12_000.0);
        closed.closed = true;
        assert!(strat
            .evaluate(&closed, &compute_indicators(&closed))
            .is_none());
    }

    #[test]
    fn cheap_thin_market_produces_a_buy_yes() {
        let strat = strategy();
        // Low price, modest volume: the estimate shades toward 0.5 and
        // clears the 5% edge bar.
        let snap = snapshot(0.30, 20_000.0, 6_000.0);
        let signal = strat
            .evaluate(&snap, &compute_indicators(&snap))
            .expect("expected a signal");
        assert_eq!(signal.side, Side::BuyYes);
        assert!(signal.edge >= 0.05);
        assert_eq!(signal.meta.strategy, STRATEGY_NAME);
        assert!(signal.position_size_usdc >= 1.0);
        assert!(signal.predicted_prob() > snap.yes_price);
    }

    #[test]
    fn efficient_market_produces_nothing() {
        let strat = strategy();
        // Deep, heavily traded market near its estimate: no edge
        let snap = snapshot(0.50, 5_000_000.0, 500_000.0);
        assert!(strat.evaluate(&snap, &compute_indicators(&snap)).is_none());
    }
}

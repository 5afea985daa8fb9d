//! Core types used throughout PolyTrader
//!
//! Defines the trade signal model shared by strategies, the risk manager,
//! and the execution engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which outcome token a signal wants to buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY_YES")]
    BuyYes,
    #[serde(rename = "BUY_NO")]
    BuyNo,
}

impl Side {
    /// Outcome label this side bets on ("YES" / "NO")
    pub fn outcome(&self) -> &'static str {
        match self {
            Side::BuyYes => "YES",
            Side::BuyNo => "NO",
        }
    }

    pub fn from_outcome(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "YES" => Some(Side::BuyYes),
            "NO" => Some(Side::BuyNo),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::BuyYes => write!(f, "BUY_YES"),
            Side::BuyNo => write!(f, "BUY_NO"),
        }
    }
}

/// Structured signal metadata.
///
/// Fixed fields every consumer can rely on, plus an explicit extension map
/// for strategy-specific extras. Strategies must fill `strategy`; the
/// pre-resolved `token_id` is only set for short-lived event markets where
/// the outcome token is known at signal time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalMeta {
    /// Tag of the strategy that produced the signal (e.g. "value_betting")
    pub strategy: String,
    /// Strategy's estimated true probability for the chosen side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_prob: Option<f64>,
    /// Pre-resolved CLOB token id for the chosen side, when known upfront
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    /// Free-form extras; never load-bearing for the core
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SignalMeta {
    pub fn for_strategy(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            ..Default::default()
        }
    }
}

/// A concrete trade recommendation from a strategy.
///
/// Produced once and never mutated; the engines only read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub side: Side,
    pub market_id: String,
    pub question: String,
    /// Strategy confidence in [0, 1]
    pub confidence: f64,
    /// Price to pay for the outcome token, in (0, 1)
    pub entry_price: f64,
    /// Recommended position size in USDC
    pub position_size_usdc: f64,
    /// Estimated probability edge (believed-true probability minus price)
    pub edge: f64,
    /// Human-readable explanation
    pub reason: String,
    #[serde(default)]
    pub meta: SignalMeta,
}

impl TradeSignal {
    /// Probability the strategy assigned to this bet winning.
    ///
    /// Falls back to entry price plus edge when the strategy did not record
    /// an explicit estimate.
    pub fn predicted_prob(&self) -> f64 {
        self.meta
            .estimated_prob
            .unwrap_or(self.entry_price + self.edge)
            .clamp(0.0, 1.0)
    }
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let question: String = self.question.chars().take(60).collect();
        write!(
            f,
            "{} | {}... | price={:.3} | edge={:+.3} | conf={:.2} | size=${:.2} | {}",
            self.side,
            question,
            self.entry_price,
            self.edge,
            self.confidence,
            self.position_size_usdc,
            self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal() -> TradeSignal {
        TradeSignal {
            side: Side::BuyYes,
            market_id: "m1".to_string(),
            question: "Will it happen?".to_string(),
            confidence: 0.7,
            entry_price: 0.55,
            position_size_usdc: 10.0,
            edge: 0.05,
            reason: "test".to_string(),
            meta: SignalMeta::for_strategy("value_betting"),
        }
    }

    #[test]
    fn side_serializes_in_wire_format() {
        assert_eq!(
            serde_json::to_string(&Side::BuyYes).unwrap(),
            "\"BUY_YES\""
        );
        assert_eq!(Side::from_outcome("no"), Some(Side::BuyNo));
    }

    #[test]
    fn predicted_prob_falls_back_to_price_plus_edge() {
        let mut sig = signal();
        assert!((sig.predicted_prob() - 0.60).abs() < 1e-9);

        sig.meta.estimated_prob = Some(0.72);
        assert!((sig.predicted_prob() - 0.72).abs() < 1e-9);
    }

    #[test]
    fn signal_round_trips_through_json() {
        let sig = signal();
        let json = serde_json::to_string(&sig).unwrap();
        let back: TradeSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(back.market_id, sig.market_id);
        assert_eq!(back.side, Side::BuyYes);
        assert_eq!(back.meta.strategy, "value_betting");
    }
}

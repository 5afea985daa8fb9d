//! Exchange boundary: market-data and order-submission collaborators.
//!
//! The engines only ever talk to these traits; the concrete Polymarket
//! client lives in [`client`]. Gamma's stringified JSON fields are
//! normalized here, once, into typed values.

pub mod client;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Side;

/// A normalized market as the core needs it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub slug: String,
    pub active: bool,
    pub closed: bool,
    #[serde(default)]
    pub resolved: bool,
    /// Displayed prices per outcome, index-aligned with `outcomes`
    pub outcome_prices: Vec<f64>,
    /// Outcome labels, usually ["Yes", "No"]
    pub outcomes: Vec<String>,
    /// CLOB token ids, index-aligned with `outcomes`
    pub token_ids: Vec<String>,
    pub volume: f64,
    pub liquidity: f64,
    #[serde(default)]
    pub end_date: String,
}

impl Market {
    pub fn yes_price(&self) -> f64 {
        self.outcome_prices.first().copied().unwrap_or(0.0)
    }

    pub fn no_price(&self) -> f64 {
        self.outcome_prices.get(1).copied().unwrap_or(0.0)
    }

    /// Displayed price for the outcome a side buys
    pub fn price_for_side(&self, side: Side) -> f64 {
        match side {
            Side::BuyYes => self.yes_price(),
            Side::BuyNo => self.no_price(),
        }
    }

    /// Look up the CLOB token id for a side by outcome label, falling back
    /// to index order for plain binary markets.
    pub fn token_for_side(&self, side: Side) -> Option<&str> {
        if let Some(idx) = self
            .outcomes
            .iter()
            .position(|o| o.to_uppercase() == side.outcome())
        {
            if let Some(token) = self.token_ids.get(idx) {
                return Some(token.as_str());
            }
        }
        if self.outcomes.is_empty() && self.token_ids.len() == 2 {
            let idx = match side {
                Side::BuyYes => 0,
                Side::BuyNo => 1,
            };
            return self.token_ids.get(idx).map(String::as_str);
        }
        None
    }
}

/// Complete CLOB API credential set. All four fields are required; a
/// partially configured set never reaches this type.
#[derive(Debug, Clone)]
pub struct LiveCredentials {
    pub address: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order lifetime on the book. Only good-till-cancelled is used; resting
/// orders are never expired automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[default]
    #[serde(rename = "GTC")]
    Gtc,
}

/// A limit order as handed to the order collaborator
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: OrderSide,
    /// Limit price, already tick-aligned
    pub price: f64,
    /// Size in shares
    pub shares: f64,
    pub client_id: String,
    pub time_in_force: TimeInForce,
}

/// Non-error acknowledgement from the order API. Says nothing about
/// whether the order rested or filled.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    #[serde(default)]
    pub status: String,
}

/// Market-data collaborator. The core only needs closed/resolved flags and
/// a YES probability in [0, 1].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn get_markets(&self, limit: usize) -> Result<Vec<Market>>;
    async fn get_market(&self, market_id: &str) -> Result<Market>;
}

/// Order-submission collaborator. Any error means no position is booked.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck>;
    async fn get_tick_size(&self, token_id: &str) -> Result<f64>;
    async fn get_fee_rate(&self, token_id: &str) -> Result<f64>;
    async fn cancel_all(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> Market {
        Market {
            id: "m1".to_string(),
            question: "Test?".to_string(),
            active: true,
            outcome_prices: vec![0.62, 0.38],
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            token_ids: vec!["tok_yes".to_string(), "tok_no".to_string()],
            volume: 50_000.0,
            liquidity: 12_000.0,
            ..Default::default()
        }
    }

    #[test]
    fn token_lookup_follows_outcome_labels() {
        let m = market();
        assert_eq!(m.token_for_side(Side::BuyYes), Some("tok_yes"));
        assert_eq!(m.token_for_side(Side::BuyNo), Some("tok_no"));
    }

    #[test]
    fn token_lookup_falls_back_to_index_order() {
        let mut m = market();
        m.outcomes.clear();
        assert_eq!(m.token_for_side(Side::BuyNo), Some("tok_no"));

        m.token_ids.pop();
        assert_eq!(m.token_for_side(Side::BuyNo), None);
    }

    #[test]
    fn prices_default_to_zero_when_missing() {
        let mut m = market();
        m.outcome_prices.clear();
        assert_eq!(m.yes_price(), 0.0);
        assert_eq!(m.price_for_side(Side::BuyNo), 0.0);
    }
}

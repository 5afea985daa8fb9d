//! Market data plumbing: point-in-time snapshots and the snapshot corpus
//! used for backtesting.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::exchange::{Market, MarketData};

/// Point-in-time view of one market, the unit strategies evaluate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub question: String,
    #[serde(default)]
    pub slug: String,
    pub yes_price: f64,
    pub no_price: f64,
    /// How far YES + NO drifts from 1.00
    pub spread: f64,
    pub volume: f64,
    pub liquidity: f64,
    pub active: bool,
    pub closed: bool,
    #[serde(default)]
    pub outcomes: Vec<String>,
    #[serde(default)]
    pub token_ids: Vec<String>,
    #[serde(default)]
    pub end_date: String,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn from_market(market: &Market, now: DateTime<Utc>) -> Self {
        let yes_price = market.yes_price();
        let no_price = market.no_price();
        Self {
            market_id: market.id.clone(),
            question: market.question.clone(),
            slug: market.slug.clone(),
            yes_price,
            no_price,
            spread: (1.0 - yes_price - no_price).abs(),
            volume: market.volume,
            liquidity: market.liquidity,
            active: market.active,
            closed: market.closed,
            outcomes: market.outcomes.clone(),
            token_ids: market.token_ids.clone(),
            end_date: market.end_date.clone(),
            timestamp: now,
        }
    }
}

/// Snapshot-derived values handed to strategies alongside the snapshot.
/// Anything needing price history or external models is a collaborator
/// concern, not computed here.
pub type Indicators = HashMap<String, f64>;

pub fn compute_indicators(snapshot: &MarketSnapshot) -> Indicators {
    let mut ind = Indicators::new();
    ind.insert("yes_price".to_string(), snapshot.yes_price);
    ind.insert("no_price".to_string(), snapshot.no_price);
    ind.insert("spread".to_string(), snapshot.spread);
    ind.insert("volume".to_string(), snapshot.volume);
    ind.insert("liquidity".to_string(), snapshot.liquidity);
    let vol_liq = if snapshot.liquidity > 0.0 {
        snapshot.volume / snapshot.liquidity
    } else {
        0.0
    };
    ind.insert("volume_liquidity_ratio".to_string(), vol_liq);
    ind.insert(
        "mid_distance".to_string(),
        (snapshot.yes_price - 0.5).abs(),
    );
    ind
}

/// Fetches, filters, and persists market snapshots
pub struct DataFeed {
    client: Arc<dyn MarketData>,
    snapshot_path: PathBuf,
}

impl DataFeed {
    pub fn new(client: Arc<dyn MarketData>, cfg: &AppConfig) -> Self {
        let snapshot_path = PathBuf::from(&cfg.data.dir).join(&cfg.data.snapshot_file);
        Self {
            client,
            snapshot_path,
        }
    }

    pub async fn market(&self, market_id: &str) -> Result<Market> {
        self.client.get_market(market_id).await
    }

    /// Snapshots for all markets that pass the configured filters:
    /// min volume, min liquidity, open, and inside the probability band.
    pub async fn all_snapshots(&self, cfg: &AppConfig) -> Result<Vec<MarketSnapshot>> {
        let markets = self.client.get_markets(100).await?;
        let total = markets.len();
        let now = Utc::now();

        let mut snapshots = Vec::new();
        for market in markets {
            if market.volume < cfg.filters.min_volume_usd
                || market.liquidity < cfg.filters.min_liquidity_usd
            {
                continue;
            }
            if market.closed || (cfg.filters.active_only && !market.active) {
                continue;
            }
            let yes = market.yes_price();
            if yes < cfg.risk.min_entry_probability || yes > cfg.risk.max_entry_probability {
                continue;
            }
            snapshots.push(MarketSnapshot::from_market(&market, now));
        }

        info!(
            kept = snapshots.len(),
            total, "Created market snapshots"
        );
        Ok(snapshots)
    }

    /// Append snapshots to the on-disk corpus for later backtesting.
    pub fn save_snapshots(&self, snapshots: &[MarketSnapshot]) -> Result<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut existing = self.load_snapshots().unwrap_or_default();
        existing.extend_from_slice(snapshots);

        let json = serde_json::to_string_pretty(&existing)?;
        fs::write(&self.snapshot_path, json)
            .with_context(|| format!("write {}", self.snapshot_path.display()))?;
        info!(
            added = snapshots.len(),
            total = existing.len(),
            path = %self.snapshot_path.display(),
            "💾 Snapshots saved"
        );
        Ok(())
    }

    /// Load the historical snapshot corpus.
    pub fn load_snapshots(&self) -> Result<Vec<MarketSnapshot>> {
        if !self.snapshot_path.exists() {
            warn!(path = %self.snapshot_path.display(), "No snapshot corpus found");
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.snapshot_path)
            .with_context(|| format!("read {}", self.snapshot_path.display()))?;
        let snapshots: Vec<MarketSnapshot> =
            serde_json::from_str(&raw).context("decode snapshot corpus")?;
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockMarketData;

    fn market(id: &str, yes: f64, volume: f64, liquidity: f64) -> Market {
        Market {
            id: id.to_string(),
            question: format!("Question {id}?"),
            active: true,
            closed: false,
            outcome_prices: vec![yes, 1.0 - yes],
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            token_ids: vec![format!("{id}_yes"), format!("{id}_no")],
            volume,
            liquidity,
            ..Default::default()
        }
    }

    fn config() -> AppConfig {
        AppConfig::load(None).unwrap()
    }

    #[tokio::test]
    async fn snapshots_respect_filters() {
        let mut data = MockMarketData::new();
        data.expect_get_markets().returning(|_| {
            Ok(vec![
                market("liquid", 0.55, 60_000.0, 12_000.0),
                market("thin", 0.55, 500.0, 100.0),
                market("extreme", 0.95, 60_000.0, 12_000.0),
            ])
        });

        let cfg = config();
        let feed = DataFeed::new(Arc::new(data), &cfg);
        let snaps = feed.all_snapshots(&cfg).await.unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].market_id, "liquid");
        assert!((snaps[0].no_price - 0.45).abs() < 1e-9);
    }

    #[test]
    fn indicators_are_cheap_snapshot_functions() {
        let snap = MarketSnapshot::from_market(&market("m", 0.62, 50_000.0, 10_000.0), Utc::now());
        let ind = compute_indicators(&snap);
        assert!((ind["yes_price"] - 0.62).abs() < 1e-9);
        assert!((ind["volume_liquidity_ratio"] - 5.0).abs() < 1e-9);
        assert!((ind["mid_distance"] - 0.12).abs() < 1e-9);
    }

    #[test]
    fn snapshot_corpus_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.data.dir = dir.path().to_string_lossy().to_string();

        let data = MockMarketData::new();
        let feed = DataFeed::new(Arc::new(data), &cfg);

        let snaps = vec![MarketSnapshot::from_market(
            &market("m", 0.62, 50_000.0, 10_000.0),
            Utc::now(),
        )];
        feed.save_snapshots(&snaps).unwrap();
        feed.save_snapshots(&snaps).unwrap();

        let loaded = feed.load_snapshots().unwrap();
        assert_eq!(loaded.len(), 2, "corpus appends across saves");
    }
}

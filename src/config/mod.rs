//! Configuration management for PolyTrader
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub trading: TradingConfig,
    pub risk: RiskSection,
    pub filters: FiltersConfig,
    pub backtest: BacktestSection,
    pub exchange: ExchangeConfig,
    pub strategy: StrategySection,
    pub data: DataConfig,
    pub journal: JournalConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Engine mode: "backtest", "paper", or "live"
    pub mode: String,
    /// Maximum simultaneous open positions
    pub max_open_positions: usize,
    /// Maximum position size per trade (USDC)
    pub max_position_usdc: f64,
    /// Minimum position size per trade (USDC)
    pub min_position_usdc: f64,
    /// Default size when a strategy has no opinion (USDC)
    pub default_position_usdc: f64,
    /// Smallest order the exchange will accept (USDC)
    pub min_order_usdc: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskSection {
    /// Start with the kill switch engaged (no trading until deactivated)
    pub kill_switch: bool,
    /// Maximum daily loss before trading halts (USDC)
    pub max_daily_loss_usdc: f64,
    /// Maximum peak-to-current drawdown in percent
    pub max_drawdown_pct: f64,
    /// Maximum trades per UTC day
    pub max_trades_per_day: u32,
    /// Consecutive losses that trip the circuit breaker
    pub circuit_breaker_losses: u32,
    /// Cooldown length after the breaker trips (minutes)
    pub cooldown_minutes: i64,
    /// What to do when one exit matches several open positions:
    /// "warn" or "reject"
    pub duplicate_exit_policy: String,
    /// Strategy tags allowed to hold several positions in one market
    /// (time-sliced event strategies)
    pub scaling_strategies: Vec<String>,
    /// Entry probability band for market filtering
    pub min_entry_probability: f64,
    pub max_entry_probability: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FiltersConfig {
    pub min_volume_usd: f64,
    pub min_liquidity_usd: f64,
    pub active_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestSection {
    /// Flat fee on notional, percent
    pub fee_pct: f64,
    /// Adverse price shift on entry, percent
    pub slippage_pct: f64,
    pub starting_balance_usdc: f64,
    /// Seed for the outcome simulation
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Gamma API endpoint (market data)
    pub gamma_url: String,
    /// CLOB API endpoint (orders)
    pub clob_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Response cache TTL in seconds
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategySection {
    /// Active strategy name
    pub active: String,
    pub value_betting: ValueBettingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueBettingConfig {
    /// Minimum probability edge required to trade
    pub min_edge: f64,
    /// Fraction of full Kelly to apply when sizing
    pub kelly_fraction: f64,
    /// Entry price band
    pub prob_range_low: f64,
    pub prob_range_high: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Base directory for persisted state
    pub dir: String,
    /// Paper session document, relative to `dir`
    pub paper_session_file: String,
    /// Live session document, relative to `dir`
    pub live_session_file: String,
    /// Snapshot corpus for backtesting, relative to `dir`
    pub snapshot_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    /// Directory for day-partitioned JSONL journal files
    pub dir: String,
    /// Default trailing window for accuracy stats (days)
    pub stats_window_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    pub telegram_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let mut builder = Config::builder()
            // Trading defaults
            .set_default("trading.mode", "paper")?
            .set_default("trading.max_open_positions", 5)?
            .set_default("trading.max_position_usdc", 25.0)?
            .set_default("trading.min_position_usdc", 1.0)?
            .set_default("trading.default_position_usdc", 5.0)?
            .set_default("trading.min_order_usdc", 1.0)?
            // Risk defaults
            .set_default("risk.kill_switch", false)?
            .set_default("risk.max_daily_loss_usdc", 20.0)?
            .set_default("risk.max_drawdown_pct", 20.0)?
            .set_default("risk.max_trades_per_day", 10)?
            .set_default("risk.circuit_breaker_losses", 3)?
            .set_default("risk.cooldown_minutes", 120)?
            .set_default("risk.duplicate_exit_policy", "warn")?
            .set_default(
                "risk.scaling_strategies",
                vec!["crypto_momentum_15m", "crypto_momentum_1h"],
            )?
            .set_default("risk.min_entry_probability", 0.15)?
            .set_default("risk.max_entry_probability", 0.85)?
            // Market filter defaults
            .set_default("filters.min_volume_usd", 10_000.0)?
            .set_default("filters.min_liquidity_usd", 5_000.0)?
            .set_default("filters.active_only", true)?
            // Backtest defaults
            .set_default("backtest.fee_pct", 2.0)?
            .set_default("backtest.slippage_pct", 1.0)?
            .set_default("backtest.starting_balance_usdc", 1000.0)?
            .set_default("backtest.seed", 42)?
            // Exchange defaults
            .set_default("exchange.gamma_url", "https://gamma-api.polymarket.com")?
            .set_default("exchange.clob_url", "https://clob.polymarket.com")?
            .set_default("exchange.timeout_secs", 15)?
            .set_default("exchange.cache_ttl_secs", 30)?
            // Strategy defaults
            .set_default("strategy.active", "value_betting")?
            .set_default("strategy.value_betting.min_edge", 0.05)?
            .set_default("strategy.value_betting.kelly_fraction", 0.25)?
            .set_default("strategy.value_betting.prob_range_low", 0.20)?
            .set_default("strategy.value_betting.prob_range_high", 0.80)?
            // Persistence defaults
            .set_default("data.dir", "./data")?
            .set_default("data.paper_session_file", "paper_session.json")?
            .set_default("data.live_session_file", "live_session.json")?
            .set_default("data.snapshot_file", "snapshots.json")?
            // Journal defaults
            .set_default("journal.dir", "./data/journal")?
            .set_default("journal.stats_window_days", 7)?
            // Notification defaults
            .set_default("notifications.telegram_enabled", false)?
            // Logging defaults
            .set_default("logging.level", "info")?;

        builder = match path {
            Some(p) => builder.add_source(File::with_name(p)),
            None => builder
                .add_source(File::with_name("config/default").required(false))
                .add_source(File::with_name("config/local").required(false)),
        };

        let config = builder
            // Override with environment variables (POLYTRADER_*)
            .add_source(Environment::with_prefix("POLYTRADER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Short config digest (without secrets) for startup logging
    pub fn digest(&self) -> String {
        format!(
            "mode={} strategy={} max_open={} max_pos=${:.0} daily_loss=${:.0} drawdown={:.0}%",
            self.trading.mode,
            self.strategy.active,
            self.trading.max_open_positions,
            self.trading.max_position_usdc,
            self.risk.max_daily_loss_usdc,
            self.risk.max_drawdown_pct
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_files() {
        let cfg = AppConfig::load(None).expect("defaults should build");
        assert_eq!(cfg.trading.mode, "paper");
        assert_eq!(cfg.trading.max_open_positions, 5);
        assert_eq!(cfg.risk.circuit_breaker_losses, 3);
        assert_eq!(cfg.risk.duplicate_exit_policy, "warn");
        assert!(cfg
            .risk
            .scaling_strategies
            .iter()
            .any(|s| s == "crypto_momentum_15m"));
        assert_eq!(cfg.backtest.seed, 42);
    }

    #[test]
    fn digest_has_no_secrets() {
        let cfg = AppConfig::load(None).unwrap();
        let digest = cfg.digest();
        assert!(digest.contains("mode=paper"));
        assert!(digest.contains("strategy=value_betting"));
    }
}

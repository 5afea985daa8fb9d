//! Backtesting engine: replay strategy decisions over a historical
//! snapshot corpus with stochastic outcome resolution.
//!
//! Outcomes are drawn from a seeded generator with win probability equal
//! to the market's own displayed price for the chosen side; the market is
//! assumed calibrated. Identical seed, snapshot sequence, and strategy
//! produce identical trades and metrics, which is what lets an outer
//! Monte Carlo loop re-run the engine across many seeds and compare.
//!
//! Trades pass through a real risk manager driven by a clock that follows
//! snapshot timestamps, so daily limits and the circuit breaker bite in
//! simulated time exactly as they would live.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::data::{compute_indicators, MarketSnapshot};
use crate::risk::{Clock, RiskLimits, RiskManager};
use crate::strategy::Strategy;
use crate::types::Side;

/// Clock that follows the snapshot stream instead of the wall
struct SimClock(AtomicI64);

impl SimClock {
    fn at(ts: DateTime<Utc>) -> Self {
        Self(AtomicI64::new(ts.timestamp_millis()))
    }

    fn set(&self, ts: DateTime<Utc>) {
        self.0.store(ts.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.0.load(Ordering::SeqCst))
            .expect("valid simulated timestamp")
    }
}

/// Record of a single backtested trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub market_id: String,
    pub question: String,
    pub side: Side,
    /// Entry after slippage
    pub entry_price: f64,
    pub size_usdc: f64,
    pub shares: f64,
    pub won: bool,
    pub pnl: f64,
    pub fees: f64,
    pub edge: f64,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
}

/// Comprehensive backtest results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub seed: u64,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub total_fees: f64,
    pub net_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    /// Largest peak-to-trough equity decline, USDC
    pub max_drawdown: f64,
    /// Annualized mean/sigma of the per-trade pnl series
    pub sharpe_ratio: f64,
    pub starting_balance: f64,
    pub ending_balance: f64,
    pub roi_pct: f64,
    pub trades: Vec<BacktestTrade>,
    pub equity_curve: Vec<f64>,
}

impl BacktestResult {
    pub fn summary(&self) -> String {
        format!(
            "\n{eq}\n  BACKTEST RESULTS - {name}\n{eq}\n\
             \x20 Total Trades:     {trades}\n\
             \x20 Wins / Losses:    {wins} / {losses}\n\
             \x20 Win Rate:         {win_rate:.1}%\n\
             \x20 Net PnL:          ${net:+.2}\n\
             \x20 Fees Paid:        ${fees:.2}\n\
             \x20 ROI:              {roi:+.1}%\n\
             \x20 Avg Win:          ${avg_win:+.2}\n\
             \x20 Avg Loss:         ${avg_loss:+.2}\n\
             \x20 Profit Factor:    {pf:.2}\n\
             \x20 Max Drawdown:     ${dd:.2}\n\
             \x20 Sharpe Ratio:     {sharpe:.2}\n\
             \x20 Ending Balance:   ${ending:.2}\n{eq}\n",
            eq = "=".repeat(60),
            name = self.strategy_name,
            trades = self.total_trades,
            wins = self.wins,
            losses = self.losses,
            win_rate = self.win_rate * 100.0,
            net = self.net_pnl,
            fees = self.total_fees,
            roi = self.roi_pct,
            avg_win = self.avg_win,
            avg_loss = self.avg_loss,
            pf = self.profit_factor,
            dd = self.max_drawdown,
            sharpe = self.sharpe_ratio,
            ending = self.ending_balance,
        )
    }
}

/// Run strategy backtests on historical snapshot data
pub struct BacktestEngine {
    fee_pct: f64,
    slippage_pct: f64,
    starting_balance: f64,
    limits: RiskLimits,
    results_dir: PathBuf,
}

impl BacktestEngine {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            fee_pct: cfg.backtest.fee_pct,
            slippage_pct: cfg.backtest.slippage_pct,
            starting_balance: cfg.backtest.starting_balance_usdc,
            limits: RiskLimits::from_config(cfg),
            results_dir: PathBuf::from(&cfg.data.dir),
        }
    }

    pub fn run(
        &self,
        strategy: &dyn Strategy,
        snapshots: &[MarketSnapshot],
        seed: u64,
    ) -> BacktestResult {
        let mut rng = StdRng::seed_from_u64(seed);

        let start_ts = snapshots
            .first()
            .map(|s| s.timestamp)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap());
        let clock = Arc::new(SimClock::at(start_ts));
        let mut risk = RiskManager::with_clock(self.limits.clone(), clock.clone());
        risk.initialize_portfolio(self.starting_balance);

        info!(
            strategy = strategy.name(),
            snapshots = snapshots.len(),
            seed,
            balance = self.starting_balance,
            "Running backtest"
        );

        let mut trades: Vec<BacktestTrade> = Vec::new();
        let mut pnl_series: Vec<f64> = Vec::new();
        let mut equity_curve = vec![self.starting_balance];
        let mut peak = self.starting_balance;
        let mut max_drawdown = 0.0f64;

        for snapshot in snapshots {
            clock.set(snapshot.timestamp);

            let indicators = compute_indicators(snapshot);
            let Some(signal) = strategy.evaluate(snapshot, &indicators) else {
                continue;
            };

            let (allowed, reason) = risk.validate_trade(&signal);
            if !allowed {
                debug!(market_id = %signal.market_id, reason, "Backtest signal rejected");
                continue;
            }

            // Slippage moves the fill against us; fees come off notional.
            let size = signal.position_size_usdc;
            let slippage = signal.entry_price * (self.slippage_pct / 100.0);
            let effective_entry = signal.entry_price + slippage;
            let fees = size * (self.fee_pct / 100.0);
            let shares = if effective_entry > 0.0 {
                (size - fees) / effective_entry
            } else {
                0.0
            };

            // The market's displayed price is taken as the true win
            // probability for the chosen side.
            let win_prob = match signal.side {
                Side::BuyYes => snapshot.yes_price,
                Side::BuyNo => snapshot.no_price,
            };
            let won = rng.gen::<f64>() < win_prob;
            let pnl = if won { shares * 1.0 - size } else { -size };

            let trade_id = format!("BT_{}", trades.len() + 1);
            risk.record_trade_entry(&signal, &trade_id);
            // The outcome resolves immediately in simulation; warn-policy
            // exits cannot fail here.
            let _ = risk.record_trade_exit(&trade_id, pnl);

            trades.push(BacktestTrade {
                market_id: signal.market_id.clone(),
                question: signal.question.clone(),
                side: signal.side,
                entry_price: effective_entry,
                size_usdc: size,
                shares,
                won,
                pnl,
                fees,
                edge: signal.edge,
                strategy: signal.meta.strategy.clone(),
                timestamp: snapshot.timestamp,
            });
            pnl_series.push(pnl);

            let balance = risk.portfolio.balance;
            equity_curve.push(balance);
            peak = peak.max(balance);
            max_drawdown = max_drawdown.max(peak - balance);
        }

        let result = self.compute_metrics(
            strategy.name(),
            seed,
            trades,
            pnl_series,
            equity_curve,
            max_drawdown,
        );
        info!(
            total_trades = result.total_trades,
            net_pnl = result.net_pnl,
            "Backtest finished"
        );
        result
    }

    fn compute_metrics(
        &self,
        name: &str,
        seed: u64,
        trades: Vec<BacktestTrade>,
        pnl_series: Vec<f64>,
        equity_curve: Vec<f64>,
        max_drawdown: f64,
    ) -> BacktestResult {
        let mut result = BacktestResult {
            strategy_name: name.to_string(),
            seed,
            starting_balance: self.starting_balance,
            ending_balance: self.starting_balance,
            equity_curve,
            ..Default::default()
        };

        if trades.is_empty() {
            result.trades = trades;
            return result;
        }

        result.total_trades = trades.len();
        result.wins = trades.iter().filter(|t| t.won).count();
        result.losses = result.total_trades - result.wins;
        result.win_rate = result.wins as f64 / result.total_trades as f64;
        result.total_fees = trades.iter().map(|t| t.fees).sum();

        let win_pnls: Vec<f64> = trades.iter().filter(|t| t.won).map(|t| t.pnl).collect();
        let loss_pnls: Vec<f64> = trades.iter().filter(|t| !t.won).map(|t| t.pnl).collect();
        result.avg_win = if win_pnls.is_empty() {
            0.0
        } else {
            win_pnls.iter().sum::<f64>() / win_pnls.len() as f64
        };
        result.avg_loss = if loss_pnls.is_empty() {
            0.0
        } else {
            loss_pnls.iter().sum::<f64>() / loss_pnls.len() as f64
        };

        let gross_profit: f64 = win_pnls.iter().sum();
        let gross_loss: f64 = loss_pnls.iter().map(|p| p.abs()).sum();
        result.profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        result.total_pnl = pnl_series.iter().sum();
        result.net_pnl = result.total_pnl;
        result.ending_balance = self.starting_balance + result.net_pnl;
        result.roi_pct = result.net_pnl / self.starting_balance * 100.0;
        result.max_drawdown = max_drawdown;

        if pnl_series.len() > 1 {
            let mean = result.total_pnl / pnl_series.len() as f64;
            let variance = pnl_series
                .iter()
                .map(|p| (p - mean).powi(2))
                .sum::<f64>()
                / (pnl_series.len() - 1) as f64;
            let sigma = variance.sqrt();
            result.sharpe_ratio = if sigma > 0.0 {
                mean / sigma * 252.0f64.sqrt()
            } else {
                0.0
            };
        }

        result.trades = trades;
        result
    }

    /// Write the full result document to the data directory.
    pub fn save_results(&self, result: &BacktestResult) -> anyhow::Result<PathBuf> {
        self.save_results_to(result, &self.results_dir)
    }

    fn save_results_to(&self, result: &BacktestResult, dir: &Path) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let ts = Utc::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("backtest_{}_{ts}.json", result.strategy_name));
        fs::write(&path, serde_json::to_string_pretty(result)?)?;
        info!(path = %path.display(), "💾 Backtest results saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Indicators;
    use crate::types::{SignalMeta, TradeSignal};
    use chrono::{Duration, TimeZone};

    /// Buys YES on every snapshot at the displayed price
    struct TakeEverything {
        size: f64,
    }

    impl Strategy for TakeEverything {
        fn name(&self) -> &str {
            "take_everything"
        }

        fn evaluate(
            &self,
            snapshot: &MarketSnapshot,
            _indicators: &Indicators,
        ) -> Option<TradeSignal> {
            Some(TradeSignal {
                side: Side::BuyYes,
                market_id: snapshot.market_id.clone(),
                question: snapshot.question.clone(),
                confidence: 0.7,
                entry_price: snapshot.yes_price,
                position_size_usdc: self.size,
                edge: 0.05,
                reason: "test".to_string(),
                meta: SignalMeta::for_strategy("take_everything"),
            })
        }
    }

    fn snapshots(n: usize, yes: f64) -> Vec<MarketSnapshot> {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        (0..n)
            .map(|i| MarketSnapshot {
                market_id: format!("m{i}"),
                question: format!("Q{i}?"),
                slug: String::new(),
                yes_price: yes,
                no_price: 1.0 - yes,
                spread: 0.0,
                volume: 60_000.0,
                liquidity: 12_000.0,
                active: true,
                closed: false,
                outcomes: vec!["Yes".to_string(), "No".to_string()],
                token_ids: Vec::new(),
                end_date: String::new(),
                timestamp: base + Duration::minutes(5 * i as i64),
            })
            .collect()
    }

    fn engine() -> BacktestEngine {
        let mut cfg = AppConfig::load(None).unwrap();
        cfg.backtest.fee_pct = 0.0;
        cfg.backtest.slippage_pct = 0.0;
        cfg.risk.max_trades_per_day = 1000;
        cfg.risk.circuit_breaker_losses = 1000;
        BacktestEngine::new(&cfg)
    }

    #[test]
    fn empty_corpus_produces_empty_result() {
        let result = engine().run(&TakeEverything { size: 10.0 }, &[], 42);
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.ending_balance, 1000.0);
    }

    #[test]
    fn same_seed_reproduces_the_run_exactly() {
        let eng = engine();
        let strat = TakeEverything { size: 10.0 };
        let corpus = snapshots(40, 0.55);

        let a = eng.run(&strat, &corpus, 7);
        let b = eng.run(&strat, &corpus, 7);
        assert_eq!(a.total_trades, b.total_trades);
        assert_eq!(a.wins, b.wins);
        assert_eq!(a.net_pnl, b.net_pnl);
        assert_eq!(a.equity_curve, b.equity_curve);

        // A different seed draws a different outcome sequence
        let c = eng.run(&strat, &corpus, 8);
        let outcomes = |r: &BacktestResult| -> Vec<bool> {
            r.trades.iter().map(|t| t.won).collect()
        };
        assert_ne!(outcomes(&a), outcomes(&c));
    }

    #[test]
    fn win_and_loss_payouts_follow_share_math() {
        let eng = engine();
        let strat = TakeEverything { size: 10.0 };

        // Entry at 0.50 for $10 buys 20 shares; settlement pays out the
        // full dollar per share on a win and zero on a loss.
        let result = eng.run(&strat, &snapshots(1, 0.5), 3);
        assert_eq!(result.total_trades, 1);
        let trade = &result.trades[0];
        assert!((trade.shares - 20.0).abs() < 1e-9);
        if trade.won {
            assert!((trade.pnl - 10.0).abs() < 1e-9);
            assert!((result.ending_balance - 1010.0).abs() < 1e-9);
        } else {
            assert!((trade.pnl + 10.0).abs() < 1e-9);
            assert!((result.ending_balance - 990.0).abs() < 1e-9);
        }
    }

    #[test]
    fn fees_and_slippage_shrink_the_shares() {
        let mut cfg = AppConfig::load(None).unwrap();
        cfg.backtest.fee_pct = 2.0;
        cfg.backtest.slippage_pct = 1.0;
        cfg.risk.max_trades_per_day = 1000;
        let eng = BacktestEngine::new(&cfg);

        let result = eng.run(&TakeEverything { size: 10.0 }, &snapshots(1, 0.50), 3);
        let trade = &result.trades[0];
        // effective entry 0.505, investable 9.8
        assert!((trade.entry_price - 0.505).abs() < 1e-9);
        assert!((trade.shares - 9.8 / 0.505).abs() < 1e-9);
        assert!((trade.fees - 0.2).abs() < 1e-9);
    }

    #[test]
    fn risk_limits_throttle_the_backtest() {
        let mut cfg = AppConfig::load(None).unwrap();
        cfg.backtest.fee_pct = 0.0;
        cfg.backtest.slippage_pct = 0.0;
        cfg.risk.max_trades_per_day = 3;
        cfg.risk.circuit_breaker_losses = 1000;
        let eng = BacktestEngine::new(&cfg);

        // All snapshots share one simulated day, so the daily cap holds
        let result = eng.run(&TakeEverything { size: 10.0 }, &snapshots(20, 0.55), 11);
        assert_eq!(result.total_trades, 3);
    }

    #[test]
    fn drawdown_and_sharpe_are_computed() {
        let eng = engine();
        let result = eng.run(&TakeEverything { size: 10.0 }, &snapshots(60, 0.5), 5);
        assert!(result.total_trades > 0);
        assert!(result.max_drawdown >= 0.0);
        assert!(result.sharpe_ratio.is_finite());
        assert_eq!(
            result.equity_curve.len(),
            result.total_trades + 1,
            "equity curve includes the starting point"
        );
    }
}

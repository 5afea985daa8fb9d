//! Risk Manager - capital discipline and portfolio ledger
//!
//! Implements:
//! - Kill switch (overrides everything)
//! - Circuit breaker with cooldown after consecutive losses
//! - Daily trade-count and loss limits (UTC day rollover)
//! - Drawdown limit against the portfolio high-water mark
//! - Open-position count and balance checks
//! - Duplicate-market guard with a scaling allowlist
//!
//! The same manager gates all three execution modes, so a backtest is
//! throttled by exactly the rules that would throttle live trading.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::types::{Side, TradeSignal};

/// Time source, injectable so cooldown and rollover behavior is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Policy when one exit identifier matches more than one open position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateExitPolicy {
    /// Log a warning and settle them all (upstream bug, but not fatal)
    Warn,
    /// Refuse the exit as an invariant violation
    Reject,
}

impl DuplicateExitPolicy {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "reject" => DuplicateExitPolicy::Reject,
            _ => DuplicateExitPolicy::Warn,
        }
    }
}

/// Risk limits, lifted out of the app config
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_daily_loss_usdc: f64,
    pub max_drawdown_pct: f64,
    pub max_trades_per_day: u32,
    pub circuit_breaker_losses: u32,
    pub cooldown_minutes: i64,
    pub max_open_positions: usize,
    pub max_position_usdc: f64,
    pub min_position_usdc: f64,
    pub duplicate_exit_policy: DuplicateExitPolicy,
    pub scaling_strategies: Vec<String>,
}

impl RiskLimits {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_daily_loss_usdc: cfg.risk.max_daily_loss_usdc,
            max_drawdown_pct: cfg.risk.max_drawdown_pct,
            max_trades_per_day: cfg.risk.max_trades_per_day,
            circuit_breaker_losses: cfg.risk.circuit_breaker_losses,
            cooldown_minutes: cfg.risk.cooldown_minutes,
            max_open_positions: cfg.trading.max_open_positions,
            max_position_usdc: cfg.trading.max_position_usdc,
            min_position_usdc: cfg.trading.min_position_usdc,
            duplicate_exit_policy: DuplicateExitPolicy::parse(&cfg.risk.duplicate_exit_policy),
            scaling_strategies: cfg.risk.scaling_strategies.clone(),
        }
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_loss_usdc: 20.0,
            max_drawdown_pct: 20.0,
            max_trades_per_day: 10,
            circuit_breaker_losses: 3,
            cooldown_minutes: 120,
            max_open_positions: 5,
            max_position_usdc: 25.0,
            min_position_usdc: 1.0,
            duplicate_exit_policy: DuplicateExitPolicy::Warn,
            scaling_strategies: vec![
                "crypto_momentum_15m".to_string(),
                "crypto_momentum_1h".to_string(),
            ],
        }
    }
}

/// One open bet as the ledger sees it
#[derive(Debug, Clone, Serialize)]
pub struct OpenPosition {
    pub trade_id: String,
    pub market_id: String,
    pub question: String,
    pub side: Side,
    pub entry_price: f64,
    pub size_usdc: f64,
    pub entry_time: DateTime<Utc>,
}

/// Immutable record of a realized exit
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub identifier: String,
    pub pnl: f64,
    pub balance_after: f64,
    pub timestamp: DateTime<Utc>,
}

/// Overall portfolio state
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    /// Uninvested cash
    pub balance: f64,
    pub starting_balance: f64,
    /// High-water mark of total value; never decreases
    pub peak_balance: f64,
    pub open_positions: Vec<OpenPosition>,
    /// Append-only exit ledger
    pub trade_history: Vec<LedgerEntry>,
}

impl Portfolio {
    /// Cash plus capital locked in open positions.
    ///
    /// Invested capital is not a loss; only realized losses and actual value
    /// decline count toward drawdown.
    pub fn total_value(&self) -> f64 {
        let invested: f64 = self.open_positions.iter().map(|p| p.size_usdc).sum();
        self.balance + invested
    }

    /// Peak-to-current decline of total value, in percent
    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_balance <= 0.0 {
            return 0.0;
        }
        (self.peak_balance - self.total_value()) / self.peak_balance * 100.0
    }

    pub fn open_position_count(&self) -> usize {
        self.open_positions.len()
    }
}

/// Per-UTC-day trading statistics
#[derive(Debug, Clone)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub trades_today: u32,
    pub daily_pnl: f64,
    pub consecutive_losses: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl DailyStats {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            trades_today: 0,
            daily_pnl: 0.0,
            consecutive_losses: 0,
            cooldown_until: None,
        }
    }

    /// Start a new UTC day. Consecutive losses and cooldown persist across
    /// the rollover; only the per-day counters reset.
    fn roll_over(&mut self, date: NaiveDate) {
        self.date = date;
        self.trades_today = 0;
        self.daily_pnl = 0.0;
    }
}

/// Serializable risk snapshot for summaries and the status command
#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub can_trade: bool,
    pub reason: String,
    pub kill_switch: bool,
    pub balance: f64,
    pub total_value: f64,
    pub peak_balance: f64,
    pub drawdown_pct: f64,
    pub daily_pnl: f64,
    pub trades_today: u32,
    pub consecutive_losses: u32,
    pub open_positions: usize,
    pub cooldown_active: bool,
}

/// Enforces risk limits and keeps the capital ledger
pub struct RiskManager {
    limits: RiskLimits,
    pub portfolio: Portfolio,
    pub daily: DailyStats,
    kill_switch: bool,
    clock: Arc<dyn Clock>,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    pub fn with_clock(limits: RiskLimits, clock: Arc<dyn Clock>) -> Self {
        let today = clock.now().date_naive();
        info!(
            max_daily_loss = limits.max_daily_loss_usdc,
            max_drawdown_pct = limits.max_drawdown_pct,
            max_trades_per_day = limits.max_trades_per_day,
            "RiskManager initialized"
        );
        Self {
            limits,
            portfolio: Portfolio::default(),
            daily: DailyStats::new(today),
            kill_switch: false,
            clock,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut manager = Self::new(RiskLimits::from_config(cfg));
        if cfg.risk.kill_switch {
            manager.activate_kill_switch();
        }
        manager
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Set the initial portfolio balance
    pub fn initialize_portfolio(&mut self, balance: f64) {
        self.portfolio.balance = balance;
        self.portfolio.starting_balance = balance;
        self.portfolio.peak_balance = balance;
        self.portfolio.open_positions.clear();
        self.portfolio.trade_history.clear();
        self.daily = DailyStats::new(self.clock.now().date_naive());
    }

    /// Check whether trading is currently allowed.
    ///
    /// Checks run in fixed priority order and the reason always names the
    /// first one that failed.
    pub fn can_trade(&mut self) -> (bool, String) {
        if self.kill_switch {
            return (false, "Kill switch is active".to_string());
        }

        let now = self.clock.now();
        let today = now.date_naive();
        if self.daily.date != today {
            self.daily.roll_over(today);
        }

        if let Some(until) = self.daily.cooldown_until {
            if now < until {
                let remaining = (until - now).num_minutes().max(0);
                return (
                    false,
                    format!("Cooldown active ({remaining} minutes remaining)"),
                );
            }
            self.daily.cooldown_until = None;
            self.daily.consecutive_losses = 0;
            info!("Cooldown period ended, trading resumed");
        }

        if self.daily.trades_today >= self.limits.max_trades_per_day {
            return (
                false,
                format!(
                    "Daily trade limit reached ({})",
                    self.limits.max_trades_per_day
                ),
            );
        }

        if self.daily.daily_pnl <= -self.limits.max_daily_loss_usdc {
            return (
                false,
                format!("Daily loss limit reached (${:.2})", self.daily.daily_pnl),
            );
        }

        if self.portfolio.drawdown_pct() >= self.limits.max_drawdown_pct {
            return (
                false,
                format!(
                    "Max drawdown reached ({:.1}%)",
                    self.portfolio.drawdown_pct()
                ),
            );
        }

        if self.portfolio.open_position_count() >= self.limits.max_open_positions {
            return (
                false,
                format!(
                    "Max open positions reached ({})",
                    self.limits.max_open_positions
                ),
            );
        }

        if self.portfolio.balance < self.limits.min_position_usdc {
            return (
                false,
                format!("Insufficient balance (${:.2})", self.portfolio.balance),
            );
        }

        (true, "OK".to_string())
    }

    /// Validate a specific trade signal against risk rules
    pub fn validate_trade(&mut self, signal: &TradeSignal) -> (bool, String) {
        let (allowed, reason) = self.can_trade();
        if !allowed {
            return (false, reason);
        }

        if signal.position_size_usdc > self.limits.max_position_usdc {
            return (
                false,
                format!(
                    "Position too large (${:.2} > ${:.2})",
                    signal.position_size_usdc, self.limits.max_position_usdc
                ),
            );
        }

        if signal.position_size_usdc < self.limits.min_position_usdc {
            return (
                false,
                format!(
                    "Position too small (${:.2} < ${:.2})",
                    signal.position_size_usdc, self.limits.min_position_usdc
                ),
            );
        }

        if signal.position_size_usdc > self.portfolio.balance {
            return (
                false,
                format!(
                    "Insufficient balance for ${:.2} trade",
                    signal.position_size_usdc
                ),
            );
        }

        // One open position per market, unless the strategy is explicitly
        // allowed to scale into time-sliced markets.
        let scaling_allowed = self
            .limits
            .scaling_strategies
            .iter()
            .any(|s| *s == signal.meta.strategy);
        if !scaling_allowed {
            let duplicate = self
                .portfolio
                .open_positions
                .iter()
                .any(|p| p.market_id == signal.market_id);
            if duplicate {
                return (
                    false,
                    format!("Already have position in market {}", signal.market_id),
                );
            }
        }

        (true, "OK".to_string())
    }

    /// Record a new trade entry. Caller must have already validated.
    pub fn record_trade_entry(&mut self, signal: &TradeSignal, trade_id: &str) {
        self.daily.trades_today += 1;
        self.portfolio.balance -= signal.position_size_usdc;

        self.portfolio.open_positions.push(OpenPosition {
            trade_id: trade_id.to_string(),
            market_id: signal.market_id.clone(),
            question: signal.question.clone(),
            side: signal.side,
            entry_price: signal.entry_price,
            size_usdc: signal.position_size_usdc,
            entry_time: self.clock.now(),
        });

        info!(
            trade_id,
            side = %signal.side,
            size_usdc = signal.position_size_usdc,
            market_id = %signal.market_id,
            "Trade entered"
        );
    }

    /// Record a trade exit and update stats.
    ///
    /// Matches the open position by trade_id first, falling back to
    /// market_id. The settled position's stake is released back to cash
    /// along with the realized pnl, so
    /// `balance + open sizes == starting + realized pnl` holds throughout.
    /// More than one match is handled per the configured duplicate-exit
    /// policy.
    pub fn record_trade_exit(&mut self, identifier: &str, pnl: f64) -> Result<(), EngineError> {
        let freed: f64 = self
            .portfolio
            .open_positions
            .iter()
            .filter(|p| p.trade_id == identifier || p.market_id == identifier)
            .map(|p| p.size_usdc)
            .sum();
        let matches = self
            .portfolio
            .open_positions
            .iter()
            .filter(|p| p.trade_id == identifier || p.market_id == identifier)
            .count();

        if matches > 1 {
            match self.limits.duplicate_exit_policy {
                DuplicateExitPolicy::Reject => {
                    return Err(EngineError::Invariant(format!(
                        "exit for {identifier} matches {matches} open positions"
                    )));
                }
                DuplicateExitPolicy::Warn => {
                    warn!(
                        identifier,
                        matches, "Exit removed more than one position (expected 1)"
                    );
                }
            }
        } else if matches == 0 {
            warn!(identifier, "Exit recorded for unknown position");
        }

        self.portfolio
            .open_positions
            .retain(|p| p.trade_id != identifier && p.market_id != identifier);

        self.daily.daily_pnl += pnl;
        self.portfolio.balance += freed + pnl;

        self.portfolio.peak_balance = self
            .portfolio
            .peak_balance
            .max(self.portfolio.total_value());

        if pnl < 0.0 {
            self.daily.consecutive_losses += 1;
            if self.daily.consecutive_losses >= self.limits.circuit_breaker_losses {
                let until =
                    self.clock.now() + chrono::Duration::minutes(self.limits.cooldown_minutes);
                self.daily.cooldown_until = Some(until);
                warn!(
                    consecutive_losses = self.daily.consecutive_losses,
                    cooldown_minutes = self.limits.cooldown_minutes,
                    "Circuit breaker triggered"
                );
            }
        } else {
            self.daily.consecutive_losses = 0;
        }

        let entry = LedgerEntry {
            identifier: identifier.to_string(),
            pnl,
            balance_after: self.portfolio.balance,
            timestamp: self.clock.now(),
        };
        self.portfolio.trade_history.push(entry);

        info!(
            identifier,
            pnl,
            balance = self.portfolio.balance,
            drawdown_pct = self.portfolio.drawdown_pct(),
            "Trade exited"
        );
        Ok(())
    }

    /// Emergency stop for all trading
    pub fn activate_kill_switch(&mut self) {
        self.kill_switch = true;
        warn!("KILL SWITCH ACTIVATED: all trading halted");
    }

    pub fn deactivate_kill_switch(&mut self) {
        self.kill_switch = false;
        warn!("Kill switch deactivated, trading re-enabled");
    }

    pub fn kill_switch_active(&self) -> bool {
        self.kill_switch
    }

    /// Current risk status summary
    pub fn status(&mut self) -> RiskStatus {
        let (can_trade, reason) = self.can_trade();
        RiskStatus {
            can_trade,
            reason,
            kill_switch: self.kill_switch,
            balance: self.portfolio.balance,
            total_value: self.portfolio.total_value(),
            peak_balance: self.portfolio.peak_balance,
            drawdown_pct: self.portfolio.drawdown_pct(),
            daily_pnl: self.daily.daily_pnl,
            trades_today: self.daily.trades_today,
            consecutive_losses: self.daily.consecutive_losses,
            open_positions: self.portfolio.open_position_count(),
            cooldown_active: self.daily.cooldown_until.is_some(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use super::Clock;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Manually advanced clock for cooldown and rollover tests
    pub struct ManualClock(AtomicI64);

    impl ManualClock {
        pub fn at(ts: DateTime<Utc>) -> Self {
            Self(AtomicI64::new(ts.timestamp_millis()))
        }

        pub fn advance_minutes(&self, minutes: i64) {
            self.0.fetch_add(minutes * 60_000, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::<Utc>::from_timestamp_millis(self.0.load(Ordering::SeqCst))
                .expect("valid manual clock timestamp")
        }
    }
}

//! Session and position model shared by the execution engines.
//!
//! A session is one engine run: its positions, aggregates, and identity,
//! persisted as a single JSON document. Writes go through a temp file and
//! an atomic rename so a crash mid-write never corrupts on-disk state, and
//! loads tolerate transient read failures with a bounded retry before
//! giving up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::risk::{OpenPosition, RiskManager};
use crate::types::{Side, TradeSignal};

/// Lifecycle state of a position. Open transitions exactly once into one of
/// the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Won,
    Lost,
    Sold,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionStatus::Open)
    }
}

/// One bet, open or settled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub trade_id: String,
    pub market_id: String,
    pub question: String,
    pub side: Side,
    pub entry_price: f64,
    pub size_usdc: f64,
    pub shares: f64,
    /// Strategy tag carried from the signal, for the journal
    #[serde(default)]
    pub strategy: String,
    /// Probability the strategy assigned to this bet winning
    #[serde(default)]
    pub predicted_prob: f64,
    #[serde(default)]
    pub predicted_edge: f64,
    /// CLOB token the position holds; only set by the live engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub pnl: f64,
}

impl Position {
    /// Build an open position from a validated signal.
    pub fn from_signal(
        signal: &TradeSignal,
        trade_id: &str,
        shares: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            trade_id: trade_id.to_string(),
            market_id: signal.market_id.clone(),
            question: signal.question.clone(),
            side: signal.side,
            entry_price: signal.entry_price,
            size_usdc: signal.position_size_usdc,
            shares,
            strategy: signal.meta.strategy.clone(),
            predicted_prob: signal.predicted_prob(),
            predicted_edge: signal.edge,
            token_id: signal.meta.token_id.clone(),
            entry_time: now,
            status: PositionStatus::Open,
            exit_time: None,
            exit_price: None,
            pnl: 0.0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Persisted container for one engine run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub started: DateTime<Utc>,
    pub strategy: String,
    pub starting_balance: f64,
    pub current_balance: f64,
    pub positions: Vec<Position>,
    pub closed_trades: Vec<Position>,
    pub total_pnl: f64,
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
}

impl Session {
    pub fn new(strategy: &str, balance: f64, now: DateTime<Utc>) -> Self {
        Self {
            session_id: now.format("%Y%m%d_%H%M%S").to_string(),
            started: now,
            strategy: strategy.to_string(),
            starting_balance: balance,
            current_balance: balance,
            positions: Vec::new(),
            closed_trades: Vec::new(),
            total_pnl: 0.0,
            total_trades: 0,
            wins: 0,
            losses: 0,
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.total_trades as f64
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.iter().filter(|p| p.is_open()).count()
    }

    /// Book a freshly executed position.
    pub fn record_entry(&mut self, position: Position, balance_after: f64) {
        self.positions.push(position);
        self.total_trades += 1;
        self.current_balance = balance_after;
    }

    /// Settle the open position at `index` into a terminal state.
    ///
    /// Moves it from `positions` to `closed_trades` and updates the session
    /// aggregates. A sold position counts as a win when it realized a
    /// profit.
    pub fn settle(
        &mut self,
        index: usize,
        status: PositionStatus,
        exit_price: Option<f64>,
        pnl: f64,
        balance_after: f64,
        now: DateTime<Utc>,
    ) -> Position {
        debug_assert!(status.is_terminal());
        let mut position = self.positions.remove(index);
        position.status = status;
        position.exit_time = Some(now);
        position.exit_price = exit_price;
        position.pnl = pnl;

        self.total_pnl += pnl;
        self.current_balance = balance_after;
        let won = match status {
            PositionStatus::Won => true,
            PositionStatus::Lost => false,
            PositionStatus::Sold => pnl > 0.0,
            PositionStatus::Open => unreachable!(),
        };
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }

        self.closed_trades.push(position.clone());
        position
    }
}

/// Rebuild the risk manager's state from a persisted session.
///
/// A resumed process must enforce the same limits a fresh one would, so
/// this reconstructs everything: balances, high-water mark, the
/// open-position ledger, daily counters from position timestamps, and a
/// re-armed cooldown when the trailing loss streak warrants one. Calling it
/// again on the same session is a no-op.
pub fn restore_risk_state(risk: &mut RiskManager, session: &Session) {
    risk.initialize_portfolio(session.starting_balance);
    risk.portfolio.balance = session.current_balance;

    risk.portfolio.open_positions = session
        .positions
        .iter()
        .filter(|p| p.is_open())
        .map(|p| OpenPosition {
            trade_id: p.trade_id.clone(),
            market_id: p.market_id.clone(),
            question: p.question.clone(),
            side: p.side,
            entry_price: p.entry_price,
            size_usdc: p.size_usdc,
            entry_time: p.entry_time,
        })
        .collect();

    risk.portfolio.peak_balance = session
        .starting_balance
        .max(risk.portfolio.total_value());

    let now = risk.now();
    let today = now.date_naive();

    risk.daily.trades_today = session
        .positions
        .iter()
        .chain(session.closed_trades.iter())
        .filter(|p| p.entry_time.date_naive() == today)
        .count() as u32;
    risk.daily.daily_pnl = session
        .closed_trades
        .iter()
        .filter(|p| p.exit_time.map(|t| t.date_naive() == today).unwrap_or(false))
        .map(|p| p.pnl)
        .sum();

    // Trailing loss streak decides whether the circuit breaker is still hot.
    let mut closed: Vec<&Position> = session
        .closed_trades
        .iter()
        .filter(|p| p.exit_time.is_some())
        .collect();
    closed.sort_by_key(|p| p.exit_time);
    let mut streak = 0u32;
    let mut newest_loss_exit: Option<DateTime<Utc>> = None;
    for p in closed.iter().rev() {
        if p.pnl < 0.0 {
            streak += 1;
            if newest_loss_exit.is_none() {
                newest_loss_exit = p.exit_time;
            }
        } else {
            break;
        }
    }
    risk.daily.consecutive_losses = streak;
    if streak >= risk.limits().circuit_breaker_losses {
        if let Some(exit) = newest_loss_exit {
            let until = exit + chrono::Duration::minutes(risk.limits().cooldown_minutes);
            if until > now {
                risk.daily.cooldown_until = Some(until);
            }
        }
    }

    // Realized-cash view of the exit ledger
    let mut running = session.starting_balance;
    risk.portfolio.trade_history = closed
        .iter()
        .map(|p| {
            running += p.pnl;
            crate::risk::LedgerEntry {
                identifier: p.trade_id.clone(),
                pnl: p.pnl,
                balance_after: running,
                timestamp: p.exit_time.expect("closed positions carry exit_time"),
            }
        })
        .collect();

    info!(
        session_id = %session.session_id,
        open_positions = risk.portfolio.open_position_count(),
        trades_today = risk.daily.trades_today,
        consecutive_losses = risk.daily.consecutive_losses,
        "Risk state rebuilt from session"
    );
}

const LOAD_ATTEMPTS: u32 = 3;
const LOAD_RETRY_DELAY_MS: u64 = 100;

/// Atomic JSON persistence for one session document
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Persist via write-to-temp + rename.
    pub fn save(&self, session: &Session) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| EngineError::StateCorruption(format!("create {parent:?}: {e}")))?;
        }

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| EngineError::StateCorruption(format!("serialize session: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| EngineError::StateCorruption(format!("write {tmp:?}: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| EngineError::StateCorruption(format!("rename {tmp:?}: {e}")))?;

        info!(path = %self.path.display(), "💾 Session saved");
        Ok(())
    }

    /// Load the session document, if one exists.
    ///
    /// A concurrently running scheduler tick may be mid-rename, so read and
    /// parse failures are retried a bounded number of times before being
    /// treated as corruption.
    pub fn load(&self) -> Result<Option<Session>, EngineError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut last_err = String::new();
        for attempt in 1..=LOAD_ATTEMPTS {
            match fs::read_to_string(&self.path) {
                Ok(raw) => match serde_json::from_str::<Session>(&raw) {
                    Ok(session) => return Ok(Some(session)),
                    Err(e) => last_err = format!("parse: {e}"),
                },
                Err(e) => last_err = format!("read: {e}"),
            }
            warn!(
                path = %self.path.display(),
                attempt,
                error = %last_err,
                "Session load failed, retrying"
            );
            std::thread::sleep(std::time::Duration::from_millis(LOAD_RETRY_DELAY_MS));
        }

        Err(EngineError::StateCorruption(format!(
            "{} after {LOAD_ATTEMPTS} attempts: {last_err}",
            self.path.display()
        )))
    }
}

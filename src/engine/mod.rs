//! Execution engines: backtest, paper, and live share one contract of
//! scan, validate, execute, resolve, persist. This module carries the
//! pieces common to all three.

pub mod backtest;
pub mod live;
pub mod paper;
pub mod session;

use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::data::{compute_indicators, MarketSnapshot};
use crate::exchange::LiveCredentials;
use crate::journal::{CycleSignal, SignalAction};
use crate::risk::{RiskManager, RiskStatus};
use crate::strategy::Strategy;
use crate::types::{Side, TradeSignal};

use session::Session;

/// Environment flag that must be "true" before real orders are possible
pub const LIVE_ENV_FLAG: &str = "POLYMARKET_LIVE_ENABLED";

/// How an engine run is allowed to interact with the world.
///
/// Live trading requires three independent conditions: the configured mode,
/// the environment flag, and a complete credential set. Any failure
/// collapses to `Inert`, so an engine that is "enabled but missing
/// credentials" cannot be represented at all.
#[derive(Debug, Clone)]
pub enum EngineMode {
    /// Status reporting only; every trading entry point declines
    Inert { reason: String },
    Backtest,
    Paper,
    Live(LiveCredentials),
}

impl EngineMode {
    /// Resolve the mode from config and process environment.
    pub fn resolve(cfg: &AppConfig) -> Self {
        Self::resolve_with(cfg, |name| std::env::var(name).ok())
    }

    /// Same, with an injectable environment lookup.
    pub fn resolve_with(
        cfg: &AppConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        match cfg.trading.mode.as_str() {
            "backtest" => EngineMode::Backtest,
            "paper" => EngineMode::Paper,
            "live" => {
                let flag = env(LIVE_ENV_FLAG).unwrap_or_default();
                if flag.to_ascii_lowercase() != "true" {
                    return EngineMode::Inert {
                        reason: format!("set {LIVE_ENV_FLAG}=true to enable live trading"),
                    };
                }

                let require = |name: &str| -> Result<String, String> {
                    match env(name) {
                        Some(v) if !v.trim().is_empty() => Ok(v),
                        _ => Err(format!("missing credential {name}")),
                    }
                };
                let creds = (|| -> Result<LiveCredentials, String> {
                    Ok(LiveCredentials {
                        address: require("POLYMARKET_ADDRESS")?,
                        api_key: require("POLY_API_KEY")?,
                        api_secret: require("POLY_API_SECRET")?,
                        api_passphrase: require("POLY_API_PASSPHRASE")?,
                    })
                })();
                match creds {
                    Ok(creds) => EngineMode::Live(creds),
                    Err(reason) => EngineMode::Inert { reason },
                }
            }
            other => EngineMode::Inert {
                reason: format!("unknown trading mode '{other}'"),
            },
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, EngineMode::Live(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            EngineMode::Inert { .. } => "inert",
            EngineMode::Backtest => "backtest",
            EngineMode::Paper => "paper",
            EngineMode::Live(_) => "live",
        }
    }
}

/// Did this side end up on the winning outcome, given the final YES price?
pub fn side_won(side: Side, final_yes_price: f64) -> bool {
    match side {
        Side::BuyYes => final_yes_price > 0.5,
        Side::BuyNo => final_yes_price < 0.5,
    }
}

/// Accumulates one cycle's journal entries: every signal seen, executed or
/// skipped with its reason. Accepted signals that never execute (capacity,
/// later failure) are downgraded to skips when the cycle finishes.
#[derive(Default)]
pub struct CycleDraft {
    entries: Vec<CycleSignal>,
    pending: Vec<(String, usize)>,
}

impl CycleDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(&mut self, signal: &TradeSignal, reason: String) {
        self.entries.push(CycleSignal {
            market_id: signal.market_id.clone(),
            question: signal.question.clone(),
            side: signal.side,
            edge: signal.edge,
            confidence: signal.confidence,
            action: SignalAction::Skipped,
            skip_reason: Some(reason),
        });
    }

    pub fn accept(&mut self, signal: &TradeSignal) {
        self.entries.push(CycleSignal {
            market_id: signal.market_id.clone(),
            question: signal.question.clone(),
            side: signal.side,
            edge: signal.edge,
            confidence: signal.confidence,
            action: SignalAction::Skipped,
            skip_reason: Some("not executed this cycle".to_string()),
        });
        self.pending
            .push((signal.market_id.clone(), self.entries.len() - 1));
    }

    pub fn mark_executed(&mut self, market_id: &str) {
        if let Some(pos) = self.pending.iter().position(|(m, _)| m == market_id) {
            let (_, idx) = self.pending.remove(pos);
            self.entries[idx].action = SignalAction::Executed;
            self.entries[idx].skip_reason = None;
        }
    }

    pub fn mark_skipped(&mut self, market_id: &str, reason: String) {
        if let Some(pos) = self.pending.iter().position(|(m, _)| m == market_id) {
            let (_, idx) = self.pending.remove(pos);
            self.entries[idx].skip_reason = Some(reason);
        }
    }

    pub fn finish(self) -> Vec<CycleSignal> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared scan pipeline: evaluate every snapshot, drop what the risk
/// manager declines, and record everything in the cycle draft.
pub(crate) fn evaluate_snapshots(
    strategy: &dyn Strategy,
    snapshots: &[MarketSnapshot],
    risk: &mut RiskManager,
    draft: &mut CycleDraft,
) -> Vec<TradeSignal> {
    let mut accepted = Vec::new();
    for snapshot in snapshots {
        let indicators = compute_indicators(snapshot);
        let Some(signal) = strategy.evaluate(snapshot, &indicators) else {
            continue;
        };

        let (allowed, reason) = risk.validate_trade(&signal);
        if allowed {
            draft.accept(&signal);
            accepted.push(signal);
        } else {
            debug!(market_id = %signal.market_id, reason, "Signal rejected by risk manager");
            draft.skip(&signal, reason);
        }
    }
    accepted
}

/// Session plus risk snapshot, as returned by every engine's get_summary
#[derive(Debug, Clone, Serialize)]
pub struct EngineSummary {
    pub session_id: String,
    pub strategy: String,
    pub started: chrono::DateTime<chrono::Utc>,
    pub starting_balance: f64,
    pub current_balance: f64,
    pub total_pnl: f64,
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub open_positions: usize,
    pub risk: RiskStatus,
}

pub(crate) fn summarize(session: &Session, risk: &mut RiskManager) -> EngineSummary {
    EngineSummary {
        session_id: session.session_id.clone(),
        strategy: session.strategy.clone(),
        started: session.started,
        starting_balance: session.starting_balance,
        current_balance: session.current_balance,
        total_pnl: session.total_pnl,
        total_trades: session.total_trades,
        wins: session.wins,
        losses: session.losses,
        win_rate: session.win_rate(),
        open_positions: session.open_position_count(),
        risk: risk.status(),
    }
}

//! Paper trading engine: the live signal pipeline against live market
//! data, with simulated fills and no orders on the wire.
//!
//! Execution books a position at the displayed price through the same
//! sizing path live trading uses. Resolution reads ground truth from the
//! market-data collaborator; nothing is simulated stochastically.

use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::data::DataFeed;
use crate::engine::session::{restore_risk_state, Position, PositionStatus, Session, SessionStore};
use crate::engine::{evaluate_snapshots, side_won, summarize, CycleDraft, EngineSummary};
use crate::error::EngineError;
use crate::journal::{ResolutionRecord, TradeJournal};
use crate::risk::RiskManager;
use crate::strategy::Strategy;
use crate::types::{Side, TradeSignal};

pub struct PaperEngine {
    cfg: AppConfig,
    feed: DataFeed,
    pub risk: RiskManager,
    session: Option<Session>,
    store: SessionStore,
    journal: TradeJournal,
    cycle: Option<CycleDraft>,
}

impl PaperEngine {
    pub fn new(cfg: &AppConfig, feed: DataFeed, risk: RiskManager) -> Self {
        let store = SessionStore::new(
            std::path::PathBuf::from(&cfg.data.dir).join(&cfg.data.paper_session_file),
        );
        let journal = TradeJournal::new(&cfg.journal.dir);
        Self {
            cfg: cfg.clone(),
            feed,
            risk,
            session: None,
            store,
            journal,
            cycle: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Initialize a new paper trading session.
    pub fn start_session(&mut self, strategy_name: &str, balance: f64) {
        self.risk.initialize_portfolio(balance);
        let session = Session::new(strategy_name, balance, self.risk.now());
        info!(
            session_id = %session.session_id,
            strategy = strategy_name,
            balance,
            "Paper trading session started"
        );
        self.session = Some(session);
    }

    /// Resume the persisted session, if any. The risk manager is fully
    /// rebuilt from the session so a resumed process enforces the same
    /// limits a fresh one would.
    pub fn resume_session(&mut self) -> Result<bool, EngineError> {
        let Some(session) = self.store.load()? else {
            return Ok(false);
        };
        restore_risk_state(&mut self.risk, &session);
        info!(session_id = %session.session_id, "Resumed paper session");
        self.session = Some(session);
        Ok(true)
    }

    /// Scan filtered markets and return the signals that pass validation.
    /// Everything seen goes into the pending cycle record.
    pub async fn scan_markets(
        &mut self,
        strategy: &dyn Strategy,
    ) -> Result<Vec<TradeSignal>, EngineError> {
        if self.session.is_none() {
            return Err(EngineError::NoSession);
        }

        let snapshots = self
            .feed
            .all_snapshots(&self.cfg)
            .await
            .map_err(EngineError::external)?;

        let mut draft = self.cycle.take().unwrap_or_default();
        let signals = evaluate_snapshots(strategy, &snapshots, &mut self.risk, &mut draft);
        self.cycle = Some(draft);

        info!(
            signals = signals.len(),
            markets = snapshots.len(),
            "Market scan complete"
        );
        Ok(signals)
    }

    /// Book a simulated fill for a validated signal.
    pub fn execute_signal(&mut self, signal: &TradeSignal) -> Result<Position, EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NoSession)?;

        let (allowed, reason) = self.risk.validate_trade(signal);
        if !allowed {
            warn!(market_id = %signal.market_id, reason, "Paper trade blocked");
            if let Some(draft) = self.cycle.as_mut() {
                draft.mark_skipped(&signal.market_id, reason.clone());
            }
            return Err(EngineError::Rejected(reason));
        }

        if signal.entry_price <= 0.0 {
            return Err(EngineError::Rejected(format!(
                "Entry price {} is not positive",
                signal.entry_price
            )));
        }

        let fee_pct = self.cfg.backtest.fee_pct / 100.0;
        let effective_size = signal.position_size_usdc * (1.0 - fee_pct);
        let shares = effective_size / signal.entry_price;

        let trade_id = format!("PT_{}_{}", session.session_id, session.total_trades + 1);
        let position = Position::from_signal(signal, &trade_id, shares, self.risk.now());

        self.risk.record_trade_entry(signal, &trade_id);
        session.record_entry(position.clone(), self.risk.portfolio.balance);

        if let Some(draft) = self.cycle.as_mut() {
            draft.mark_executed(&signal.market_id);
        }

        info!(
            trade_id,
            side = %signal.side,
            size_usdc = signal.position_size_usdc,
            entry_price = signal.entry_price,
            "Paper trade executed"
        );

        self.store.save(session)?;
        Ok(position)
    }

    /// Check every open position against current market state and settle
    /// the ones whose market has closed. Per-position failures are
    /// isolated: an unreachable market leaves that position open.
    pub async fn check_and_resolve(&mut self) -> Result<Vec<Position>, EngineError> {
        if self.session.is_none() {
            return Ok(Vec::new());
        }

        let open: Vec<(String, String)> = self
            .session
            .as_ref()
            .unwrap()
            .positions
            .iter()
            .filter(|p| p.is_open())
            .map(|p| (p.trade_id.clone(), p.market_id.clone()))
            .collect();

        let mut resolved = Vec::new();
        for (trade_id, market_id) in open {
            let market = match self.feed.market(&market_id).await {
                Ok(market) => market,
                Err(e) => {
                    error!(trade_id, market_id, error = %e, "Market check failed");
                    continue;
                }
            };
            if !market.closed && !market.resolved {
                continue;
            }

            let final_yes = market.yes_price();
            let position = self.settle_position(&trade_id, final_yes)?;
            resolved.push(position);
        }

        if !resolved.is_empty() {
            let session = self.session.as_ref().expect("session checked above");
            self.store.save(session)?;
        }
        Ok(resolved)
    }

    fn settle_position(
        &mut self,
        trade_id: &str,
        final_yes: f64,
    ) -> Result<Position, EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NoSession)?;
        let index = session
            .positions
            .iter()
            .position(|p| p.trade_id == trade_id)
            .ok_or_else(|| {
                EngineError::Invariant(format!("position {trade_id} vanished mid-resolve"))
            })?;

        let (side, shares, size) = {
            let p = &session.positions[index];
            (p.side, p.shares, p.size_usdc)
        };
        let won = side_won(side, final_yes);
        let (status, pnl) = if won {
            (PositionStatus::Won, shares * 1.0 - size)
        } else {
            (PositionStatus::Lost, -size)
        };
        let exit_price = match side {
            Side::BuyYes => final_yes,
            Side::BuyNo => 1.0 - final_yes,
        };

        self.risk.record_trade_exit(trade_id, pnl)?;
        let session = self.session.as_mut().expect("session still present");
        let position = session.settle(
            index,
            status,
            Some(exit_price),
            pnl,
            self.risk.portfolio.balance,
            self.risk.now(),
        );

        self.journal.log_resolution(ResolutionRecord {
            ts: self.risk.now(),
            trade_id: position.trade_id.clone(),
            market_id: position.market_id.clone(),
            question: position.question.clone(),
            strategy: position.strategy.clone(),
            side: position.side,
            entry_price: position.entry_price,
            predicted_prob: position.predicted_prob,
            predicted_edge: position.predicted_edge,
            actual_prob: if won { 1.0 } else { 0.0 },
            outcome: if won { "won" } else { "lost" }.to_string(),
            pnl,
            size_usdc: position.size_usdc,
        });

        info!(
            trade_id = %position.trade_id,
            outcome = if won { "WON" } else { "LOST" },
            pnl,
            "Position resolved"
        );
        Ok(position)
    }

    /// Flush the pending cycle record to the journal.
    pub fn finish_cycle(&mut self) {
        let Some(draft) = self.cycle.take() else {
            return;
        };
        let Some(session) = self.session.as_ref() else {
            return;
        };
        self.journal.log_cycle(
            self.risk.portfolio.balance,
            &session.strategy,
            session.open_position_count(),
            draft.finish(),
        );
    }

    pub fn get_summary(&mut self) -> Result<EngineSummary, EngineError> {
        let session = self.session.as_ref().ok_or(EngineError::NoSession)?;
        Ok(summarize(session, &mut self.risk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Indicators, MarketSnapshot};
    use crate::exchange::{Market, MockMarketData};
    use crate::risk::{RiskLimits, RiskManager};
    use crate::types::SignalMeta;
    use std::sync::Arc;

    struct FixedStrategy;

    impl Strategy for FixedStrategy {
        fn name(&self) -> &str {
            "fixed"
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
                position_size_usdc: 10.0,
                edge: 0.05,
                reason: "test".to_string(),
                meta: SignalMeta::for_strategy("fixed"),
            })
        }
    }

    fn open_market(id: &str, yes: f64) -> Market {
        Market {
            id: id.to_string(),
            question: format!("Q {id}?"),
            active: true,
            closed: false,
            outcome_prices: vec![yes, 1.0 - yes],
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            token_ids: vec![format!("{id}_y"), format!("{id}_n")],
            volume: 60_000.0,
            liquidity: 12_000.0,
            ..Default::default()
        }
    }

    fn closed_market(id: &str, final_yes: f64) -> Market {
        Market {
            closed: true,
            resolved: true,
            outcome_prices: vec![final_yes, 1.0 - final_yes],
            ..open_market(id, final_yes)
        }
    }

    fn test_config(dir: &std::path::Path) -> AppConfig {
        let mut cfg = AppConfig::load(None).unwrap();
        cfg.data.dir = dir.to_string_lossy().to_string();
        cfg.journal.dir = dir.join("journal").to_string_lossy().to_string();
        cfg.backtest.fee_pct = 0.0;
        cfg
    }

    fn engine_with(data: MockMarketData, cfg: &AppConfig) -> PaperEngine {
        let feed = DataFeed::new(Arc::new(data), cfg);
        let risk = RiskManager::new(RiskLimits::from_config(cfg));
        PaperEngine::new(cfg, feed, risk)
    }

    fn signal_for(market_id: &str, entry: f64) -> TradeSignal {
        TradeSignal {
            side: Side::BuyYes,
            market_id: market_id.to_string(),
            question: "Q?".to_string(),
            confidence: 0.7,
            entry_price: entry,
            position_size_usdc: 10.0,
            edge: 0.05,
            reason: "test".to_string(),
            meta: SignalMeta::for_strategy("fixed"),
        }
    }

    #[tokio::test]
    async fn winning_resolution_pays_out_shares() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let mut data = MockMarketData::new();
        data.expect_get_market()
            .returning(|id| Ok(closed_market(id, 0.97)));
        let mut engine = engine_with(data, &cfg);

        engine.start_session("fixed", 1000.0);
        let pos = engine.execute_signal(&signal_for("m1", 0.50)).unwrap();
        assert!((pos.shares - 20.0).abs() < 1e-9);
        assert_eq!(engine.risk.portfolio.balance, 990.0);

        let resolved = engine.check_and_resolve().await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, PositionStatus::Won);
        assert!((resolved[0].pnl - 10.0).abs() < 1e-9);
        assert!((engine.risk.portfolio.balance - 1010.0).abs() < 1e-9);

        let summary = engine.get_summary().unwrap();
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.open_positions, 0);
        assert!((summary.current_balance - 1010.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn losing_resolution_burns_the_stake() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let mut data = MockMarketData::new();
        data.expect_get_market()
            .returning(|id| Ok(closed_market(id, 0.03)));
        let mut engine = engine_with(data, &cfg);

        engine.start_session("fixed", 1000.0);
        engine.execute_signal(&signal_for("m1", 0.50)).unwrap();

        let resolved = engine.check_and_resolve().await.unwrap();
        assert_eq!(resolved[0].status, PositionStatus::Lost);
        assert!((resolved[0].pnl + 10.0).abs() < 1e-9);
        assert!((engine.risk.portfolio.balance - 990.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unreachable_market_leaves_position_open() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let mut data = MockMarketData::new();
        data.expect_get_market()
            .returning(|_| Err(anyhow::anyhow!("gamma is down")));
        let mut engine = engine_with(data, &cfg);

        engine.start_session("fixed", 1000.0);
        engine.execute_signal(&signal_for("m1", 0.50)).unwrap();

        let resolved = engine.check_and_resolve().await.unwrap();
        assert!(resolved.is_empty());
        assert_eq!(engine.session().unwrap().open_position_count(), 1);
    }

    #[tokio::test]
    async fn scan_validates_and_journals_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let mut data = MockMarketData::new();
        data.expect_get_markets().returning(|_| {
            Ok(vec![open_market("m1", 0.55), open_market("m2", 0.60)])
        });
        let mut engine = engine_with(data, &cfg);

        engine.start_session("fixed", 1000.0);
        let signals = engine.scan_markets(&FixedStrategy).await.unwrap();
        assert_eq!(signals.len(), 2);

        engine.execute_signal(&signals[0]).unwrap();
        engine.finish_cycle();

        let journal = TradeJournal::new(&cfg.journal.dir);
        let records = journal.read_days(1);
        assert_eq!(records.len(), 1);
        match &records[0] {
            crate::journal::JournalRecord::Cycle { signals, .. } => {
                assert_eq!(signals.len(), 2);
                let executed = signals
                    .iter()
                    .filter(|s| s.action == crate::journal::SignalAction::Executed)
                    .count();
                assert_eq!(executed, 1);
            }
            _ => panic!("expected a cycle record"),
        }
    }

    #[tokio::test]
    async fn resume_rebuilds_the_open_position_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());

        {
            let data = MockMarketData::new();
            let mut engine = engine_with(data, &cfg);
            engine.start_session("fixed", 1000.0);
            engine.execute_signal(&signal_for("m1", 0.50)).unwrap();
        }

        let data = MockMarketData::new();
        let mut engine = engine_with(data, &cfg);
        assert!(engine.resume_session().unwrap());
        assert_eq!(engine.risk.portfolio.open_position_count(), 1);
        assert_eq!(engine.risk.portfolio.balance, 990.0);

        // A duplicate signal for the same market is still rejected
        let (allowed, reason) = engine.risk.validate_trade(&signal_for("m1", 0.50));
        assert!(!allowed);
        assert!(reason.contains("Already have position"));
    }

    #[tokio::test]
    async fn execute_without_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let mut engine = engine_with(MockMarketData::new(), &cfg);
        let err = engine.execute_signal(&signal_for("m1", 0.50)).unwrap_err();
        assert!(matches!(err, EngineError::NoSession));
    }
}

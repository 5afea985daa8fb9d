//! Live trading engine, locked behind three independent safety gates.
//!
//! Real orders require the configured "live" mode, the environment enable
//! flag, and a complete credential set. If any gate fails the engine is
//! fully inert: it can report status and scan, but every trading entry
//! point declines with the gate's reason. This is deliberate and shows up
//! in logs and the journal, never as a crash.
//!
//! A position is booked as open on any non-error order acknowledgement;
//! the engine does not distinguish a resting order from a fill.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::data::DataFeed;
use crate::engine::session::{restore_risk_state, Position, PositionStatus, Session, SessionStore};
use crate::engine::{
    evaluate_snapshots, side_won, summarize, CycleDraft, EngineMode, EngineSummary,
};
use crate::error::EngineError;
use crate::exchange::{OrderApi, OrderRequest, OrderSide, TimeInForce};
use crate::journal::{ResolutionRecord, TradeJournal};
use crate::notify::TelegramNotifier;
use crate::risk::RiskManager;
use crate::strategy::Strategy;
use crate::types::{Side, TradeSignal};

/// Round a price onto the market's tick grid and keep it strictly inside
/// the book's valid range.
fn align_to_tick(price: f64, tick: f64) -> f64 {
    let tick = tick.max(0.0001);
    let aligned = (price / tick).round() * tick;
    aligned.clamp(tick, 1.0 - tick)
}

pub struct LiveEngine {
    mode: EngineMode,
    cfg: AppConfig,
    feed: DataFeed,
    orders: Arc<dyn OrderApi>,
    pub risk: RiskManager,
    session: Option<Session>,
    store: SessionStore,
    journal: TradeJournal,
    notifier: TelegramNotifier,
    cycle: Option<CycleDraft>,
}

impl LiveEngine {
    pub fn new(
        cfg: &AppConfig,
        mode: EngineMode,
        feed: DataFeed,
        orders: Arc<dyn OrderApi>,
        risk: RiskManager,
        notifier: TelegramNotifier,
    ) -> Self {
        match &mode {
            EngineMode::Live(_) => {
                warn!("LIVE TRADING ENABLED: real money at risk, kill switch available");
            }
            EngineMode::Inert { reason } => {
                info!(reason = %reason, "Live engine constructed inert");
            }
            other => {
                info!(mode = other.label(), "Live engine constructed without live mode");
            }
        }
        let store = SessionStore::new(
            std::path::PathBuf::from(&cfg.data.dir).join(&cfg.data.live_session_file),
        );
        let journal = TradeJournal::new(&cfg.journal.dir);
        Self {
            mode,
            cfg: cfg.clone(),
            feed,
            orders,
            risk,
            session: None,
            store,
            journal,
            notifier,
            cycle: None,
        }
    }

    pub fn mode(&self) -> &EngineMode {
        &self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.mode.is_live()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        match &self.mode {
            EngineMode::Live(_) => Ok(()),
            EngineMode::Inert { reason } => Err(EngineError::Rejected(format!(
                "Live trading disabled: {reason}"
            ))),
            other => Err(EngineError::Rejected(format!(
                "Live trading disabled: engine mode is {}",
                other.label()
            ))),
        }
    }

    pub fn start_session(&mut self, strategy_name: &str, balance: f64) {
        self.risk.initialize_portfolio(balance);
        let session = Session::new(strategy_name, balance, self.risk.now());
        info!(
            session_id = %session.session_id,
            strategy = strategy_name,
            balance,
            "Live trading session started"
        );
        self.session = Some(session);
    }

    pub fn resume_session(&mut self) -> Result<bool, EngineError> {
        let Some(session) = self.store.load()? else {
            return Ok(false);
        };
        restore_risk_state(&mut self.risk, &session);
        info!(session_id = %session.session_id, "Resumed live session");
        self.session = Some(session);
        Ok(true)
    }

    /// Scan markets through the shared pipeline. Scanning is read-only and
    /// works even when the engine is inert.
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
            "Live market scan complete"
        );
        Ok(signals)
    }

    /// Resolve the outcome token for a signal. Short-lived markets carry a
    /// pre-resolved token id on the signal; standard binaries are looked
    /// up by side on the fetched market.
    async fn resolve_token(&self, signal: &TradeSignal) -> Result<String, EngineError> {
        if let Some(token) = &signal.meta.token_id {
            return Ok(token.clone());
        }
        let market = self
            .feed
            .market(&signal.market_id)
            .await
            .map_err(EngineError::external)?;
        market
            .token_for_side(signal.side)
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::Rejected(format!(
                    "No outcome token for {} on market {}",
                    signal.side, signal.market_id
                ))
            })
    }

    /// Submit a good-till-cancelled limit buy for a validated signal and
    /// book the position on acknowledgement.
    pub async fn execute_signal(&mut self, signal: &TradeSignal) -> Result<Position, EngineError> {
        self.ensure_live()?;
        if self.session.is_none() {
            return Err(EngineError::NoSession);
        }

        let (allowed, reason) = self.risk.validate_trade(signal);
        if !allowed {
            warn!(market_id = %signal.market_id, reason, "Live trade blocked");
            if let Some(draft) = self.cycle.as_mut() {
                draft.mark_skipped(&signal.market_id, reason.clone());
            }
            return Err(EngineError::Rejected(reason));
        }

        if signal.position_size_usdc < self.cfg.trading.min_order_usdc {
            return Err(EngineError::Rejected(format!(
                "Order below exchange minimum (${:.2} < ${:.2})",
                signal.position_size_usdc, self.cfg.trading.min_order_usdc
            )));
        }

        let token_id = self.resolve_token(signal).await?;
        let tick = self
            .orders
            .get_tick_size(&token_id)
            .await
            .map_err(EngineError::external)?;
        let price = align_to_tick(signal.entry_price, tick);
        let shares = signal.position_size_usdc / price;

        // Informational; the exchange charges what it charges.
        if let Ok(fee_rate) = self.orders.get_fee_rate(&token_id).await {
            info!(token_id = %token_id, fee_rate, "Fee rate at entry");
        }

        let request = OrderRequest {
            token_id: token_id.clone(),
            side: OrderSide::Buy,
            price,
            shares,
            client_id: Uuid::new_v4().to_string(),
            time_in_force: TimeInForce::Gtc,
        };
        let ack = self
            .orders
            .submit_order(&request)
            .await
            .map_err(|e| {
                error!(market_id = %signal.market_id, error = %e, "Order submission failed");
                EngineError::external(e)
            })?;

        info!(
            order_id = %ack.order_id,
            status = %ack.status,
            price,
            shares,
            "Order acknowledged"
        );

        let session = self.session.as_mut().expect("session checked above");
        let trade_id = format!("LV_{}_{}", session.session_id, session.total_trades + 1);
        let mut position = Position::from_signal(signal, &trade_id, shares, self.risk.now());
        position.entry_price = price;
        position.token_id = Some(token_id);

        self.risk.record_trade_entry(signal, &trade_id);
        let session = self.session.as_mut().expect("session checked above");
        session.record_entry(position.clone(), self.risk.portfolio.balance);

        if let Some(draft) = self.cycle.as_mut() {
            draft.mark_executed(&signal.market_id);
        }

        self.store.save(self.session.as_ref().unwrap())?;
        self.notifier.send_trade_alert("LIVE ENTRY", signal).await;
        Ok(position)
    }

    /// Early exit: SELL mirror of execute, settling the position as sold.
    pub async fn sell_position(
        &mut self,
        trade_id: &str,
        price: f64,
    ) -> Result<Position, EngineError> {
        self.ensure_live()?;
        let session = self.session.as_ref().ok_or(EngineError::NoSession)?;

        let position = session
            .positions
            .iter()
            .find(|p| p.trade_id == trade_id && p.is_open())
            .ok_or_else(|| {
                EngineError::Rejected(format!("No open position with trade id {trade_id}"))
            })?;
        let token_id = position.token_id.clone().ok_or_else(|| {
            EngineError::Invariant(format!("live position {trade_id} has no token id"))
        })?;
        let shares = position.shares;
        let size = position.size_usdc;

        let tick = self
            .orders
            .get_tick_size(&token_id)
            .await
            .map_err(EngineError::external)?;
        let sell_price = align_to_tick(price, tick);

        let request = OrderRequest {
            token_id,
            side: OrderSide::Sell,
            price: sell_price,
            shares,
            client_id: Uuid::new_v4().to_string(),
            time_in_force: TimeInForce::Gtc,
        };
        let ack = self
            .orders
            .submit_order(&request)
            .await
            .map_err(EngineError::external)?;
        info!(order_id = %ack.order_id, sell_price, shares, "Sell order acknowledged");

        let pnl = shares * sell_price - size;
        let position = self.settle(trade_id, PositionStatus::Sold, sell_price, pnl)?;
        self.store.save(self.session.as_ref().unwrap())?;
        self.notifier.send_resolution(&position).await;
        Ok(position)
    }

    /// Settle every open position whose market has closed, journaling a
    /// calibration record for each. Per-position failures are isolated.
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
            let session = self.session.as_ref().unwrap();
            let Some(position) = session.positions.iter().find(|p| p.trade_id == trade_id)
            else {
                continue;
            };
            let won = side_won(position.side, final_yes);
            let (status, pnl) = if won {
                (PositionStatus::Won, position.shares * 1.0 - position.size_usdc)
            } else {
                (PositionStatus::Lost, -position.size_usdc)
            };
            let exit_price = match position.side {
                Side::BuyYes => final_yes,
                Side::BuyNo => 1.0 - final_yes,
            };

            let position = self.settle(&trade_id, status, exit_price, pnl)?;
            self.notifier.send_resolution(&position).await;
            resolved.push(position);
        }

        if !resolved.is_empty() {
            self.store.save(self.session.as_ref().unwrap())?;
        }
        Ok(resolved)
    }

    /// One settlement path for resolutions and sales: risk exit, session
    /// aggregates, and the journal's calibration record, exactly once.
    fn settle(
        &mut self,
        trade_id: &str,
        status: PositionStatus,
        exit_price: f64,
        pnl: f64,
    ) -> Result<Position, EngineError> {
        self.risk.record_trade_exit(trade_id, pnl)?;

        let session = self.session.as_mut().ok_or(EngineError::NoSession)?;
        let index = session
            .positions
            .iter()
            .position(|p| p.trade_id == trade_id)
            .ok_or_else(|| {
                EngineError::Invariant(format!("position {trade_id} vanished mid-settle"))
            })?;
        let position = session.settle(
            index,
            status,
            Some(exit_price),
            pnl,
            self.risk.portfolio.balance,
            self.risk.now(),
        );

        let won = matches!(status, PositionStatus::Won)
            || (status == PositionStatus::Sold && pnl > 0.0);
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
            outcome: match status {
                PositionStatus::Won => "won",
                PositionStatus::Lost => "lost",
                PositionStatus::Sold => "sold",
                PositionStatus::Open => unreachable!(),
            }
            .to_string(),
            pnl,
            size_usdc: position.size_usdc,
        });

        info!(
            trade_id = %position.trade_id,
            status = ?position.status,
            pnl,
            "Live position settled"
        );
        Ok(position)
    }

    /// Operator-invoked cancel of every resting order. Nothing in the
    /// monitoring loop calls this automatically.
    pub async fn cancel_all_orders(&mut self) -> Result<Vec<String>, EngineError> {
        self.ensure_live()?;
        let cancelled = self
            .orders
            .cancel_all()
            .await
            .map_err(EngineError::external)?;
        warn!(count = cancelled.len(), "Cancelled all open orders");
        Ok(cancelled)
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
    use crate::exchange::{
        LiveCredentials, Market, MockMarketData, MockOrderApi, OrderAck,
    };
    use crate::journal::JournalRecord;
    use crate::risk::{RiskLimits, RiskManager};
    use crate::types::SignalMeta;

    fn creds() -> LiveCredentials {
        LiveCredentials {
            address: "0xabc".to_string(),
            api_key: "key".to_string(),
            api_secret: "c2VjcmV0".to_string(),
            api_passphrase: "pass".to_string(),
        }
    }

    fn test_config(dir: &std::path::Path) -> AppConfig {
        let mut cfg = AppConfig::load(None).unwrap();
        cfg.trading.mode = "live".to_string();
        cfg.data.dir = dir.to_string_lossy().to_string();
        cfg.journal.dir = dir.join("journal").to_string_lossy().to_string();
        cfg
    }

    fn engine_with(
        cfg: &AppConfig,
        mode: EngineMode,
        data: MockMarketData,
        orders: MockOrderApi,
    ) -> LiveEngine {
        let feed = DataFeed::new(Arc::new(data), cfg);
        let risk = RiskManager::new(RiskLimits::from_config(cfg));
        LiveEngine::new(
            cfg,
            mode,
            feed,
            Arc::new(orders),
            risk,
            TelegramNotifier::disabled(),
        )
    }

    fn signal(market_id: &str, entry: f64) -> TradeSignal {
        TradeSignal {
            side: Side::BuyYes,
            market_id: market_id.to_string(),
            question: "Q?".to_string(),
            confidence: 0.7,
            entry_price: entry,
            position_size_usdc: 10.0,
            edge: 0.05,
            reason: "test".to_string(),
            meta: SignalMeta::for_strategy("value_betting"),
        }
    }

    fn binary_market(id: &str, yes: f64, closed: bool) -> Market {
        Market {
            id: id.to_string(),
            question: format!("Q {id}?"),
            active: !closed,
            closed,
            resolved: closed,
            outcome_prices: vec![yes, 1.0 - yes],
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            token_ids: vec![format!("{id}_y"), format!("{id}_n")],
            volume: 60_000.0,
            liquidity: 12_000.0,
            ..Default::default()
        }
    }

    fn happy_orders() -> MockOrderApi {
        let mut orders = MockOrderApi::new();
        orders.expect_get_tick_size().returning(|_| Ok(0.01));
        orders.expect_get_fee_rate().returning(|_| Ok(0.0));
        orders.expect_submit_order().returning(|_| {
            Ok(OrderAck {
                order_id: "ord_1".to_string(),
                status: "live".to_string(),
            })
        });
        orders
    }

    #[tokio::test]
    async fn inert_engine_refuses_every_trading_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let mode = EngineMode::Inert {
            reason: "set POLYMARKET_LIVE_ENABLED=true to enable live trading".to_string(),
        };
        let mut engine = engine_with(&cfg, mode, MockMarketData::new(), MockOrderApi::new());
        engine.start_session("value_betting", 100.0);

        let err = engine.execute_signal(&signal("m1", 0.50)).await.unwrap_err();
        assert!(matches!(err, EngineError::Rejected(ref r) if r.contains("disabled")));

        let err = engine.sell_position("t1", 0.5).await.unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));

        let err = engine.cancel_all_orders().await.unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));

        // Status reporting still works
        assert!(!engine.is_enabled());
        assert!(engine.get_summary().is_ok());
    }

    #[tokio::test]
    async fn execute_uses_preresolved_token_and_tick_aligned_price() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());

        let mut orders = MockOrderApi::new();
        orders.expect_get_tick_size().returning(|_| Ok(0.01));
        orders.expect_get_fee_rate().returning(|_| Ok(0.0));
        orders
            .expect_submit_order()
            .withf(|req| {
                req.token_id == "fast_token"
                    && req.side == OrderSide::Buy
                    && (req.price - 0.51).abs() < 1e-9
                    && req.time_in_force == TimeInForce::Gtc
            })
            .returning(|_| {
                Ok(OrderAck {
                    order_id: "ord_1".to_string(),
                    status: "live".to_string(),
                })
            });

        // No market-data expectations: the pre-resolved path must not fetch
        let mut engine = engine_with(
            &cfg,
            EngineMode::Live(creds()),
            MockMarketData::new(),
            orders,
        );
        engine.start_session("value_betting", 1000.0);

        let mut sig = signal("m1", 0.507);
        sig.meta.token_id = Some("fast_token".to_string());
        let position = engine.execute_signal(&sig).await.unwrap();

        assert_eq!(position.token_id.as_deref(), Some("fast_token"));
        assert!((position.entry_price - 0.51).abs() < 1e-9);
        assert!((position.shares - 10.0 / 0.51).abs() < 1e-9);
        assert_eq!(engine.risk.portfolio.balance, 990.0);
    }

    #[tokio::test]
    async fn execute_looks_up_token_by_side_for_standard_binaries() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());

        let mut data = MockMarketData::new();
        data.expect_get_market()
            .returning(|id| Ok(binary_market(id, 0.40, false)));

        let mut orders = MockOrderApi::new();
        orders.expect_get_tick_size().returning(|_| Ok(0.01));
        orders.expect_get_fee_rate().returning(|_| Ok(0.0));
        orders
            .expect_submit_order()
            .withf(|req| req.token_id == "m1_n")
            .returning(|_| {
                Ok(OrderAck {
                    order_id: "ord_2".to_string(),
                    status: "live".to_string(),
                })
            });

        let mut engine = engine_with(&cfg, EngineMode::Live(creds()), data, orders);
        engine.start_session("value_betting", 1000.0);

        let mut sig = signal("m1", 0.60);
        sig.side = Side::BuyNo;
        engine.execute_signal(&sig).await.unwrap();
    }

    #[tokio::test]
    async fn extreme_prices_clamp_inside_the_book() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());

        let mut orders = MockOrderApi::new();
        orders.expect_get_tick_size().returning(|_| Ok(0.01));
        orders.expect_get_fee_rate().returning(|_| Ok(0.0));
        orders
            .expect_submit_order()
            .withf(|req| (req.price - 0.99).abs() < 1e-9)
            .returning(|_| {
                Ok(OrderAck {
                    order_id: "ord_3".to_string(),
                    status: "live".to_string(),
                })
            });

        let mut engine = engine_with(
            &cfg,
            EngineMode::Live(creds()),
            MockMarketData::new(),
            orders,
        );
        engine.start_session("value_betting", 1000.0);

        let mut sig = signal("m1", 0.998);
        sig.meta.token_id = Some("tok".to_string());
        engine.execute_signal(&sig).await.unwrap();
    }

    #[tokio::test]
    async fn order_error_books_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());

        let mut orders = MockOrderApi::new();
        orders.expect_get_tick_size().returning(|_| Ok(0.01));
        orders.expect_get_fee_rate().returning(|_| Ok(0.0));
        orders
            .expect_submit_order()
            .returning(|_| Err(anyhow::anyhow!("insufficient allowance")));

        let mut engine = engine_with(
            &cfg,
            EngineMode::Live(creds()),
            MockMarketData::new(),
            orders,
        );
        engine.start_session("value_betting", 1000.0);

        let mut sig = signal("m1", 0.50);
        sig.meta.token_id = Some("tok".to_string());
        let err = engine.execute_signal(&sig).await.unwrap_err();
        assert!(matches!(err, EngineError::External(_)));
        assert_eq!(engine.risk.portfolio.balance, 1000.0);
        assert_eq!(engine.session().unwrap().total_trades, 0);
    }

    #[tokio::test]
    async fn sub_minimum_orders_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path());
        cfg.trading.min_order_usdc = 5.0;
        cfg.trading.min_position_usdc = 0.5;

        let mut engine = engine_with(
            &cfg,
            EngineMode::Live(creds()),
            MockMarketData::new(),
            MockOrderApi::new(),
        );
        engine.start_session("value_betting", 1000.0);

        let mut sig = signal("m1", 0.50);
        sig.position_size_usdc = 2.0;
        sig.meta.token_id = Some("tok".to_string());
        let err = engine.execute_signal(&sig).await.unwrap_err();
        assert!(matches!(err, EngineError::Rejected(ref r) if r.contains("minimum")));
    }

    #[tokio::test]
    async fn sell_position_mirrors_resolution_bookkeeping() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());

        let mut engine = engine_with(
            &cfg,
            EngineMode::Live(creds()),
            MockMarketData::new(),
            happy_orders(),
        );
        engine.start_session("value_betting", 1000.0);

        let mut sig = signal("m1", 0.50);
        sig.meta.token_id = Some("tok".to_string());
        let position = engine.execute_signal(&sig).await.unwrap();
        let shares = position.shares;

        let sold = engine.sell_position(&position.trade_id, 0.60).await.unwrap();
        assert_eq!(sold.status, PositionStatus::Sold);
        let expected_pnl = shares * 0.60 - 10.0;
        assert!((sold.pnl - expected_pnl).abs() < 1e-9);
        assert_eq!(engine.session().unwrap().open_position_count(), 0);
        assert!(
            (engine.risk.portfolio.balance - (990.0 + 10.0 + expected_pnl)).abs() < 1e-9
        );
    }

    #[tokio::test]
    async fn resolution_emits_a_calibration_record() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());

        let mut data = MockMarketData::new();
        data.expect_get_market()
            .returning(|id| Ok(binary_market(id, 0.97, true)));

        let mut engine = engine_with(&cfg, EngineMode::Live(creds()), data, happy_orders());
        engine.start_session("value_betting", 1000.0);

        let mut sig = signal("m1", 0.50);
        sig.meta.token_id = Some("tok".to_string());
        sig.meta.estimated_prob = Some(0.55);
        engine.execute_signal(&sig).await.unwrap();

        let resolved = engine.check_and_resolve().await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].status, PositionStatus::Won);

        let journal = TradeJournal::new(&cfg.journal.dir);
        let resolutions: Vec<_> = journal
            .read_days(1)
            .into_iter()
            .filter_map(|r| match r {
                JournalRecord::Resolution(res) => Some(res),
                _ => None,
            })
            .collect();
        assert_eq!(resolutions.len(), 1);
        assert!((resolutions[0].predicted_prob - 0.55).abs() < 1e-9);
        assert_eq!(resolutions[0].outcome, "won");
        assert_eq!(resolutions[0].actual_prob, 1.0);
    }
}

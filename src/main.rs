//! PolyTrader CLI: one trading cycle per invocation.
//!
//! Each command builds the matching engine from config and runs a single
//! scan / execute / resolve pass; an external scheduler provides the
//! cadence.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use polytrader::config::AppConfig;
use polytrader::data::DataFeed;
use polytrader::engine::backtest::BacktestEngine;
use polytrader::engine::live::LiveEngine;
use polytrader::engine::paper::PaperEngine;
use polytrader::engine::{EngineMode, EngineSummary};
use polytrader::error::EngineError;
use polytrader::exchange::client::PolymarketClient;
use polytrader::exchange::MarketData;
use polytrader::journal::TradeJournal;
use polytrader::notify::TelegramNotifier;
use polytrader::risk::RiskManager;
use polytrader::strategy;
use polytrader::types::TradeSignal;

#[derive(Parser)]
#[command(name = "polytrader")]
#[command(about = "Risk-gated trading engine for Polymarket prediction markets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to config/default + config/local)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the active strategy
    #[arg(short, long)]
    strategy: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one paper trading cycle (simulated fills, live data)
    Paper,
    /// Run one live trading cycle (real money, requires all safety gates)
    Live,
    /// Run one live-pipeline cycle over short-lived event markets
    Fast,
    /// Run a backtest over the collected snapshot corpus
    Backtest {
        /// Seed for the outcome simulation
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Collect market snapshots into the backtest corpus
    Collect,
    /// Cancel every resting order (live mode only, operator-invoked)
    CancelAll,
    /// Show engine mode, session, and risk status
    Status,
    /// Journal accuracy statistics over a trailing window
    Stats {
        /// Trailing window in days
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    if let Some(strategy) = cli.strategy {
        cfg.strategy.active = strategy;
    }

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        cfg.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(digest = %cfg.digest(), "PolyTrader starting");

    match cli.command {
        Commands::Paper => run_paper(&cfg).await,
        Commands::Live => run_live(&cfg, false).await,
        Commands::Fast => run_live(&cfg, true).await,
        Commands::Backtest { seed } => run_backtest(&cfg, seed),
        Commands::Collect => run_collect(&cfg).await,
        Commands::CancelAll => run_cancel_all(&cfg).await,
        Commands::Status => run_status(&cfg).await,
        Commands::Stats { days } => run_stats(&cfg, days),
    }
}

fn sort_by_confidence(signals: &mut [TradeSignal]) {
    signals.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
}

fn print_summary(summary: &EngineSummary) {
    println!("{}", "=".repeat(50));
    println!("  Session: {}", summary.session_id);
    println!("  Strategy: {}", summary.strategy);
    println!("  Balance: ${:.2}", summary.current_balance);
    println!("  PnL: ${:+.2}", summary.total_pnl);
    println!(
        "  Trades: {} (W:{} L:{})",
        summary.total_trades, summary.wins, summary.losses
    );
    println!("  Win Rate: {:.1}%", summary.win_rate * 100.0);
    println!("  Open: {}", summary.open_positions);
    println!(
        "  Can Trade: {} ({})",
        summary.risk.can_trade, summary.risk.reason
    );
    println!("{}", "=".repeat(50));
}

async fn run_paper(cfg: &AppConfig) -> Result<()> {
    let client = Arc::new(PolymarketClient::new(&cfg.exchange, None)?);
    let feed = DataFeed::new(client, cfg);
    let risk = RiskManager::from_config(cfg);
    let mut engine = PaperEngine::new(cfg, feed, risk);

    if engine.resume_session()? {
        println!(
            "Resumed paper session: {}",
            engine.session().expect("resumed").session_id
        );
    } else {
        let balance = cfg.backtest.starting_balance_usdc;
        engine.start_session(&cfg.strategy.active, balance);
        println!("Started new paper session with ${balance:.2}");
    }

    let strategy = strategy::build(&cfg.strategy.active, cfg)?;
    let mut signals = engine.scan_markets(strategy.as_ref()).await?;
    sort_by_confidence(&mut signals);

    if signals.is_empty() {
        println!("No trade signals found.");
    } else {
        println!("Found {} signals:", signals.len());
        for (i, sig) in signals.iter().enumerate() {
            println!("  {}. {sig}", i + 1);
        }

        let open = engine.session().map(|s| s.open_position_count()).unwrap_or(0);
        let headroom = cfg.trading.max_open_positions.saturating_sub(open);
        let mut executed = 0;
        for sig in signals.iter().take(headroom) {
            match engine.execute_signal(sig) {
                Ok(position) => {
                    executed += 1;
                    println!(
                        "  executed {} | {} @ {:.3}",
                        position.trade_id, position.side, position.entry_price
                    );
                }
                Err(EngineError::Rejected(reason)) => {
                    println!("  skipped {} | {reason}", sig.market_id);
                }
                Err(e) => return Err(e).context("paper execution failed"),
            }
        }
        println!("Executed {executed} paper trades.");
    }

    let resolved = engine.check_and_resolve().await?;
    for position in &resolved {
        println!(
            "  resolved {}: {:?} (${:+.2})",
            position.trade_id, position.status, position.pnl
        );
    }
    engine.finish_cycle();

    print_summary(&engine.get_summary()?);
    Ok(())
}

async fn run_live(cfg: &AppConfig, fast_markets: bool) -> Result<()> {
    let mode = EngineMode::resolve(cfg);
    let credentials = match &mode {
        EngineMode::Live(creds) => Some(creds.clone()),
        _ => None,
    };

    let client = Arc::new(PolymarketClient::new(&cfg.exchange, credentials)?);
    let feed = DataFeed::new(client.clone(), cfg);
    let risk = RiskManager::from_config(cfg);
    let notifier = TelegramNotifier::from_env(cfg.notifications.telegram_enabled);
    let mut engine = LiveEngine::new(cfg, mode, feed, client.clone(), risk, notifier);

    if let EngineMode::Inert { reason } = engine.mode() {
        println!("Live trading is INERT: {reason}");
        println!("The cycle will scan and report only.");
    }

    if engine.resume_session()? {
        println!(
            "Resumed live session: {}",
            engine.session().expect("resumed").session_id
        );
    } else {
        let balance = cfg.backtest.starting_balance_usdc;
        engine.start_session(&cfg.strategy.active, balance);
        println!("Started new live session with ${balance:.2}");
    }

    let strategy = strategy::build(&cfg.strategy.active, cfg)?;
    let mut signals = engine.scan_markets(strategy.as_ref()).await?;
    sort_by_confidence(&mut signals);

    // Short-lived event markets: resolve the outcome token once, up front,
    // so execution does not need another market fetch at order time.
    if fast_markets {
        for sig in &mut signals {
            if sig.meta.token_id.is_some() {
                continue;
            }
            if let Ok(market) = client.get_market(&sig.market_id).await {
                sig.meta.token_id = market.token_for_side(sig.side).map(str::to_string);
            }
        }
    }

    if signals.is_empty() {
        println!("No trade signals found.");
    } else {
        println!("Found {} signals:", signals.len());
        let open = engine.session().map(|s| s.open_position_count()).unwrap_or(0);
        let headroom = cfg.trading.max_open_positions.saturating_sub(open);
        for sig in signals.iter().take(headroom) {
            match engine.execute_signal(sig).await {
                Ok(position) => println!(
                    "  executed {} | {} @ {:.3}",
                    position.trade_id, position.side, position.entry_price
                ),
                Err(EngineError::Rejected(reason)) => {
                    println!("  skipped {} | {reason}", sig.market_id)
                }
                Err(e) => println!("  failed {} | {e}", sig.market_id),
            }
        }
    }

    let resolved = engine.check_and_resolve().await?;
    for position in &resolved {
        println!(
            "  resolved {}: {:?} (${:+.2})",
            position.trade_id, position.status, position.pnl
        );
    }
    engine.finish_cycle();

    print_summary(&engine.get_summary()?);
    Ok(())
}

fn run_backtest(cfg: &AppConfig, seed: Option<u64>) -> Result<()> {
    // The corpus is already on disk; no client needed.
    struct NoMarketData;
    #[async_trait::async_trait]
    impl MarketData for NoMarketData {
        async fn get_markets(&self, _limit: usize) -> Result<Vec<polytrader::exchange::Market>> {
            anyhow::bail!("backtest runs offline")
        }
        async fn get_market(&self, _id: &str) -> Result<polytrader::exchange::Market> {
            anyhow::bail!("backtest runs offline")
        }
    }

    let feed = DataFeed::new(Arc::new(NoMarketData), cfg);
    let snapshots = feed.load_snapshots()?;
    if snapshots.is_empty() {
        println!("No historical data found. Run 'collect' first to gather snapshots.");
        return Ok(());
    }

    let strategy = strategy::build(&cfg.strategy.active, cfg)?;
    let engine = BacktestEngine::new(cfg);
    let seed = seed.unwrap_or(cfg.backtest.seed);

    println!(
        "Running backtest: {} on {} snapshots (seed {seed})...",
        cfg.strategy.active,
        snapshots.len()
    );
    let result = engine.run(strategy.as_ref(), &snapshots, seed);
    println!("{}", result.summary());

    let path = engine.save_results(&result)?;
    println!("Results saved to {}", path.display());
    Ok(())
}

async fn run_collect(cfg: &AppConfig) -> Result<()> {
    let client = Arc::new(PolymarketClient::new(&cfg.exchange, None)?);
    let feed = DataFeed::new(client, cfg);

    println!("Collecting market snapshots...");
    let snapshots = feed.all_snapshots(cfg).await?;
    if snapshots.is_empty() {
        println!("No markets found matching filters.");
        return Ok(());
    }

    feed.save_snapshots(&snapshots)?;
    println!("Collected {} market snapshots.", snapshots.len());
    println!("Run 'collect' periodically to build history for backtesting.");
    Ok(())
}

async fn run_cancel_all(cfg: &AppConfig) -> Result<()> {
    let mode = EngineMode::resolve(cfg);
    let credentials = match &mode {
        EngineMode::Live(creds) => Some(creds.clone()),
        _ => None,
    };

    let client = Arc::new(PolymarketClient::new(&cfg.exchange, credentials)?);
    let feed = DataFeed::new(client.clone(), cfg);
    let mut engine = LiveEngine::new(
        cfg,
        mode,
        feed,
        client,
        RiskManager::from_config(cfg),
        TelegramNotifier::disabled(),
    );

    match engine.cancel_all_orders().await {
        Ok(cancelled) => println!("Cancelled {} open orders.", cancelled.len()),
        Err(EngineError::Rejected(reason)) => println!("Refused: {reason}"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn run_status(cfg: &AppConfig) -> Result<()> {
    let client = Arc::new(PolymarketClient::new(&cfg.exchange, None)?);
    let feed = DataFeed::new(client.clone(), cfg);
    let mut risk = RiskManager::from_config(cfg);
    risk.initialize_portfolio(cfg.backtest.starting_balance_usdc);

    println!("{}", "=".repeat(50));
    println!("  POLYTRADER STATUS");
    println!("{}", "=".repeat(50));
    println!("  Mode:     {}", cfg.trading.mode);
    println!("  Strategy: {}", cfg.strategy.active);

    let mode = EngineMode::resolve(cfg);
    match &mode {
        EngineMode::Live(_) => println!("  Live:     ENABLED"),
        EngineMode::Inert { reason } => println!("  Live:     disabled ({reason})"),
        other => println!("  Live:     disabled (mode is {})", other.label()),
    }

    let mut engine = PaperEngine::new(cfg, feed, RiskManager::from_config(cfg));
    if engine.resume_session()? {
        let summary = engine.get_summary()?;
        println!("\n  Paper Session: {}", summary.session_id);
        println!("  Balance: ${:.2}", summary.current_balance);
        println!("  PnL: ${:+.2}", summary.total_pnl);
        println!("  Trades: {}", summary.total_trades);
    } else {
        println!("\n  No active paper session.");
    }

    match client.get_markets(5).await {
        Ok(markets) => println!("\n  Polymarket API: Connected ({} markets)", markets.len()),
        Err(e) => println!("\n  Polymarket API: ERROR - {e}"),
    }

    let status = risk.status();
    println!("\n  Risk Status:");
    println!("    Can Trade: {}", status.can_trade);
    println!(
        "    Kill Switch: {}",
        if status.kill_switch { "ACTIVE" } else { "off" }
    );
    println!("{}", "=".repeat(50));
    Ok(())
}

fn run_stats(cfg: &AppConfig, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(cfg.journal.stats_window_days);
    let journal = TradeJournal::new(&cfg.journal.dir);
    let stats = journal.accuracy_stats(days);

    println!("{}", "=".repeat(50));
    println!("  JOURNAL STATS (last {days} days)");
    println!("{}", "=".repeat(50));
    println!("  Trades:   {} ", stats.overall.total_trades);
    println!(
        "  W/L:      {} / {}",
        stats.overall.wins, stats.overall.losses
    );
    println!("  Win Rate: {:.1}%", stats.overall.win_rate * 100.0);
    println!("  PnL:      ${:+.2}", stats.overall.total_pnl);
    println!("  Avg Edge: {:+.4}", stats.overall.avg_predicted_edge);
    println!(
        "  Avg PnL%: {:+.2}%",
        stats.overall.avg_realized_pnl_pct * 100.0
    );

    if !stats.by_strategy.is_empty() {
        println!("\n  By strategy:");
        for (name, agg) in &stats.by_strategy {
            println!(
                "    {name}: {} trades, {:.1}% win, ${:+.2}",
                agg.total_trades,
                agg.win_rate * 100.0,
                agg.total_pnl
            );
        }
    }

    if !stats.calibration.is_empty() {
        println!("\n  Calibration (predicted vs observed):");
        for bin in &stats.calibration {
            println!(
                "    {}: predicted {:.3}, actual {:.3} (n={})",
                bin.bin, bin.predicted, bin.actual, bin.count
            );
        }
    }

    let recent = journal.recent_resolutions(10);
    if !recent.is_empty() {
        println!("\n  Recent resolutions:");
        for r in recent {
            println!(
                "    {} {} {} ${:+.2}",
                r.ts.format("%m-%d %H:%M"),
                r.outcome,
                r.market_id,
                r.pnl
            );
        }
    }
    println!("{}", "=".repeat(50));
    Ok(())
}

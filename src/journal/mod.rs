//! Trade journal: append-only JSONL logs for every cycle and resolution.
//!
//! One file per UTC day: `data/journal/2026-02-14.jsonl`
//!
//! Two record types:
//!
//! * `cycle`      - written every evaluation: balance, all signals found
//!                  (executed / skipped + reason), open position count.
//! * `resolution` - written when a trade settles: predicted vs actual
//!                  probability, predicted edge vs realized pnl, strategy.
//!
//! Each line parses independently, so a corrupt record never blocks the
//! rest of the file or other days. Aggregation across day-files powers the
//! `stats` command: win rate, calibration table, per-strategy breakdown.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::types::Side;

/// What happened to one signal during a scan cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Executed,
    Skipped,
}

/// One signal as seen by a cycle, executed or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSignal {
    pub market_id: String,
    pub question: String,
    pub side: Side,
    pub edge: f64,
    pub confidence: f64,
    pub action: SignalAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

/// Terminal outcome of one position, as the journal records it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub ts: DateTime<Utc>,
    pub trade_id: String,
    pub market_id: String,
    pub question: String,
    pub strategy: String,
    pub side: Side,
    pub entry_price: f64,
    pub predicted_prob: f64,
    pub predicted_edge: f64,
    /// 1.0 for a win, 0.0 otherwise
    pub actual_prob: f64,
    /// "won", "lost", or "sold"
    pub outcome: String,
    pub pnl: f64,
    pub size_usdc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JournalRecord {
    Cycle {
        ts: DateTime<Utc>,
        balance: f64,
        strategy: String,
        open_positions: usize,
        signals: Vec<CycleSignal>,
    },
    Resolution(ResolutionRecord),
}

/// Aggregate over a set of resolutions
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionAggregate {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_predicted_edge: f64,
    pub avg_realized_pnl_pct: f64,
}

/// One probability bucket of the calibration table
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationBin {
    /// Bucket label, e.g. "0.6-0.7"
    pub bin: String,
    /// Mean predicted probability in the bucket
    pub predicted: f64,
    /// Observed win rate in the bucket
    pub actual: f64,
    pub count: usize,
}

/// Full accuracy report over a trailing window
#[derive(Debug, Clone, Serialize)]
pub struct AccuracyStats {
    #[serde(flatten)]
    pub overall: ResolutionAggregate,
    pub by_strategy: BTreeMap<String, ResolutionAggregate>,
    pub calibration: Vec<CalibrationBin>,
}

/// Append-only JSONL trade journal, one partition per UTC day
pub struct TradeJournal {
    dir: PathBuf,
}

impl TradeJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn day_file(&self, date: chrono::NaiveDate) -> PathBuf {
        self.dir.join(format!("{date}.jsonl"))
    }

    fn append(&self, record: &JournalRecord) {
        if let Err(e) = self.try_append(record) {
            // The journal is an audit log, not the ledger; losing one line
            // must never break a trading cycle.
            warn!(error = %e, "Journal append failed");
        }
    }

    fn try_append(&self, record: &JournalRecord) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.day_file(Utc::now().date_naive());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Log a single evaluation cycle with every signal seen.
    pub fn log_cycle(
        &self,
        balance: f64,
        strategy: &str,
        open_positions: usize,
        signals: Vec<CycleSignal>,
    ) {
        debug!(
            signals = signals.len(),
            balance, "Logging cycle to journal"
        );
        self.append(&JournalRecord::Cycle {
            ts: Utc::now(),
            balance,
            strategy: strategy.to_string(),
            open_positions,
            signals,
        });
    }

    /// Log the terminal outcome of a resolved or sold position.
    pub fn log_resolution(&self, record: ResolutionRecord) {
        debug!(trade_id = %record.trade_id, outcome = %record.outcome, "Logging resolution");
        self.append(&JournalRecord::Resolution(record));
    }

    /// Read all records from the last `days` day-files, skipping corrupt
    /// lines.
    pub fn read_days(&self, days: u32) -> Vec<JournalRecord> {
        let mut records = Vec::new();
        let today = Utc::now().date_naive();
        for offset in 0..days {
            let date = today - Duration::days(offset as i64);
            let path = self.day_file(date);
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            for line in raw.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<JournalRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(_) => warn!(file = %path.display(), "Corrupt journal line"),
                }
            }
        }
        records
    }

    /// Last `n` resolution records, newest first.
    pub fn recent_resolutions(&self, n: usize) -> Vec<ResolutionRecord> {
        let mut resolutions: Vec<ResolutionRecord> = self
            .read_days(30)
            .into_iter()
            .filter_map(|r| match r {
                JournalRecord::Resolution(res) => Some(res),
                _ => None,
            })
            .collect();
        resolutions.sort_by(|a, b| b.ts.cmp(&a.ts));
        resolutions.truncate(n);
        resolutions
    }

    /// Win rate, calibration, and edge accuracy over a trailing window.
    pub fn accuracy_stats(&self, days: u32) -> AccuracyStats {
        let resolutions: Vec<ResolutionRecord> = self
            .read_days(days)
            .into_iter()
            .filter_map(|r| match r {
                JournalRecord::Resolution(res) => Some(res),
                _ => None,
            })
            .collect();

        let mut by_strategy: BTreeMap<String, Vec<&ResolutionRecord>> = BTreeMap::new();
        for r in &resolutions {
            by_strategy.entry(r.strategy.clone()).or_default().push(r);
        }

        AccuracyStats {
            overall: aggregate(resolutions.iter()),
            by_strategy: by_strategy
                .into_iter()
                .map(|(name, recs)| (name, aggregate(recs.into_iter())))
                .collect(),
            calibration: calibration_bins(&resolutions),
        }
    }
}

fn aggregate<'a>(resolutions: impl Iterator<Item = &'a ResolutionRecord>) -> ResolutionAggregate {
    let mut agg = ResolutionAggregate::default();
    let mut edge_sum = 0.0;
    let mut edge_count = 0usize;
    let mut pnl_pct_sum = 0.0;
    let mut pnl_pct_count = 0usize;

    for r in resolutions {
        match r.outcome.as_str() {
            "won" => agg.wins += 1,
            "lost" => agg.losses += 1,
            _ => {}
        }
        agg.total_pnl += r.pnl;
        edge_sum += r.predicted_edge;
        edge_count += 1;
        if r.size_usdc > 0.0 {
            pnl_pct_sum += r.pnl / r.size_usdc;
            pnl_pct_count += 1;
        }
    }

    agg.total_trades = agg.wins + agg.losses;
    if agg.total_trades > 0 {
        agg.win_rate = agg.wins as f64 / agg.total_trades as f64;
    }
    if edge_count > 0 {
        agg.avg_predicted_edge = edge_sum / edge_count as f64;
    }
    if pnl_pct_count > 0 {
        agg.avg_realized_pnl_pct = pnl_pct_sum / pnl_pct_count as f64;
    }
    agg
}

/// Bucket a predicted probability into its 0.1-wide calibration bin.
/// 1.0 lands in the top "0.9-1.0" bucket.
pub fn calibration_bucket(predicted_prob: f64) -> String {
    let lo = ((predicted_prob * 10.0).floor() / 10.0).clamp(0.0, 0.9);
    format!("{:.1}-{:.1}", lo, lo + 0.1)
}

fn calibration_bins(resolutions: &[ResolutionRecord]) -> Vec<CalibrationBin> {
    let mut bins: BTreeMap<String, Vec<&ResolutionRecord>> = BTreeMap::new();
    for r in resolutions {
        bins.entry(calibration_bucket(r.predicted_prob))
            .or_default()
            .push(r);
    }

    bins.into_iter()
        .map(|(bin, recs)| {
            let count = recs.len();
            let predicted = recs.iter().map(|r| r.predicted_prob).sum::<f64>() / count as f64;
            let won = recs.iter().filter(|r| r.outcome == "won").count();
            CalibrationBin {
                bin,
                predicted,
                actual: won as f64 / count as f64,
                count,
            }
        })
        .collect()
}

//! Telegram notifications for trade alerts and summaries.
//!
//! Strictly best-effort: every failure is logged and swallowed so a
//! notification problem can never interrupt a trading cycle.

use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::engine::session::Position;
use crate::types::TradeSignal;

const API_BASE: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    http: reqwest::Client,
    enabled: bool,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        let enabled = !bot_token.is_empty() && !chat_id.is_empty();
        if !enabled {
            warn!("Telegram credentials not set, notifications disabled");
        }
        Self {
            bot_token,
            chat_id,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client with static config"),
            enabled,
        }
    }

    /// Build from TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID, disabled when the
    /// config flag is off or either variable is missing.
    pub fn from_env(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }
        Self::new(
            std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default(),
        )
    }

    pub fn disabled() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            http: reqwest::Client::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn send_message(&self, text: &str) {
        if !self.enabled {
            debug!("Telegram send skipped, notifier disabled");
            return;
        }

        let url = format!("{API_BASE}/bot{}/sendMessage", self.bot_token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        match self.http.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => error!(status = %resp.status(), "Telegram API error"),
            Err(e) => error!(error = %e, "Telegram send failed"),
        }
    }

    pub async fn send_trade_alert(&self, label: &str, signal: &TradeSignal) {
        let question: String = signal.question.chars().take(60).collect();
        self.send_message(&format!(
            "{label}\nMarket: {question}\nSide: {}  Size: ${:.2}  Price: {:.1}%\nEdge: {:+.3}  Confidence: {:.0}%\n{}",
            signal.side,
            signal.position_size_usdc,
            signal.entry_price * 100.0,
            signal.edge,
            signal.confidence * 100.0,
            signal.reason
        ))
        .await;
    }

    pub async fn send_resolution(&self, position: &Position) {
        let question: String = position.question.chars().take(60).collect();
        self.send_message(&format!(
            "POSITION {}\nMarket: {question}\nEntry: {:.1}%  Size: ${:.2}\nP&L: {:+.4} USDC",
            format!("{:?}", position.status).to_uppercase(),
            position.entry_price * 100.0,
            position.size_usdc,
            position.pnl
        ))
        .await;
    }
}

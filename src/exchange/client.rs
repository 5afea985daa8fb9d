//! Polymarket API client: Gamma for market data, CLOB for orders.
//!
//! Constructed explicitly and injected into the engines. Read endpoints go
//! through a short TTL cache so one scan cycle does not hammer the API;
//! authenticated CLOB calls carry L2 HMAC headers.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ExchangeConfig;
use crate::exchange::{LiveCredentials, Market, MarketData, OrderAck, OrderApi, OrderRequest};

/// Raw Gamma market payload. Array-valued fields arrive as JSON-encoded
/// strings and are normalized exactly once, here.
#[derive(Debug, Deserialize)]
struct GammaMarket {
    #[serde(default)]
    id: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    resolved: bool,
    #[serde(default, rename = "outcomePrices")]
    outcome_prices: Option<Value>,
    #[serde(default)]
    outcomes: Option<Value>,
    #[serde(default, rename = "clobTokenIds")]
    clob_token_ids: Option<Value>,
    #[serde(default)]
    volume: Option<Value>,
    #[serde(default)]
    liquidity: Option<Value>,
    #[serde(default, rename = "endDate")]
    end_date: String,
}

/// Parse a field that may be a JSON array or a string-encoded JSON array.
fn string_array(value: Option<&Value>) -> Vec<String> {
    let items = match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => match serde_json::from_str::<Vec<Value>>(s) {
            Ok(items) => items,
            Err(_) => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
        .collect()
}

fn float_array(value: Option<&Value>) -> Vec<f64> {
    string_array(value)
        .into_iter()
        .filter_map(|s| s.trim_matches('"').parse::<f64>().ok())
        .collect()
}

fn lenient_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl From<GammaMarket> for Market {
    fn from(raw: GammaMarket) -> Self {
        Market {
            id: raw.id,
            question: raw.question,
            slug: raw.slug,
            active: raw.active,
            closed: raw.closed,
            resolved: raw.resolved,
            outcome_prices: float_array(raw.outcome_prices.as_ref()),
            outcomes: string_array(raw.outcomes.as_ref()),
            token_ids: string_array(raw.clob_token_ids.as_ref()),
            volume: lenient_f64(raw.volume.as_ref()),
            liquidity: lenient_f64(raw.liquidity.as_ref()),
            end_date: raw.end_date,
        }
    }
}

/// Client for the Gamma (data) and CLOB (trading) APIs
pub struct PolymarketClient {
    http: reqwest::Client,
    gamma_url: String,
    clob_url: String,
    credentials: Option<LiveCredentials>,
    cache: Mutex<HashMap<String, (Instant, Value)>>,
    cache_ttl: Duration,
}

impl PolymarketClient {
    pub fn new(cfg: &ExchangeConfig, credentials: Option<LiveCredentials>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            gamma_url: cfg.gamma_url.trim_end_matches('/').to_string(),
            clob_url: cfg.clob_url.trim_end_matches('/').to_string(),
            credentials,
            cache: Mutex::new(HashMap::new()),
            cache_ttl: Duration::from_secs(cfg.cache_ttl_secs),
        })
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("cache lock").clear();
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        {
            let cache = self.cache.lock().expect("cache lock");
            if let Some((at, value)) = cache.get(url) {
                if at.elapsed() < self.cache_ttl {
                    return Ok(value.clone());
                }
            }
        }

        debug!(url, "GET");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if !resp.status().is_success() {
            bail!("GET {url} returned HTTP {}", resp.status());
        }
        let value: Value = resp.json().await.with_context(|| format!("decode {url}"))?;

        self.cache
            .lock()
            .expect("cache lock")
            .insert(url.to_string(), (Instant::now(), value.clone()));
        Ok(value)
    }

    /// L2 auth headers: HMAC-SHA256 over timestamp + method + path + body.
    fn l2_headers(&self, method: &str, request_path: &str, body: &str) -> Result<HeaderMap> {
        let creds = self
            .credentials
            .as_ref()
            .context("CLOB credentials not configured for authenticated request")?;

        let timestamp = Utc::now().timestamp().to_string();
        let message = format!("{timestamp}{}{request_path}{body}", method.to_uppercase());

        let secret = general_purpose::URL_SAFE_NO_PAD
            .decode(&creds.api_secret)
            .or_else(|_| general_purpose::URL_SAFE.decode(&creds.api_secret))
            .context("Failed to decode API secret as url-safe base64")?;

        type HmacSha256 = Hmac<Sha256>;
        let mut mac =
            HmacSha256::new_from_slice(&secret).context("Failed to initialize HMAC")?;
        mac.update(message.as_bytes());
        let signature = general_purpose::URL_SAFE.encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("POLY_ADDRESS", HeaderValue::from_str(&creds.address)?);
        headers.insert("POLY_SIGNATURE", HeaderValue::from_str(&signature)?);
        headers.insert("POLY_TIMESTAMP", HeaderValue::from_str(&timestamp)?);
        headers.insert("POLY_API_KEY", HeaderValue::from_str(&creds.api_key)?);
        headers.insert(
            "POLY_PASSPHRASE",
            HeaderValue::from_str(&creds.api_passphrase)?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl MarketData for PolymarketClient {
    async fn get_markets(&self, limit: usize) -> Result<Vec<Market>> {
        let url = format!(
            "{}/markets?limit={limit}&active=true&closed=false",
            self.gamma_url
        );
        let value = self.get_json(&url).await?;
        let raw: Vec<GammaMarket> =
            serde_json::from_value(value).context("decode Gamma markets")?;
        Ok(raw.into_iter().map(Market::from).collect())
    }

    async fn get_market(&self, market_id: &str) -> Result<Market> {
        let url = format!("{}/markets/{market_id}", self.gamma_url);
        let value = self.get_json(&url).await?;
        let raw: GammaMarket = serde_json::from_value(value).context("decode Gamma market")?;
        Ok(raw.into())
    }
}

#[async_trait]
impl OrderApi for PolymarketClient {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        let path = "/order";
        let body = serde_json::json!({
            "tokenID": request.token_id,
            "price": request.price,
            "size": request.shares,
            "side": request.side.to_string(),
            "orderType": "GTC",
            "clientID": request.client_id,
        })
        .to_string();

        let headers = self.l2_headers("POST", path, &body)?;
        let url = format!("{}{path}", self.clob_url);
        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .context("POST /order")?;

        let status = resp.status();
        let payload: Value = resp.json().await.context("decode order response")?;
        if !status.is_success() {
            bail!("order rejected: HTTP {status}: {payload}");
        }
        if let Some(err) = payload.get("error").and_then(Value::as_str) {
            bail!("order rejected: {err}");
        }

        let order_id = payload
            .get("orderID")
            .or_else(|| payload.get("orderId"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let ack_status = payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("accepted")
            .to_string();
        Ok(OrderAck {
            order_id,
            status: ack_status,
        })
    }

    async fn get_tick_size(&self, token_id: &str) -> Result<f64> {
        let url = format!("{}/tick-size?token_id={token_id}", self.clob_url);
        let value = self.get_json(&url).await?;
        let tick = value
            .get("minimum_tick_size")
            .and_then(Value::as_f64)
            .or_else(|| value.as_f64())
            .context("tick size missing from response")?;
        Ok(tick)
    }

    async fn get_fee_rate(&self, token_id: &str) -> Result<f64> {
        let url = format!("{}/fee-rate?token_id={token_id}", self.clob_url);
        match self.get_json(&url).await {
            Ok(value) => Ok(value
                .get("fee_rate_bps")
                .and_then(Value::as_f64)
                .map(|bps| bps / 10_000.0)
                .unwrap_or(0.0)),
            Err(e) => {
                // Fee schedule endpoint is best-effort; orders stand without it.
                warn!(token_id, error = %e, "Fee rate lookup failed, assuming zero");
                Ok(0.0)
            }
        }
    }

    async fn cancel_all(&self) -> Result<Vec<String>> {
        let path = "/cancel-all";
        let headers = self.l2_headers("DELETE", path, "")?;
        let url = format!("{}{path}", self.clob_url);
        let resp = self
            .http
            .delete(&url)
            .headers(headers)
            .send()
            .await
            .context("DELETE /cancel-all")?;
        if !resp.status().is_success() {
            bail!("cancel-all returned HTTP {}", resp.status());
        }
        let payload: Value = resp.json().await.unwrap_or(Value::Null);
        let cancelled = payload
            .get("canceled")
            .or_else(|| payload.get("cancelled"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_fields_normalize_from_stringified_arrays() {
        let raw: GammaMarket = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "question": "Test?",
            "active": true,
            "closed": false,
            "outcomePrices": "[\"0.62\", \"0.38\"]",
            "outcomes": "[\"Yes\", \"No\"]",
            "clobTokenIds": "[\"tok_yes\", \"tok_no\"]",
            "volume": "51234.5",
            "liquidity": 9000.0,
        }))
        .unwrap();

        let market: Market = raw.into();
        assert_eq!(market.outcome_prices, vec![0.62, 0.38]);
        assert_eq!(market.outcomes, vec!["Yes", "No"]);
        assert_eq!(market.token_ids.len(), 2);
        assert!((market.volume - 51234.5).abs() < 1e-9);
        assert!((market.liquidity - 9000.0).abs() < 1e-9);
    }

    #[test]
    fn gamma_fields_accept_plain_arrays() {
        let raw: GammaMarket = serde_json::from_value(serde_json::json!({
            "id": "m2",
            "question": "Other?",
            "active": true,
            "closed": true,
            "outcomePrices": ["0.10", "0.90"],
            "outcomes": ["Yes", "No"],
        }))
        .unwrap();

        let market: Market = raw.into();
        assert!(market.closed);
        assert_eq!(market.outcome_prices, vec![0.10, 0.90]);
        assert!(market.token_ids.is_empty());
    }

    #[test]
    fn missing_credentials_fail_authenticated_calls() {
        let cfg = ExchangeConfig {
            gamma_url: "https://gamma.example".to_string(),
            clob_url: "https://clob.example".to_string(),
            timeout_secs: 5,
            cache_ttl_secs: 30,
        };
        let client = PolymarketClient::new(&cfg, None).unwrap();
        let err = client.l2_headers("POST", "/order", "{}").unwrap_err();
        assert!(err.to_string().contains("credentials"));
    }
}

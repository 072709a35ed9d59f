//! CoinGecko price feed.
//!
//! Pulls the last day of prices and volumes for a coin and derives the
//! snapshot fields from them: last price, last volume, percent change
//! over the window, and a 14-period RSI over the price series.
//!
//! API: `https://api.coingecko.com/api/v3/coins/{id}/market_chart`
//! Auth: optional demo key via the `x-cg-demo-api-key` header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{split_ticker, SnapshotSource};
use crate::types::{MarketSnapshot, QuorumError};

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const RSI_PERIOD: usize = 14;

/// Exchange symbol to CoinGecko coin id.
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("DOGE", "dogecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("BNB", "binancecoin"),
    ("AVAX", "avalanche-2"),
    ("DOT", "polkadot"),
    ("LTC", "litecoin"),
    ("LINK", "chainlink"),
    ("MATIC", "matic-network"),
];

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Each series entry is `[timestamp_ms, value]`.
#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<[f64; 2]>,
    #[serde(default)]
    total_volumes: Vec<[f64; 2]>,
}

// ---------------------------------------------------------------------------
// Indicators
// ---------------------------------------------------------------------------

/// Relative Strength Index with Wilder smoothing.
///
/// Needs at least `period + 1` closes. A series with no losses reads 100
/// if it gained at all and 50 if it was flat.
pub fn relative_strength_index(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = deltas.split_at(period);

    let mut avg_gain = seed.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = seed.iter().filter(|d| **d < 0.0).map(|d| -d).sum::<f64>() / period as f64;

    let smoothing = (period - 1) as f64;
    for d in rest {
        avg_gain = (avg_gain * smoothing + d.max(0.0)) / period as f64;
        avg_loss = (avg_loss * smoothing + (-d).max(0.0)) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain > 0.0 { 100.0 } else { 50.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Percent change from the first to the last value.
fn percent_change(series: &[f64]) -> f64 {
    match (series.first(), series.last()) {
        (Some(first), Some(last)) if *first != 0.0 => (last - first) / first * 100.0,
        _ => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

pub struct CoinGeckoFeed {
    http: Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl CoinGeckoFeed {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("QUORUM/0.1.0")
            .build()
            .context("Failed to build CoinGecko HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.map(SecretString::new),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Map `BTC` to `bitcoin`; unknown symbols are tried as-is, lowercased.
    pub fn coin_id(symbol: &str) -> String {
        let upper = symbol.to_uppercase();
        COIN_IDS
            .iter()
            .find(|(sym, _)| *sym == upper)
            .map(|(_, id)| id.to_string())
            .unwrap_or_else(|| symbol.to_lowercase())
    }

    fn summarise(ticker: &str, chart: &MarketChart) -> Result<MarketSnapshot> {
        let closes: Vec<f64> = chart.prices.iter().map(|p| p[1]).collect();
        let Some(&price) = closes.last() else {
            return Err(QuorumError::DataProvider {
                data_source: "coingecko".into(),
                message: format!("no price points returned for {ticker}"),
            }
            .into());
        };

        let volume = chart.total_volumes.last().map(|v| v[1]).unwrap_or(0.0);
        let rsi = relative_strength_index(&closes, RSI_PERIOD).unwrap_or(50.0);

        Ok(MarketSnapshot {
            ticker: ticker.to_string(),
            price,
            volume,
            change_24h: percent_change(&closes),
            rsi,
            news: Vec::new(),
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl SnapshotSource for CoinGeckoFeed {
    async fn snapshot(&self, ticker: &str) -> Result<MarketSnapshot> {
        let (base, quote) = split_ticker(ticker);
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days=1",
            self.base_url,
            urlencoding::encode(&Self::coin_id(&base)),
            quote.to_lowercase()
        );

        let mut req = self.http.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key.expose_secret());
        }

        let resp = req
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("CoinGecko request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QuorumError::DataProvider {
                data_source: "coingecko".into(),
                message: format!("HTTP {status}: {body}"),
            }
            .into());
        }

        let chart: MarketChart = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to parse CoinGecko market_chart response")?;
        debug!(ticker, points = chart.prices.len(), "CoinGecko chart fetched");

        Self::summarise(ticker, &chart)
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

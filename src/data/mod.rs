//! Market-data collaborators.
//!
//! Defines the `MarketDataProvider` trait the coordinator gathers from,
//! and composes it out of a snapshot source and a headline source:
//! - `coingecko`: live crypto prices, volume, 24 h change and RSI
//! - `news`: NewsAPI headlines (templated when no key is configured)
//! - `simulated`: deterministic offline snapshots and headlines

pub mod coingecko;
pub mod news;
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, DataConfig};
use crate::types::MarketSnapshot;
use coingecko::CoinGeckoFeed;
use news::NewsFeed;
use simulated::SimulatedFeed;

/// What the coordinator needs during GATHERING. Failures here end the
/// session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_market_data(&self, ticker: &str) -> Result<MarketSnapshot>;

    async fn get_news(&self, ticker: &str) -> Result<Vec<String>>;
}

/// A source of price/volume/indicator snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self, ticker: &str) -> Result<MarketSnapshot>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// A source of recent headlines.
#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn headlines(&self, ticker: &str) -> Result<Vec<String>>;

    fn name(&self) -> &str;
}

/// Pairs one snapshot source with one headline source.
pub struct MarketFeed {
    snapshots: Arc<dyn SnapshotSource>,
    headlines: Arc<dyn HeadlineSource>,
}

impl MarketFeed {
    pub fn new(snapshots: Arc<dyn SnapshotSource>, headlines: Arc<dyn HeadlineSource>) -> Self {
        Self { snapshots, headlines }
    }

    /// Build the feed described by the `[data]` config section.
    pub fn from_config(cfg: &DataConfig) -> Result<Self> {
        let news_key = AppConfig::resolve_optional(cfg.news_api_key_env.as_deref());
        let headlines: Arc<dyn HeadlineSource> = Arc::new(NewsFeed::new(news_key, None)?);

        let snapshots: Arc<dyn SnapshotSource> = match cfg.provider.to_lowercase().as_str() {
            "coingecko" => {
                let key = AppConfig::resolve_optional(cfg.coingecko_api_key_env.as_deref());
                Arc::new(CoinGeckoFeed::new(key, None)?)
            }
            "simulated" => Arc::new(SimulatedFeed),
            other => anyhow::bail!("Unknown market data provider: {other}"),
        };

        info!(
            snapshots = snapshots.name(),
            headlines = headlines.name(),
            "Market feed configured"
        );
        Ok(Self::new(snapshots, headlines))
    }
}

#[async_trait]
impl MarketDataProvider for MarketFeed {
    async fn get_market_data(&self, ticker: &str) -> Result<MarketSnapshot> {
        self.snapshots.snapshot(ticker).await
    }

    async fn get_news(&self, ticker: &str) -> Result<Vec<String>> {
        self.headlines.headlines(ticker).await
    }
}

/// Split `BTC-USD` / `btc/usd` / `BTC` into (base, quote), quote
/// defaulting to USD.
pub fn split_ticker(ticker: &str) -> (String, String) {
    let upper = ticker.trim().to_uppercase();
    match upper.split_once(|c: char| c == '-' || c == '/') {
        Some((base, quote)) if !quote.is_empty() => (base.to_string(), quote.to_string()),
        Some((base, _)) => (base.to_string(), "USD".to_string()),
        None => (upper, "USD".to_string()),
    }
}

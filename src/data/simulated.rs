//! Offline market feed.
//!
//! Every value is derived from an FNV-1a hash of the ticker, so the same
//! ticker always yields the same snapshot. Used for demos and tests when
//! no live provider is configured.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use super::news::NewsFeed;
use super::{HeadlineSource, SnapshotSource};
use crate::types::MarketSnapshot;

pub struct SimulatedFeed;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Map the `slot`-th 16-bit slice of the hash onto `[lo, hi]`.
fn spread(hash: u64, slot: u32, lo: f64, hi: f64) -> f64 {
    let bits = (hash >> (slot * 16)) & 0xffff;
    lo + (hi - lo) * bits as f64 / 65535.0
}

impl SimulatedFeed {
    pub fn generate(ticker: &str) -> MarketSnapshot {
        let hash = fnv1a(ticker.as_bytes());
        let (lo, hi) = if ticker.eq_ignore_ascii_case("BTC-USD") {
            (100.0, 50_000.0)
        } else {
            (10.0, 200.0)
        };

        MarketSnapshot {
            ticker: ticker.to_string(),
            price: spread(hash, 0, lo, hi),
            volume: spread(hash, 1, 100_000.0, 10_000_000.0),
            change_24h: spread(hash, 2, -5.0, 5.0),
            rsi: spread(hash, 3, 30.0, 70.0),
            news: Vec::new(),
            fetched_at: Utc::now(),
        }
    }
}

#[async_trait]
impl SnapshotSource for SimulatedFeed {
    async fn snapshot(&self, ticker: &str) -> Result<MarketSnapshot> {
        Ok(Self::generate(ticker))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[async_trait]
impl HeadlineSource for SimulatedFeed {
    async fn headlines(&self, ticker: &str) -> Result<Vec<String>> {
        Ok(NewsFeed::templated(ticker))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_ticker_same_snapshot() {
        let a = SimulatedFeed::generate("ETH-USD");
        let b = SimulatedFeed::generate("ETH-USD");
        assert_eq!(a.price, b.price);
        assert_eq!(a.rsi, b.rsi);
        assert_ne!(a.price, SimulatedFeed::generate("SOL-USD").price);
    }

    #[test]
    fn test_values_within_ranges() {
        for t in ["BTC-USD", "ETH-USD", "AAPL", "X", ""] {
            let s = SimulatedFeed::generate(t);
            assert!((30.0..=70.0).contains(&s.rsi));
            assert!((-5.0..=5.0).contains(&s.change_24h));
            assert!((100_000.0..=10_000_000.0).contains(&s.volume));
        }
        let btc = SimulatedFeed::generate("BTC-USD");
        assert!((100.0..=50_000.0).contains(&btc.price));
        let other = SimulatedFeed::generate("ETH-USD");
        assert!((10.0..=200.0).contains(&other.price));
    }

    #[tokio::test]
    async fn test_headlines_are_templated() {
        let news = HeadlineSource::headlines(&SimulatedFeed, "BTC-USD").await.unwrap();
        assert_eq!(news.len(), 2);
    }
}

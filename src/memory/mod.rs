//! Retrieval memory for debates.
//!
//! Two tiers feed the historical context every round briefing starts with:
//! - `short_term` holds the latest session per ticker (Redis, 1 h TTL)
//! - `long_term` holds one embedded summary per session, searched by L2
//!   distance
//!
//! `RagMemory` combines both behind the `MemoryStore` trait the
//! coordinator depends on.

pub mod embedding;
pub mod long_term;
pub mod short_term;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::types::SessionRecord;
use long_term::LongTermMemory;
use short_term::ShortTermMemory;

/// Returned by `get_context` when neither tier has anything to say.
pub const EMPTY_CONTEXT: &str = "No historical context available.";

/// Memory as seen by the coordinator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Historical context for `ticker`. Never fails; degraded tiers are
    /// skipped.
    async fn get_context(&self, ticker: &str) -> String;

    /// Persist a completed session.
    async fn store_experience(&self, ticker: &str, record: &SessionRecord) -> Result<()>;
}

pub struct RagMemory {
    short_term: ShortTermMemory,
    long_term: Mutex<LongTermMemory>,
    top_k: usize,
}

impl RagMemory {
    pub fn new(short_term: ShortTermMemory, long_term: LongTermMemory, top_k: usize) -> Self {
        Self {
            short_term,
            long_term: Mutex::new(long_term),
            top_k,
        }
    }

    /// Connect both tiers as described by the `[memory]` config section.
    pub async fn from_config(cfg: &MemoryConfig) -> Result<Self> {
        let short_term = ShortTermMemory::connect(
            cfg.redis_url.as_deref(),
            Duration::from_secs(cfg.short_term_ttl_secs),
        )
        .await;
        let long_term = LongTermMemory::load(&cfg.long_term_path, cfg.dimension)?;
        Ok(Self::new(short_term, long_term, cfg.top_k))
    }

    /// Both tiers in-process, nothing persisted.
    pub fn ephemeral(dimension: usize, top_k: usize) -> Self {
        Self::new(
            ShortTermMemory::local(Duration::from_secs(3600)),
            LongTermMemory::in_memory(dimension),
            top_k,
        )
    }

    pub fn summary(ticker: &str, record: &SessionRecord) -> String {
        format!(
            "Ticker: {ticker}, Decision: {}, Confidence: {:.2}",
            record.decision, record.confidence
        )
    }

    fn query_text(ticker: &str) -> String {
        format!("Ticker: {ticker}")
    }
}

#[async_trait]
impl MemoryStore for RagMemory {
    async fn get_context(&self, ticker: &str) -> String {
        let mut lines = Vec::new();

        match self.short_term.recent(ticker).await {
            Ok(Some(recent)) => lines.push(format!(
                "Recent Discussion (Last 1h): {} with confidence {:.2}",
                recent.decision, recent.confidence
            )),
            Ok(None) => {}
            Err(e) => warn!(ticker, error = %e, "Short-term memory lookup failed"),
        }

        let long_term = self.long_term.lock().await;
        let query = embedding::embed(&Self::query_text(ticker), long_term.dimension());
        match long_term.search(&query, self.top_k) {
            Ok(hits) if !hits.is_empty() => {
                lines.push("Similar Past Situations:".to_string());
                for hit in hits {
                    lines.push(format!("- {} (Similarity: {:.2})", hit.summary, hit.distance));
                }
            }
            Ok(_) => {}
            Err(e) => warn!(ticker, error = %e, "Long-term memory search failed"),
        }
        drop(long_term);

        if lines.is_empty() {
            return EMPTY_CONTEXT.to_string();
        }
        debug!(ticker, lines = lines.len(), "Historical context assembled");
        lines.join("\n")
    }

    async fn store_experience(&self, ticker: &str, record: &SessionRecord) -> Result<()> {
        self.short_term.store(ticker, record).await?;

        let summary = Self::summary(ticker, record);
        let mut long_term = self.long_term.lock().await;
        let vector = embedding::embed(&summary, long_term.dimension());
        long_term.add(vector, summary).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConsensusResult, DebateSession, MarketSnapshot, Signal, Termination};

    fn record(ticker: &str, decision: Signal, confidence: f64) -> SessionRecord {
        let mut session = DebateSession::new(ticker);
        session.conclude(ConsensusResult { decision, confidence }, Termination::Consensus);
        crate::engine::record::build(&session, &MarketSnapshot::sample(ticker)).unwrap()
    }

    #[tokio::test]
    async fn test_empty_memory_context() {
        let mem = RagMemory::ephemeral(32, 3);
        assert_eq!(mem.get_context("BTC-USD").await, EMPTY_CONTEXT);
    }

    #[tokio::test]
    async fn test_context_after_store() {
        let mem = RagMemory::ephemeral(32, 3);
        mem.store_experience("BTC-USD", &record("BTC-USD", Signal::Buy, 0.8123))
            .await
            .unwrap();

        let ctx = mem.get_context("BTC-USD").await;
        let lines: Vec<&str> = ctx.lines().collect();
        assert_eq!(lines[0], "Recent Discussion (Last 1h): BUY with confidence 0.81");
        assert_eq!(lines[1], "Similar Past Situations:");
        assert!(lines[2].starts_with("- Ticker: BTC-USD, Decision: BUY, Confidence: 0.81 (Similarity: "));
    }

    #[tokio::test]
    async fn test_other_ticker_sees_only_long_term() {
        let mem = RagMemory::ephemeral(32, 3);
        mem.store_experience("BTC-USD", &record("BTC-USD", Signal::Sell, 0.7))
            .await
            .unwrap();

        let ctx = mem.get_context("ETH-USD").await;
        assert!(ctx.starts_with("Similar Past Situations:"));
    }

    #[tokio::test]
    async fn test_top_k_limits_recall() {
        let mem = RagMemory::ephemeral(32, 2);
        for c in [0.5, 0.6, 0.7] {
            mem.store_experience("SOL-USD", &record("SOL-USD", Signal::Hold, c))
                .await
                .unwrap();
        }
        let ctx = mem.get_context("SOL-USD").await;
        assert_eq!(ctx.lines().filter(|l| l.starts_with("- ")).count(), 2);
    }

    #[test]
    fn test_summary_format() {
        let r = record("ETH-USD", Signal::Hold, 0.456);
        assert_eq!(RagMemory::summary("ETH-USD", &r), "Ticker: ETH-USD, Decision: HOLD, Confidence: 0.46");
    }
}

//! Shared types for the QUORUM engine.
//!
//! These types form the data model used across all modules. Participants,
//! collaborators, the engine, and the HTTP surface all depend on them, so
//! they carry no behaviour beyond validation and display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// The decision space: every opinion and every consensus lands on one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Fixed tie-break order used by the consensus engine. Under equal
    /// normalized scores the earlier entry wins.
    pub const PRIORITY: [Signal; 3] = [Signal::Buy, Signal::Sell, Signal::Hold];

    /// Position of this signal in [`Signal::PRIORITY`].
    pub fn rank(&self) -> usize {
        match self {
            Signal::Buy => 0,
            Signal::Sell => 1,
            Signal::Hold => 2,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Parse a signal case-insensitively, tolerating surrounding whitespace.
impl std::str::FromStr for Signal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Signal::Buy),
            "SELL" | "SHORT" => Ok(Signal::Sell),
            "HOLD" | "NEUTRAL" => Ok(Signal::Hold),
            _ => Err(anyhow::anyhow!("Unknown signal: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Opinions
// ---------------------------------------------------------------------------

/// A single participant's stance for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub signal: Signal,
    /// Self-reported conviction (0.0–1.0)
    pub confidence: f64,
    pub reasoning: String,
}

impl fmt::Display for Opinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.signal, self.confidence)
    }
}

impl Opinion {
    /// Build an opinion, forcing confidence into [0, 1]. NaN becomes 0.
    pub fn new(signal: Signal, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            signal,
            confidence: clamp_unit(confidence),
            reasoning: reasoning.into(),
        }
    }

    /// Substitute used when a participant fails its initial analysis.
    pub fn fallback(cause: impl fmt::Display) -> Self {
        Self::new(Signal::Hold, 0.0, format!("agent error: {cause}"))
    }
}

/// Clamp a value into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// The atomic unit consumed by the consensus engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedOpinion {
    /// Name of the participant that produced the opinion
    pub participant: String,
    /// Participant weight copied at round time
    pub weight: f64,
    pub opinion: Opinion,
}

impl fmt::Display for WeightedOpinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (Conf: {})",
            self.participant, self.opinion.signal, self.opinion.confidence,
        )
    }
}

/// One full revision pass across the participant pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub index: usize,
    /// One entry per participant, in pool order
    pub opinions: Vec<WeightedOpinion>,
    /// Participants whose revision failed and whose previous opinion was reused
    #[serde(default)]
    pub carried_forward: Vec<String>,
}

impl Round {
    /// This round with the named participant's entry removed.
    pub fn without(&self, participant: &str) -> Round {
        Round {
            index: self.index,
            opinions: self
                .opinions
                .iter()
                .filter(|o| o.participant != participant)
                .cloned()
                .collect(),
            carried_forward: self
                .carried_forward
                .iter()
                .filter(|p| p.as_str() != participant)
                .cloned()
                .collect(),
        }
    }

    /// Number of participants that answered fresh this round.
    pub fn fresh_count(&self) -> usize {
        self.opinions.len().saturating_sub(self.carried_forward.len())
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Market snapshot fetched once per session and shared by all rounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub price: f64,
    /// 24-hour traded volume
    pub volume: f64,
    /// 24-hour change in percent
    pub change_24h: f64,
    /// 14-period relative strength index (0–100)
    pub rsi: f64,
    /// Headlines attached during gathering
    #[serde(default)]
    pub news: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl fmt::Display for MarketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} price={:.2} vol={:.0} 24h={:+.2}% rsi={:.1}",
            self.ticker, self.price, self.volume, self.change_24h, self.rsi,
        )
    }
}

impl MarketSnapshot {
    /// Helper to build a snapshot with sensible defaults for tests.
    pub fn sample(ticker: &str) -> Self {
        MarketSnapshot {
            ticker: ticker.to_string(),
            price: 64_250.5,
            volume: 2_500_000.0,
            change_24h: 1.25,
            rsi: 55.0,
            news: vec![format!("{ticker} shows strong momentum.")],
            fetched_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Consensus & session
// ---------------------------------------------------------------------------

/// Output of the consensus engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub decision: Signal,
    /// Normalized weighted score of the winning signal (0.0–1.0)
    pub confidence: f64,
}

impl fmt::Display for ConsensusResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:.1}%", self.decision, self.confidence * 100.0)
    }
}

impl ConsensusResult {
    /// Result used when there is no weight to normalize by.
    pub const NONE: ConsensusResult = ConsensusResult {
        decision: Signal::Hold,
        confidence: 0.0,
    };
}

/// Why the debate loop stopped.
///
/// Every variant other than `Consensus` ends the session as exhausted: the
/// decision is the best-effort consensus of the opinions in force, which
/// may sit below the threshold. Fatal outcomes are `SessionError`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Confidence cleared the threshold before a revision pass.
    Consensus,
    /// Every configured round ran without clearing the threshold.
    RoundsExhausted,
    /// No participant answered a revision pass; last good opinions were kept.
    RoundFailed,
    /// The outer session deadline elapsed.
    DeadlineExceeded,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Consensus => write!(f, "consensus"),
            Termination::RoundsExhausted => write!(f, "rounds_exhausted"),
            Termination::RoundFailed => write!(f, "round_failed"),
            Termination::DeadlineExceeded => write!(f, "deadline_exceeded"),
        }
    }
}

/// Mutable state of one debate, owned by the coordinator for one request.
#[derive(Debug, Clone)]
pub struct DebateSession {
    pub id: Uuid,
    pub ticker: String,
    pub started_at: DateTime<Utc>,
    pub history: Vec<Round>,
    current: Vec<WeightedOpinion>,
    pub outcome: Option<(ConsensusResult, Termination)>,
}

impl DebateSession {
    pub fn new(ticker: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            started_at: Utc::now(),
            history: Vec::new(),
            current: Vec::new(),
            outcome: None,
        }
    }

    /// The opinions currently in force, in pool order.
    pub fn current_opinions(&self) -> &[WeightedOpinion] {
        &self.current
    }

    /// Replace the opinions in force. Duplicate participants collapse to
    /// their most recent entry, keeping the position of the first.
    pub fn set_current(&mut self, opinions: Vec<WeightedOpinion>) {
        let mut merged: Vec<WeightedOpinion> = Vec::with_capacity(opinions.len());
        for op in opinions {
            match merged.iter_mut().find(|m| m.participant == op.participant) {
                Some(slot) => *slot = op,
                None => merged.push(op),
            }
        }
        self.current = merged;
    }

    /// The opinion currently in force for a participant.
    pub fn current_for(&self, participant: &str) -> Option<&WeightedOpinion> {
        self.current.iter().find(|o| o.participant == participant)
    }

    /// All prior rounds with the named participant's own entries removed.
    pub fn others_history(&self, participant: &str) -> Vec<Round> {
        self.history.iter().map(|r| r.without(participant)).collect()
    }

    /// Number of revision rounds executed so far.
    pub fn rounds_executed(&self) -> usize {
        self.history.len()
    }

    /// Record the final consensus and terminal cause.
    pub fn conclude(&mut self, result: ConsensusResult, termination: Termination) {
        self.outcome = Some((result, termination));
    }
}

/// The artifact returned to callers and handed to memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub ticker: String,
    /// Revision rounds executed (0 when consensus held on initial opinions)
    pub rounds: usize,
    pub decision: Signal,
    pub confidence: f64,
    pub termination: Termination,
    pub history: Vec<Round>,
    pub market_data: MarketSnapshot,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl fmt::Display for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} conf={:.2} rounds={} ({})",
            self.ticker, self.decision, self.confidence, self.rounds, self.termination,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Fatal outcomes of a debate session. Everything else degrades in place.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to fetch market data for {ticker}: {details}")]
    DataFetch { ticker: String, details: String },

    #[error("No participant produced an opinion for {ticker}")]
    EmptyPool { ticker: String },

    #[error("Critical system error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Stable machine-readable kind for the `{kind, details}` error surface.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::DataFetch { .. } => "data_fetch",
            SessionError::EmptyPool { .. } => "empty_pool",
            SessionError::Internal(_) => "internal",
        }
    }
}

/// Domain-specific error types for QUORUM.
#[derive(Debug, thiserror::Error)]
pub enum QuorumError {
    #[error("Participant error ({participant}): {message}")]
    Participant { participant: String, message: String },

    #[error("Data provider error ({data_source}): {message}")]
    DataProvider { data_source: String, message: String },

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Unparseable response: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn wo(name: &str, signal: Signal, conf: f64) -> WeightedOpinion {
        WeightedOpinion {
            participant: name.to_string(),
            weight: 1.0,
            opinion: Opinion::new(signal, conf, "test"),
        }
    }

    #[test]
    fn test_signal_display() {
        assert_eq!(format!("{}", Signal::Buy), "BUY");
        assert_eq!(format!("{}", Signal::Sell), "SELL");
        assert_eq!(format!("{}", Signal::Hold), "HOLD");
    }

    #[test]
    fn test_signal_from_str() {
        assert_eq!("buy".parse::<Signal>().unwrap(), Signal::Buy);
        assert_eq!(" SELL ".parse::<Signal>().unwrap(), Signal::Sell);
        assert_eq!("Hold".parse::<Signal>().unwrap(), Signal::Hold);
        assert!("moon".parse::<Signal>().is_err());
    }

    #[test]
    fn test_signal_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Signal::Buy).unwrap(), "\"BUY\"");
        let parsed: Signal = serde_json::from_str("\"HOLD\"").unwrap();
        assert_eq!(parsed, Signal::Hold);
    }

    #[test]
    fn test_signal_priority_order() {
        assert_eq!(Signal::PRIORITY, [Signal::Buy, Signal::Sell, Signal::Hold]);
        for (i, s) in Signal::PRIORITY.iter().enumerate() {
            assert_eq!(s.rank(), i);
        }
    }

    #[test]
    fn test_opinion_clamps_confidence() {
        assert_eq!(Opinion::new(Signal::Buy, 1.7, "").confidence, 1.0);
        assert_eq!(Opinion::new(Signal::Buy, -0.2, "").confidence, 0.0);
        assert_eq!(Opinion::new(Signal::Buy, f64::NAN, "").confidence, 0.0);
    }

    #[test]
    fn test_opinion_fallback() {
        let op = Opinion::fallback("connection reset");
        assert_eq!(op.signal, Signal::Hold);
        assert_eq!(op.confidence, 0.0);
        assert_eq!(op.reasoning, "agent error: connection reset");
    }

    #[test]
    fn test_weighted_opinion_display() {
        assert_eq!(format!("{}", wo("Grok Agent", Signal::Sell, 0.8)), "Grok Agent: SELL (Conf: 0.8)");
    }

    #[test]
    fn test_round_without() {
        let round = Round {
            index: 0,
            opinions: vec![wo("a", Signal::Buy, 0.5), wo("b", Signal::Sell, 0.5)],
            carried_forward: vec!["a".to_string()],
        };
        let others = round.without("a");
        assert_eq!(others.opinions.len(), 1);
        assert_eq!(others.opinions[0].participant, "b");
        assert!(others.carried_forward.is_empty());
        assert_eq!(round.fresh_count(), 1);
    }

    #[test]
    fn test_session_set_current_most_recent_wins() {
        let mut session = DebateSession::new("BTC-USD");
        session.set_current(vec![
            wo("a", Signal::Buy, 0.5),
            wo("b", Signal::Sell, 0.5),
            wo("a", Signal::Hold, 0.9),
        ]);
        assert_eq!(session.current_opinions().len(), 2);
        assert_eq!(session.current_opinions()[0].participant, "a");
        assert_eq!(session.current_for("a").unwrap().opinion.signal, Signal::Hold);
    }

    #[test]
    fn test_session_others_history_excludes_self() {
        let mut session = DebateSession::new("ETH-USD");
        session.history.push(Round {
            index: 0,
            opinions: vec![wo("a", Signal::Buy, 0.5), wo("b", Signal::Sell, 0.5)],
            carried_forward: vec![],
        });
        let history = session.others_history("a");
        assert_eq!(history.len(), 1);
        assert!(history[0].opinions.iter().all(|o| o.participant != "a"));
        assert_eq!(session.rounds_executed(), 1);
    }

    #[test]
    fn test_session_error_kind() {
        let e = SessionError::DataFetch {
            ticker: "BTC-USD".into(),
            details: "timeout".into(),
        };
        assert_eq!(e.kind(), "data_fetch");
        assert_eq!(format!("{e}"), "Failed to fetch market data for BTC-USD: timeout");
        assert_eq!(SessionError::EmptyPool { ticker: "X".into() }.kind(), "empty_pool");
        assert_eq!(SessionError::Internal("boom".into()).kind(), "internal");
    }

    #[test]
    fn test_termination_serializes_snake_case() {
        let json = serde_json::to_string(&Termination::RoundsExhausted).unwrap();
        assert_eq!(json, "\"rounds_exhausted\"");
        assert_eq!(format!("{}", Termination::DeadlineExceeded), "deadline_exceeded");
    }

    #[test]
    fn test_quorum_error_display() {
        let e = QuorumError::Participant {
            participant: "Gemini Agent".to_string(),
            message: "HTTP 503".to_string(),
        };
        assert_eq!(format!("{e}"), "Participant error (Gemini Agent): HTTP 503");
    }

    #[test]
    fn test_snapshot_display() {
        let snap = MarketSnapshot::sample("BTC-USD");
        let s = format!("{snap}");
        assert!(s.contains("BTC-USD"));
        assert!(s.contains("+1.25%"));
    }
}

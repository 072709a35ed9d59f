//! Scripted collaborators for integration testing.
//!
//! Participants follow a fixed script per call, the market feed returns a
//! fixed snapshot, and the memory store records what it was handed. All
//! state is in-memory with no external dependencies.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quorum::config::EngineConfig;
use quorum::data::MarketDataProvider;
use quorum::engine::Coordinator;
use quorum::memory::MemoryStore;
use quorum::participants::{Participant, ParticipantProfile};
use quorum::types::{MarketSnapshot, Opinion, Round, SessionRecord, Signal};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Step {
    Answer(Signal, f64),
    Fail(&'static str),
    Sleep(Duration, Signal, f64),
    Panic,
}

impl Step {
    async fn play(&self) -> Result<Opinion> {
        match self {
            Step::Answer(signal, confidence) => Ok(Opinion::new(*signal, *confidence, "scripted")),
            Step::Fail(msg) => Err(anyhow!("{msg}")),
            Step::Sleep(delay, signal, confidence) => {
                tokio::time::sleep(*delay).await;
                Ok(Opinion::new(*signal, *confidence, "slow"))
            }
            Step::Panic => panic!("scripted panic"),
        }
    }
}

/// What a participant saw on one `revise` call.
#[derive(Debug, Clone)]
pub struct RevisionCall {
    pub context: String,
    pub others: Vec<Round>,
}

/// A participant that replays a fixed script.
///
/// `analyze` plays `initial`; the n-th `revise` plays `revisions[n]`,
/// repeating the last step once the script runs out.
pub struct ScriptedParticipant {
    profile: ParticipantProfile,
    initial: Step,
    revisions: Vec<Step>,
    revise_count: AtomicUsize,
    seen: Mutex<Vec<RevisionCall>>,
}

impl ScriptedParticipant {
    pub fn new(name: &str, weight: f64, initial: Step, revisions: Vec<Step>) -> Self {
        Self {
            profile: ParticipantProfile {
                name: name.to_string(),
                model: "scripted".to_string(),
                role: "test".to_string(),
                weight,
                temperature: 0.0,
            },
            initial,
            revisions,
            revise_count: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Same answer for analysis and every revision.
    pub fn steady(name: &str, weight: f64, signal: Signal, confidence: f64) -> Self {
        Self::new(
            name,
            weight,
            Step::Answer(signal, confidence),
            vec![Step::Answer(signal, confidence)],
        )
    }

    pub fn revise_calls(&self) -> usize {
        self.revise_count.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<RevisionCall> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn profile(&self) -> &ParticipantProfile {
        &self.profile
    }

    async fn analyze(&self, _snapshot: &MarketSnapshot) -> Result<Opinion> {
        self.initial.play().await
    }

    async fn revise(&self, context: &str, others: &[Round]) -> Result<Opinion> {
        let n = self.revise_count.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(RevisionCall {
            context: context.to_string(),
            others: others.to_vec(),
        });
        let step = self
            .revisions
            .get(n)
            .or(self.revisions.last())
            .cloned()
            .unwrap_or(Step::Fail("no script"));
        step.play().await
    }
}

/// Market feed returning a fixed snapshot, or failing on demand. Counts
/// the calls it receives.
pub struct StaticFeed {
    pub fail_with: Option<&'static str>,
    market_calls: AtomicUsize,
    news_calls: AtomicUsize,
}

impl StaticFeed {
    pub fn ok() -> Self {
        Self {
            fail_with: None,
            market_calls: AtomicUsize::new(0),
            news_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(msg: &'static str) -> Self {
        Self {
            fail_with: Some(msg),
            ..Self::ok()
        }
    }

    pub fn market_calls(&self) -> usize {
        self.market_calls.load(Ordering::SeqCst)
    }

    pub fn news_calls(&self) -> usize {
        self.news_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for StaticFeed {
    async fn get_market_data(&self, ticker: &str) -> Result<MarketSnapshot> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_with {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(MarketSnapshot::sample(ticker)),
        }
    }

    async fn get_news(&self, ticker: &str) -> Result<Vec<String>> {
        self.news_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![format!("{ticker} headline")])
    }
}

/// Memory store that hands back a fixed context and records stores.
pub struct RecordingMemory {
    pub context: String,
    pub fail_store: bool,
    pub stored: Mutex<Vec<SessionRecord>>,
}

impl RecordingMemory {
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
            fail_store: false,
            stored: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_store: true,
            ..Self::new("No historical context available.")
        }
    }

    pub fn stored(&self) -> Vec<SessionRecord> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryStore for RecordingMemory {
    async fn get_context(&self, _ticker: &str) -> String {
        self.context.clone()
    }

    async fn store_experience(&self, _ticker: &str, record: &SessionRecord) -> Result<()> {
        if self.fail_store {
            return Err(anyhow!("memory backend unavailable"));
        }
        self.stored.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub fn engine(max_rounds: usize) -> EngineConfig {
    EngineConfig {
        consensus_threshold: 0.70,
        max_rounds,
        participant_timeout_secs: 5,
        session_deadline_secs: 60,
    }
}

pub fn coordinator(
    participants: Vec<Arc<ScriptedParticipant>>,
    memory: Arc<RecordingMemory>,
    config: EngineConfig,
) -> Coordinator {
    let pool: Vec<Arc<dyn Participant>> = participants
        .into_iter()
        .map(|p| p as Arc<dyn Participant>)
        .collect();
    Coordinator::new(pool, Arc::new(StaticFeed::ok()), memory, config)
}

//! Debate coordinator.
//!
//! Drives one session per request through
//! GATHERING → ANALYZING → ROUND[0..max) → concluded:
//! 1. Fetch the market snapshot and headlines (fatal on failure)
//! 2. Fan out `analyze` to every participant; failures become HOLD/0.0
//! 3. Each round: stop if consensus clears the threshold, otherwise fan
//!    out `revise`; failures carry the previous opinion forward
//! 4. Compute the final consensus, build the record, store it in memory
//!
//! Every participant call runs concurrently under its own timeout, capped
//! by the session deadline, and panics are caught at the call site. A
//! round is a barrier: aggregation waits for every call to answer, fail,
//! or time out.

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::{consensus, context, record};
use crate::config::EngineConfig;
use crate::data::MarketDataProvider;
use crate::memory::MemoryStore;
use crate::participants::Participant;
use crate::types::{
    DebateSession, MarketSnapshot, Opinion, Round, SessionError, SessionRecord, Termination, WeightedOpinion,
};

// ---------------------------------------------------------------------------
// Call outcomes
// ---------------------------------------------------------------------------

/// Why a single participant call produced no opinion.
#[derive(Debug, Clone, PartialEq)]
pub enum ParticipantFailure {
    /// The participant returned an error.
    Error(String),
    /// The per-call budget elapsed.
    TimedOut(Duration),
    /// The participant's future panicked.
    Panicked(String),
    /// The session deadline elapsed before the call could finish.
    Abandoned,
}

impl fmt::Display for ParticipantFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantFailure::Error(msg) => write!(f, "{msg}"),
            ParticipantFailure::TimedOut(budget) => write!(f, "timed out after {}s", budget.as_secs_f64()),
            ParticipantFailure::Panicked(msg) => write!(f, "panicked: {msg}"),
            ParticipantFailure::Abandoned => write!(f, "abandoned at session deadline"),
        }
    }
}

/// Result of one `analyze` or `revise` call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Answered(Opinion),
    Failed(ParticipantFailure),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Await one participant call under `min(now + per_call, deadline)`.
async fn guarded_call<F>(call: F, per_call: Duration, deadline: Instant) -> CallOutcome
where
    F: Future<Output = anyhow::Result<Opinion>>,
{
    let now = Instant::now();
    if now >= deadline {
        return CallOutcome::Failed(ParticipantFailure::Abandoned);
    }
    let own_budget = now + per_call;
    let cutoff = own_budget.min(deadline);

    match tokio::time::timeout_at(cutoff, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(Ok(opinion))) => CallOutcome::Answered(opinion),
        Ok(Ok(Err(e))) => CallOutcome::Failed(ParticipantFailure::Error(format!("{e:#}"))),
        Ok(Err(payload)) => CallOutcome::Failed(ParticipantFailure::Panicked(panic_message(payload.as_ref()))),
        Err(_) if cutoff < own_budget => CallOutcome::Failed(ParticipantFailure::Abandoned),
        Err(_) => CallOutcome::Failed(ParticipantFailure::TimedOut(per_call)),
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct Coordinator {
    participants: Vec<Arc<dyn Participant>>,
    feed: Arc<dyn MarketDataProvider>,
    memory: Arc<dyn MemoryStore>,
    config: EngineConfig,
}

impl Coordinator {
    pub fn new(
        participants: Vec<Arc<dyn Participant>>,
        feed: Arc<dyn MarketDataProvider>,
        memory: Arc<dyn MemoryStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            participants,
            feed,
            memory,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Participant names in pool order.
    pub fn participant_names(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.profile().name.clone()).collect()
    }

    /// Run one full debate for `ticker`.
    ///
    /// Returns a complete record, or a typed error when market data can't
    /// be fetched or no participant produced an opinion.
    pub async fn run_debate(&self, ticker: &str) -> Result<SessionRecord, SessionError> {
        let session = DebateSession::new(ticker);
        let span = info_span!("debate_session", ticker, session_id = %session.id);
        self.drive(session).instrument(span).await
    }

    async fn drive(&self, mut session: DebateSession) -> Result<SessionRecord, SessionError> {
        let deadline = Instant::now() + self.config.session_deadline();
        let ticker = session.ticker.clone();

        // GATHERING
        info!(participants = self.participants.len(), "Gathering market data");
        let snapshot = match self.gather(&ticker, deadline).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Session failed during gathering");
                return Err(e);
            }
        };
        let historical = self.memory.get_context(&ticker).await;
        debug!(context_len = historical.len(), "Historical context loaded");

        // ANALYZING
        let initial = self.analyze_all(&snapshot, deadline).await;
        let Some(initial) = initial else {
            let e = SessionError::EmptyPool { ticker: ticker.clone() };
            error!(error = %e, "Session failed during analysis");
            return Err(e);
        };
        session.set_current(initial);
        info!(
            interim = %consensus::calculate(session.current_opinions()),
            "Initial analysis complete"
        );

        // ROUND loop
        let termination = self.debate(&mut session, &historical, deadline).await;

        let result = consensus::calculate(session.current_opinions());
        session.conclude(result, termination);
        let record = record::build(&session, &snapshot)?;
        info!(
            decision = %record.decision,
            confidence = record.confidence,
            rounds = record.rounds,
            termination = %record.termination,
            "Debate concluded"
        );

        if let Err(e) = self.memory.store_experience(&ticker, &record).await {
            warn!(error = %e, "Failed to store session in memory");
        }
        Ok(record)
    }

    async fn gather(&self, ticker: &str, deadline: Instant) -> Result<MarketSnapshot, SessionError> {
        let fetch = async {
            let mut snapshot = self.feed.get_market_data(ticker).await?;
            snapshot.news = self.feed.get_news(ticker).await?;
            anyhow::Ok(snapshot)
        };

        match tokio::time::timeout_at(deadline, fetch).await {
            Ok(Ok(snapshot)) => {
                debug!(price = snapshot.price, rsi = snapshot.rsi, news = snapshot.news.len(), "Snapshot fetched");
                Ok(snapshot)
            }
            Ok(Err(e)) => Err(SessionError::DataFetch {
                ticker: ticker.to_string(),
                details: format!("{e:#}"),
            }),
            Err(_) => Err(SessionError::DataFetch {
                ticker: ticker.to_string(),
                details: "session deadline elapsed while fetching market data".to_string(),
            }),
        }
    }

    /// Initial opinions in pool order, or `None` if nobody answered.
    async fn analyze_all(&self, snapshot: &MarketSnapshot, deadline: Instant) -> Option<Vec<WeightedOpinion>> {
        let per_call = self.config.participant_timeout();
        let calls = self.participants.iter().map(|p| async move {
            let outcome = guarded_call(p.analyze(snapshot), per_call, deadline).await;
            (p, outcome)
        });
        let outcomes = join_all(calls).await;

        let mut answered = 0;
        let mut opinions = Vec::with_capacity(outcomes.len());
        for (participant, outcome) in outcomes {
            let profile = participant.profile();
            let opinion = match outcome {
                CallOutcome::Answered(opinion) => {
                    answered += 1;
                    debug!(participant = %profile.name, %opinion, "Analysis received");
                    opinion
                }
                CallOutcome::Failed(failure) => {
                    warn!(participant = %profile.name, %failure, "Analysis failed, using fallback opinion");
                    Opinion::fallback(failure)
                }
            };
            opinions.push(profile.weighted(opinion));
        }

        (answered > 0).then_some(opinions)
    }

    /// Run revision rounds until consensus, exhaustion, a dead round, or
    /// the deadline.
    async fn debate(&self, session: &mut DebateSession, historical: &str, deadline: Instant) -> Termination {
        let threshold = self.config.consensus_threshold;

        for index in 0..self.config.max_rounds {
            let briefing = context::assemble(historical, session.current_opinions());
            let interim = consensus::calculate(session.current_opinions());
            if interim.confidence >= threshold {
                info!(round = index, consensus = %interim, "Consensus reached");
                return Termination::Consensus;
            }
            if Instant::now() >= deadline {
                warn!(round = index, "Session deadline elapsed before round");
                return Termination::DeadlineExceeded;
            }

            info!(round = index, interim = %interim, "Starting debate round");
            match self.revise_all(session, index, &briefing, deadline).await {
                Some(round) => {
                    session.set_current(round.opinions.clone());
                    debug!(round = index, fresh = round.fresh_count(), "Round complete");
                    session.history.push(round);
                }
                None => {
                    warn!(round = index, "No participant answered this round, keeping last opinions");
                    return Termination::RoundFailed;
                }
            }
        }

        Termination::RoundsExhausted
    }

    /// One revision pass. `None` when no participant answered fresh.
    async fn revise_all(
        &self,
        session: &DebateSession,
        index: usize,
        briefing: &str,
        deadline: Instant,
    ) -> Option<Round> {
        let per_call = self.config.participant_timeout();
        let calls = self.participants.iter().map(|p| {
            let others = session.others_history(&p.profile().name);
            async move {
                let outcome = guarded_call(p.revise(briefing, &others), per_call, deadline).await;
                (p, outcome)
            }
        });
        let outcomes = join_all(calls).await;

        let mut opinions = Vec::with_capacity(outcomes.len());
        let mut carried_forward = Vec::new();
        for (participant, outcome) in outcomes {
            let profile = participant.profile();
            match outcome {
                CallOutcome::Answered(opinion) => {
                    debug!(participant = %profile.name, round = index, %opinion, "Revision received");
                    opinions.push(profile.weighted(opinion));
                }
                CallOutcome::Failed(failure) => match session.current_for(&profile.name) {
                    Some(previous) => {
                        warn!(participant = %profile.name, round = index, %failure, "Revision failed, carrying opinion forward");
                        opinions.push(previous.clone());
                        carried_forward.push(profile.name.clone());
                    }
                    None => {
                        warn!(participant = %profile.name, round = index, %failure, "Revision failed with no prior opinion");
                    }
                },
            }
        }

        let round = Round {
            index,
            opinions,
            carried_forward,
        };
        (round.fresh_count() > 0).then_some(round)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Session record assembly.
//!
//! Packages the coordinator's final state into the artifact returned to
//! callers and stored in memory. Reads only what the session already
//! holds; consensus is never recomputed here.

use chrono::Utc;

use crate::types::{DebateSession, MarketSnapshot, SessionError, SessionRecord};

/// Build the record for a concluded session.
pub fn build(session: &DebateSession, market_data: &MarketSnapshot) -> Result<SessionRecord, SessionError> {
    let (result, termination) = session.outcome.ok_or_else(|| {
        SessionError::Internal(format!("session {} recorded before it concluded", session.id))
    })?;

    Ok(SessionRecord {
        session_id: session.id,
        ticker: session.ticker.clone(),
        rounds: session.rounds_executed(),
        decision: result.decision,
        confidence: result.confidence,
        termination,
        history: session.history.clone(),
        market_data: market_data.clone(),
        started_at: session.started_at,
        completed_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConsensusResult, Opinion, Round, Signal, Termination, WeightedOpinion};

    fn round(index: usize) -> Round {
        Round {
            index,
            opinions: vec![WeightedOpinion {
                participant: "Machine Agent".into(),
                weight: 1.1,
                opinion: Opinion::new(Signal::Sell, 0.4, "overbought"),
            }],
            carried_forward: vec![],
        }
    }

    #[test]
    fn test_build_copies_session_state() {
        let mut session = DebateSession::new("BTC-USD");
        session.history.push(round(0));
        session.history.push(round(1));
        // Deliberately inconsistent with the history to prove no recomputation.
        session.conclude(
            ConsensusResult { decision: Signal::Buy, confidence: 0.42 },
            Termination::RoundsExhausted,
        );
        let snap = MarketSnapshot::sample("BTC-USD");

        let record = build(&session, &snap).unwrap();
        assert_eq!(record.session_id, session.id);
        assert_eq!(record.rounds, 2);
        assert_eq!(record.decision, Signal::Buy);
        assert_eq!(record.confidence, 0.42);
        assert_eq!(record.termination, Termination::RoundsExhausted);
        assert_eq!(record.history, session.history);
        assert_eq!(record.market_data, snap);
        assert!(record.completed_at >= record.started_at);
    }

    #[test]
    fn test_build_unconcluded_is_internal_error() {
        let session = DebateSession::new("ETH-USD");
        let err = build(&session, &MarketSnapshot::sample("ETH-USD")).unwrap_err();
        assert_eq!(err.kind(), "internal");
    }

    #[test]
    fn test_record_json_shape() {
        let mut session = DebateSession::new("SOL-USD");
        session.conclude(ConsensusResult { decision: Signal::Hold, confidence: 0.8 }, Termination::Consensus);
        let record = build(&session, &MarketSnapshot::sample("SOL-USD")).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        for key in ["ticker", "rounds", "decision", "confidence", "history", "market_data"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["decision"], "HOLD");
        assert_eq!(json["termination"], "consensus");
    }
}

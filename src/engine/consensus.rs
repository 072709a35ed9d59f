//! Weighted-vote aggregation.
//!
//! Pure function over a slice of weighted opinions: per-signal score is
//! Σ(weight × confidence), normalized by Σ(weight) across all opinions.
//! The highest normalized score wins; ties resolve by
//! [`Signal::PRIORITY`] (BUY > SELL > HOLD).

use crate::types::{clamp_unit, ConsensusResult, Signal, WeightedOpinion};

/// Normalized score per signal, indexed by [`Signal::rank`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalScores {
    pub scores: [f64; 3],
    pub total_weight: f64,
}

impl SignalScores {
    pub fn get(&self, signal: Signal) -> f64 {
        self.scores[signal.rank()]
    }
}

/// Weight actually counted for an opinion. Non-finite or non-positive
/// weights contribute nothing.
fn effective_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// Compute normalized per-signal scores. Returns `None` when the total
/// weight is zero.
pub fn score(opinions: &[WeightedOpinion]) -> Option<SignalScores> {
    let mut raw = [0.0_f64; 3];
    let mut total_weight = 0.0;

    for op in opinions {
        let weight = effective_weight(op.weight);
        raw[op.opinion.signal.rank()] += weight * clamp_unit(op.opinion.confidence);
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return None;
    }

    Some(SignalScores {
        scores: raw.map(|s| clamp_unit(s / total_weight)),
        total_weight,
    })
}

/// Resolve a set of weighted opinions into a single decision.
///
/// Zero total weight (no opinions, or every weight zero) yields
/// `(HOLD, 0.0)`.
pub fn calculate(opinions: &[WeightedOpinion]) -> ConsensusResult {
    let Some(scores) = score(opinions) else {
        return ConsensusResult::NONE;
    };

    let mut best = Signal::PRIORITY[0];
    for signal in Signal::PRIORITY {
        // Strict comparison keeps the earlier signal on ties.
        if scores.get(signal) > scores.get(best) {
            best = signal;
        }
    }

    ConsensusResult {
        decision: best,
        confidence: scores.get(best),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

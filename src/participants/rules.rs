//! Rule-driven technical analyst.
//!
//! Deterministic and offline: reads RSI and 24 h change from the snapshot
//! for its initial call. During revision it re-reads the last snapshot it
//! analysed and weighs its own stance against the weighted majority of its
//! peers.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Participant, ParticipantProfile};
use crate::engine::context::{self, BriefedStance};
use crate::types::{MarketSnapshot, Opinion, Round, Signal};

const OVERSOLD_RSI: f64 = 30.0;
const OVERBOUGHT_RSI: f64 = 70.0;
/// Absolute 24 h move (percent) treated as momentum.
const MOMENTUM_PCT: f64 = 2.0;
const MAX_CONFIDENCE: f64 = 0.95;
/// Peers must out-convince us by this much before we switch sides.
const SWITCH_MARGIN: f64 = 0.10;
/// Weight assumed for a peer with no revision history yet.
const DEFAULT_PEER_WEIGHT: f64 = 1.0;

pub struct RuleParticipant {
    profile: ParticipantProfile,
    last_snapshot: Mutex<Option<MarketSnapshot>>,
}

impl RuleParticipant {
    pub fn new(profile: ParticipantProfile) -> Self {
        Self {
            profile,
            last_snapshot: Mutex::new(None),
        }
    }

    /// Initial call from RSI extremes first, then momentum, else HOLD.
    pub fn evaluate(snapshot: &MarketSnapshot) -> Opinion {
        let rsi = snapshot.rsi;
        let change = snapshot.change_24h;

        if rsi <= OVERSOLD_RSI {
            let depth = (OVERSOLD_RSI - rsi) / OVERSOLD_RSI;
            return Opinion::new(
                Signal::Buy,
                (0.6 + depth * 0.35).min(MAX_CONFIDENCE),
                format!("RSI {rsi:.1} is oversold"),
            );
        }
        if rsi >= OVERBOUGHT_RSI {
            let depth = (rsi - OVERBOUGHT_RSI) / (100.0 - OVERBOUGHT_RSI);
            return Opinion::new(
                Signal::Sell,
                (0.6 + depth * 0.35).min(MAX_CONFIDENCE),
                format!("RSI {rsi:.1} is overbought"),
            );
        }
        if change.abs() >= MOMENTUM_PCT {
            let strength = ((change.abs() - MOMENTUM_PCT) / 8.0).min(1.0);
            let signal = if change > 0.0 { Signal::Buy } else { Signal::Sell };
            return Opinion::new(
                signal,
                0.5 + strength * 0.3,
                format!("24h move of {change:+.2}% with neutral RSI {rsi:.1}"),
            );
        }

        let centrality = 1.0 - ((rsi - 50.0).abs() / 20.0).min(1.0);
        Opinion::new(
            Signal::Hold,
            0.5 + centrality * 0.2,
            format!("No edge: RSI {rsi:.1}, 24h {change:+.2}%"),
        )
    }

    /// Most recent weight per peer, read from the others' round history.
    pub fn peer_weights(others: &[Round]) -> HashMap<&str, f64> {
        let mut weights = HashMap::new();
        for round in others {
            for op in &round.opinions {
                weights.insert(op.participant.as_str(), op.weight);
            }
        }
        weights
    }

    /// Signal with the largest weighted share of peer conviction,
    /// Σ(w·c) for the signal over Σw of all peers. Ties by priority.
    fn peer_leader(peers: &[&BriefedStance], weights: &HashMap<&str, f64>) -> Option<(Signal, f64)> {
        let weighted: Vec<(Signal, f64, f64)> = peers
            .iter()
            .map(|p| {
                let w = weights
                    .get(p.participant.as_str())
                    .copied()
                    .unwrap_or(DEFAULT_PEER_WEIGHT);
                (p.signal, w, w * p.confidence)
            })
            .collect();
        let total: f64 = weighted.iter().map(|(_, w, _)| w).sum();
        if total <= 0.0 {
            return None;
        }

        let mut best: Option<(Signal, f64)> = None;
        for signal in Signal::PRIORITY {
            let backing: Vec<f64> = weighted
                .iter()
                .filter(|(s, _, _)| *s == signal)
                .map(|(_, _, score)| *score)
                .collect();
            if backing.is_empty() {
                continue;
            }
            let share = backing.iter().sum::<f64>() / total;
            if best.map_or(true, |(_, b)| share > b) {
                best = Some((signal, share));
            }
        }
        best
    }

    /// Revise from the stances listed in a round briefing, weighting peers
    /// by `others` and falling back to `snapshot` when the briefing does not
    /// list our own stance.
    pub fn reconsider(
        &self,
        stances: &[BriefedStance],
        others: &[Round],
        snapshot: Option<&MarketSnapshot>,
    ) -> Result<Opinion> {
        let name = &self.profile.name;
        let own = stances
            .iter()
            .find(|s| &s.participant == name)
            .map(|s| (s.signal, s.confidence))
            .or_else(|| {
                snapshot.map(|snap| {
                    let fresh = Self::evaluate(snap);
                    (fresh.signal, fresh.confidence)
                })
            });
        let peers: Vec<&BriefedStance> = stances.iter().filter(|s| &s.participant != name).collect();
        let weights = Self::peer_weights(others);

        let opinion = match (own, Self::peer_leader(&peers, &weights)) {
            (None, None) => anyhow::bail!("briefing lists no opinions to revise against"),
            (Some((signal, confidence)), None) => {
                Opinion::new(signal, confidence, "No peer stances; holding position")
            }
            (None, Some((signal, share))) => {
                Opinion::new(signal, share / 2.0, "Own stance unknown; leaning with peers")
            }
            (Some((own_signal, own_conf)), Some((signal, share))) => {
                if signal != own_signal && share > own_conf + SWITCH_MARGIN {
                    Opinion::new(
                        signal,
                        (own_conf + share) / 2.0,
                        format!("Peers favour {signal} at {share:.2}, above my {own_conf:.2}"),
                    )
                } else if signal == own_signal {
                    Opinion::new(
                        own_signal,
                        (own_conf + share) / 2.0 + 0.05,
                        format!("Peers agree on {signal}; conviction raised"),
                    )
                } else {
                    let tape = snapshot
                        .map(|snap| format!(" (RSI {:.1}, 24h {:+.2}%)", snap.rsi, snap.change_24h))
                        .unwrap_or_default();
                    Opinion::new(
                        own_signal,
                        own_conf,
                        format!("Peers favour {signal} but not decisively{tape}"),
                    )
                }
            }
        };
        Ok(opinion)
    }
}

#[async_trait]
impl Participant for RuleParticipant {
    fn profile(&self) -> &ParticipantProfile {
        &self.profile
    }

    async fn analyze(&self, snapshot: &MarketSnapshot) -> Result<Opinion> {
        let opinion = Self::evaluate(snapshot);
        debug!(participant = %self.profile.name, %opinion, "Rule analysis");
        *self.last_snapshot.lock().await = Some(snapshot.clone());
        Ok(opinion)
    }

    async fn revise(&self, context: &str, others: &[Round]) -> Result<Opinion> {
        let snapshot = self.last_snapshot.lock().await;
        self.reconsider(&context::parse_summary(context), others, snapshot.as_ref())
    }
}

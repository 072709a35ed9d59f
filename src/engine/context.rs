//! Debate briefing assembly.
//!
//! The briefing handed to every participant's `revise` call in a round is
//! the historical context from memory followed by a deterministic summary
//! of the opinions currently in force. It is identical for all
//! participants of a round.

use crate::types::{Signal, WeightedOpinion};

/// Header of the current-opinion summary block.
pub const SUMMARY_HEADER: &str = "Current Opinions:";

/// One line per opinion, in pool order.
pub fn summarize(opinions: &[WeightedOpinion]) -> String {
    let mut summary = format!("{SUMMARY_HEADER}\n");
    for op in opinions {
        summary.push_str(&op.to_string());
        summary.push('\n');
    }
    summary
}

/// Historical context, a blank line, then the current-opinion summary.
pub fn assemble(historical_context: &str, current: &[WeightedOpinion]) -> String {
    format!("{historical_context}\n\n{}", summarize(current))
}

/// A stance read back from a briefing's summary block.
#[derive(Debug, Clone, PartialEq)]
pub struct BriefedStance {
    pub participant: String,
    pub signal: Signal,
    pub confidence: f64,
}

/// Recover the current-opinion lines from an assembled briefing.
///
/// Lines that do not match `name: SIGNAL (Conf: x)` are skipped.
pub fn parse_summary(briefing: &str) -> Vec<BriefedStance> {
    let Some(start) = briefing.rfind(SUMMARY_HEADER) else {
        return Vec::new();
    };

    briefing[start + SUMMARY_HEADER.len()..]
        .lines()
        .filter_map(|line| {
            let (stance, conf) = line.rsplit_once(" (Conf: ")?;
            let (name, signal) = stance.rsplit_once(": ")?;
            let confidence = conf.strip_suffix(')')?.trim().parse::<f64>().ok()?;
            Some(BriefedStance {
                participant: name.trim().to_string(),
                signal: signal.parse().ok()?,
                confidence,
            })
        })
        .collect()
}

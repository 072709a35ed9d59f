//! Voting participants.
//!
//! Defines the `Participant` trait every voting member implements, and the
//! factory that turns `[[participants]]` config entries into a pool:
//! - `llm`: model-driven analysts over OpenAI-compatible chat APIs
//!   (ChatGPT, Grok, Gemini)
//! - `rules`: a deterministic RSI/momentum technical analyst

pub mod llm;
pub mod rules;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::ParticipantConfig;
use crate::types::{MarketSnapshot, Opinion, Round, WeightedOpinion};
use llm::LlmParticipant;
use rules::RuleParticipant;

/// Immutable identity of a voting member.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantProfile {
    pub name: String,
    pub model: String,
    pub role: String,
    /// Fixed positive influence multiplier on confidence
    pub weight: f64,
    pub temperature: f64,
}

impl ParticipantProfile {
    /// Attach this participant's identity and weight to an opinion.
    pub fn weighted(&self, opinion: Opinion) -> WeightedOpinion {
        WeightedOpinion {
            participant: self.name.clone(),
            weight: self.weight,
            opinion,
        }
    }
}

impl From<&ParticipantConfig> for ParticipantProfile {
    fn from(cfg: &ParticipantConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            model: cfg.model.clone(),
            role: cfg.role.clone(),
            weight: cfg.weight,
            temperature: cfg.temperature,
        }
    }
}

/// Capability contract for a voting member.
///
/// Errors returned here never escape the coordinator: a failed `analyze`
/// becomes a HOLD fallback, a failed `revise` keeps the previous opinion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Participant: Send + Sync {
    fn profile(&self) -> &ParticipantProfile;

    /// Form an initial opinion from the market snapshot.
    async fn analyze(&self, snapshot: &MarketSnapshot) -> Result<Opinion>;

    /// Revise a stance given the round briefing and every other
    /// participant's prior-round opinions (never the caller's own).
    async fn revise(&self, context: &str, others: &[Round]) -> Result<Opinion>;
}

/// Participant variants the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantKind {
    OpenAi,
    Grok,
    Gemini,
    Rules,
}

impl fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantKind::OpenAi => write!(f, "openai"),
            ParticipantKind::Grok => write!(f, "grok"),
            ParticipantKind::Gemini => write!(f, "gemini"),
            ParticipantKind::Rules => write!(f, "rules"),
        }
    }
}

impl std::str::FromStr for ParticipantKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "chatgpt" | "gpt" => Ok(ParticipantKind::OpenAi),
            "grok" | "xai" => Ok(ParticipantKind::Grok),
            "gemini" | "google" => Ok(ParticipantKind::Gemini),
            "rules" | "machine" | "technical" => Ok(ParticipantKind::Rules),
            _ => Err(anyhow::anyhow!("Unknown participant kind: {s}")),
        }
    }
}

/// Build one participant from its config entry.
pub fn build_participant(cfg: &ParticipantConfig) -> Result<Arc<dyn Participant>> {
    let kind: ParticipantKind = cfg.kind.parse()?;
    let profile = ParticipantProfile::from(cfg);

    let participant: Arc<dyn Participant> = match kind {
        ParticipantKind::Rules => Arc::new(RuleParticipant::new(profile)),
        model_kind => {
            let api_key = crate::config::AppConfig::resolve_optional(cfg.api_key_env.as_deref());
            Arc::new(LlmParticipant::new(
                model_kind,
                profile,
                api_key,
                cfg.base_url.clone(),
                cfg.max_tokens,
            )?)
        }
    };
    Ok(participant)
}

/// Build the participant pool in config order.
pub fn build_pool(configs: &[ParticipantConfig]) -> Result<Vec<Arc<dyn Participant>>> {
    configs.iter().map(build_participant).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(kind: &str, name: &str) -> ParticipantConfig {
        ParticipantConfig {
            kind: kind.to_string(),
            name: name.to_string(),
            model: "m".to_string(),
            role: "r".to_string(),
            weight: 1.2,
            temperature: 0.5,
            api_key_env: Some("QUORUM_TEST_KEY_THAT_IS_NOT_SET".to_string()),
            base_url: None,
            max_tokens: None,
        }
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("ChatGPT".parse::<ParticipantKind>().unwrap(), ParticipantKind::OpenAi);
        assert_eq!("xai".parse::<ParticipantKind>().unwrap(), ParticipantKind::Grok);
        assert_eq!("GEMINI".parse::<ParticipantKind>().unwrap(), ParticipantKind::Gemini);
        assert_eq!("machine".parse::<ParticipantKind>().unwrap(), ParticipantKind::Rules);
        assert!("astrology".parse::<ParticipantKind>().is_err());
    }

    #[test]
    fn test_profile_weighted() {
        let profile = ParticipantProfile::from(&cfg("rules", "Machine Agent"));
        let w = profile.weighted(Opinion::new(crate::types::Signal::Sell, 0.5, "x"));
        assert_eq!(w.participant, "Machine Agent");
        assert_eq!(w.weight, 1.2);
    }

    #[test]
    fn test_build_pool_preserves_order() {
        let pool = build_pool(&[
            cfg("openai", "ChatGPT Agent"),
            cfg("grok", "Grok Agent"),
            cfg("gemini", "Gemini Agent"),
            cfg("rules", "Machine Agent"),
        ])
        .unwrap();
        let names: Vec<_> = pool.iter().map(|p| p.profile().name.clone()).collect();
        assert_eq!(names, ["ChatGPT Agent", "Grok Agent", "Gemini Agent", "Machine Agent"]);
    }

    #[test]
    fn test_build_pool_rejects_unknown_kind() {
        assert!(build_pool(&[cfg("astrology", "Nope")]).is_err());
    }
}

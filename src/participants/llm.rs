//! Model-driven participants over OpenAI-compatible chat APIs.
//!
//! One client serves ChatGPT, Grok and Gemini: all three expose the Chat
//! Completions wire format, differing only in base URL and the analytic
//! focus written into the prompt. Responses are asked for as JSON and
//! parsed leniently (markdown fences, surrounding prose, percentages).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Participant, ParticipantKind, ParticipantProfile};
use crate::types::{clamp_unit, MarketSnapshot, Opinion, QuorumError, Round, Signal};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const XAI_BASE_URL: &str = "https://api.x.ai/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Answer given when no API key is configured.
const DISABLED_REASON: &str = "participant disabled: missing API key";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct LlmParticipant {
    kind: ParticipantKind,
    profile: ParticipantProfile,
    http: Client,
    api_key: Option<SecretString>,
    base_url: String,
    max_tokens: u32,
}

impl LlmParticipant {
    pub fn new(
        kind: ParticipantKind,
        profile: ParticipantProfile,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
    ) -> Result<Self> {
        // Per-call deadlines are enforced by the coordinator.
        let http = Client::builder()
            .build()
            .context("Failed to build chat HTTP client")?;

        let base_url = base_url
            .unwrap_or_else(|| Self::default_base_url(kind).to_string())
            .trim_end_matches('/')
            .to_string();

        if api_key.is_none() {
            warn!(participant = %profile.name, kind = %kind, "API key not found, participant disabled");
        }

        Ok(Self {
            kind,
            profile,
            http,
            api_key: api_key.map(SecretString::new),
            base_url,
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    pub fn default_base_url(kind: ParticipantKind) -> &'static str {
        match kind {
            ParticipantKind::Grok => XAI_BASE_URL,
            ParticipantKind::Gemini => GEMINI_BASE_URL,
            _ => OPENAI_BASE_URL,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// What this participant pays attention to, by kind.
    fn focus(&self) -> &'static str {
        match self.kind {
            ParticipantKind::Grok => "Focus on social sentiment, hype and crowd momentum.",
            ParticipantKind::Gemini => "Focus on technical indicators: RSI, price change and volume.",
            _ => "Focus on fundamentals and the news flow.",
        }
    }

    pub fn analysis_prompt(&self, snapshot: &MarketSnapshot) -> Result<String> {
        let data = serde_json::to_string(snapshot).context("Failed to serialise snapshot")?;
        Ok(format!(
            "Role: {role}\n{focus}\n\nMarket data:\n{data}\n\n\
             Provide a trading decision as JSON with keys: \
             signal (BUY/SELL/HOLD), confidence (0.0-1.0), reasoning.",
            role = self.profile.role,
            focus = self.focus(),
        ))
    }

    pub fn revision_prompt(&self, context: &str, others: &[Round]) -> Result<String> {
        let history = serde_json::to_string(others).context("Failed to serialise debate history")?;
        Ok(format!(
            "Role: {role}\n{focus}\n\nContext:\n{context}\n\nOther participants' history:\n{history}\n\n\
             Critique these opinions and revise your stance if warranted.\n\
             Return JSON with keys: revised_signal (BUY/SELL/HOLD), revised_confidence (0.0-1.0), response.",
            role = self.profile.role,
            focus = self.focus(),
        ))
    }

    async fn call_api(&self, prompt: String) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("{DISABLED_REASON}"))?;

        let request = ChatRequest {
            model: self.profile.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.profile.temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Chat request failed for {}", self.profile.name))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(QuorumError::Participant {
                participant: self.profile.name.clone(),
                message: format!("HTTP {status}: {error_text}"),
            }
            .into());
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat response")?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Empty chat response from {}", self.profile.model))
    }
}

#[async_trait]
impl Participant for LlmParticipant {
    fn profile(&self) -> &ParticipantProfile {
        &self.profile
    }

    async fn analyze(&self, snapshot: &MarketSnapshot) -> Result<Opinion> {
        if !self.is_enabled() {
            return Ok(Opinion::new(Signal::Hold, 0.0, DISABLED_REASON));
        }
        debug!(participant = %self.profile.name, model = %self.profile.model, "Requesting analysis");
        let text = self.call_api(self.analysis_prompt(snapshot)?).await?;
        parse_opinion(&text, ["signal", "confidence", "reasoning"])
    }

    async fn revise(&self, context: &str, others: &[Round]) -> Result<Opinion> {
        if !self.is_enabled() {
            return Ok(Opinion::new(Signal::Hold, 0.0, DISABLED_REASON));
        }
        debug!(participant = %self.profile.name, rounds = others.len(), "Requesting revision");
        let text = self.call_api(self.revision_prompt(context, others)?).await?;
        parse_opinion(&text, ["revised_signal", "revised_confidence", "response"])
            .or_else(|_| parse_opinion(&text, ["signal", "confidence", "reasoning"]))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Locate the JSON object inside a model response.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some((_, rest)) = text.split_once("```json") {
        return rest.split("```").next().map(str::trim);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Read a confidence value given as a number, a numeric string, or a
/// percentage. Values above 1 are taken as percentages.
fn parse_confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    let scaled = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
    Some(clamp_unit(scaled))
}

/// Parse an opinion out of a model response using the given
/// `[signal, confidence, reasoning]` key names.
pub fn parse_opinion(text: &str, keys: [&str; 3]) -> Result<Opinion> {
    let [signal_key, confidence_key, reasoning_key] = keys;

    let json = extract_json(text)
        .ok_or_else(|| QuorumError::Parse(format!("no JSON object in response: {text:.80}")))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| QuorumError::Parse(format!("invalid JSON ({e}): {json:.80}")))?;

    let signal: Signal = value
        .get(signal_key)
        .and_then(Value::as_str)
        .ok_or_else(|| QuorumError::Parse(format!("missing '{signal_key}'")))?
        .parse()?;

    let confidence = value
        .get(confidence_key)
        .and_then(parse_confidence)
        .ok_or_else(|| QuorumError::Parse(format!("missing or invalid '{confidence_key}'")))?;

    let reasoning = value
        .get(reasoning_key)
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(Opinion::new(signal, confidence, reasoning))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

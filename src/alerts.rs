//! Trade-signal alerts over Telegram.
//!
//! A session whose final confidence is strictly above `min_confidence`
//! produces one message. Without a bot token and chat id the alert is only
//! logged. Delivery failures are logged and never surfaced to callers.

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{AlertsConfig, AppConfig};
use crate::types::SessionRecord;

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct AlertNotifier {
    http: Client,
    bot_token: Option<SecretString>,
    chat_id: Option<String>,
    min_confidence: f64,
    base_url: String,
}

impl AlertNotifier {
    pub fn new(
        bot_token: Option<String>,
        chat_id: Option<String>,
        min_confidence: f64,
        base_url: Option<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("QUORUM/0.1.0")
            .build()
            .context("Failed to build alert HTTP client")?;
        Ok(Self {
            http,
            bot_token: bot_token.map(SecretString::new),
            chat_id,
            min_confidence,
            base_url: base_url.unwrap_or_else(|| TELEGRAM_API.to_string()),
        })
    }

    pub fn from_config(cfg: &AlertsConfig) -> Result<Self> {
        let notifier = Self::new(
            AppConfig::resolve_optional(cfg.telegram_bot_token_env.as_deref()),
            AppConfig::resolve_optional(cfg.telegram_chat_id_env.as_deref()),
            cfg.min_confidence,
            None,
        )?;
        if !notifier.is_enabled() {
            info!("Telegram alerts disabled, alerts will be logged only");
        }
        Ok(notifier)
    }

    pub fn is_enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    pub fn should_alert(&self, record: &SessionRecord) -> bool {
        record.confidence > self.min_confidence
    }

    pub fn message(record: &SessionRecord) -> String {
        format!(
            "Trade Signal: {} {} (Conf: {:.2})",
            record.decision, record.ticker, record.confidence
        )
    }

    /// Alert on `record` if it clears the bar. Returns whether an alert
    /// was raised.
    pub async fn notify(&self, record: &SessionRecord) -> bool {
        if !self.should_alert(record) {
            debug!(ticker = %record.ticker, confidence = record.confidence, "Below alert threshold");
            return false;
        }

        let text = Self::message(record);
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            info!(alert = %text, "Trade alert");
            return true;
        };

        if let Err(e) = self.send(token, chat_id, &text).await {
            warn!(error = %e, ticker = %record.ticker, "Failed to deliver Telegram alert");
        } else {
            info!(ticker = %record.ticker, "Telegram alert sent");
        }
        true
    }

    async fn send(&self, token: &SecretString, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, token.expose_secret());
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Telegram request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram returned {status}: {body}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConsensusResult, DebateSession, MarketSnapshot, Signal, Termination};

    fn record(decision: Signal, confidence: f64) -> SessionRecord {
        let mut session = DebateSession::new("BTC-USD");
        session.conclude(ConsensusResult { decision, confidence }, Termination::Consensus);
        crate::engine::record::build(&session, &MarketSnapshot::sample("BTC-USD")).unwrap()
    }

    #[test]
    fn test_message_format() {
        assert_eq!(
            AlertNotifier::message(&record(Signal::Buy, 0.876)),
            "Trade Signal: BUY BTC-USD (Conf: 0.88)"
        );
    }

    #[test]
    fn test_threshold_is_strict() {
        let notifier = tokio_test::assert_ok!(AlertNotifier::new(None, None, 0.7, None));
        assert!(!notifier.should_alert(&record(Signal::Sell, 0.7)));
        assert!(notifier.should_alert(&record(Signal::Sell, 0.71)));
    }

    #[tokio::test]
    async fn test_disabled_notifier_logs_only() {
        let notifier = AlertNotifier::new(None, Some("42".into()), 0.7, None).unwrap();
        assert!(!notifier.is_enabled());
        assert!(notifier.notify(&record(Signal::Buy, 0.9)).await);
        assert!(!notifier.notify(&record(Signal::Buy, 0.5)).await);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let notifier = AlertNotifier::new(
            Some("token".into()),
            Some("42".into()),
            0.7,
            Some("http://127.0.0.1:1".into()),
        )
        .unwrap();
        assert!(notifier.is_enabled());
        assert!(notifier.notify(&record(Signal::Hold, 0.95)).await);
    }

    #[tokio::test]
    async fn test_send_error_omits_bot_token() {
        let notifier = AlertNotifier::new(None, None, 0.7, Some("http://127.0.0.1:1".into())).unwrap();
        let token = SecretString::new("123456:BOT-SECRET".into());
        let err = notifier.send(&token, "42", "hello").await.unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.contains("Telegram request failed"));
        assert!(!rendered.contains("BOT-SECRET"), "{rendered}");
    }
}

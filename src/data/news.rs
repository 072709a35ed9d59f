//! Headline provider.
//!
//! With a NewsAPI key, returns the five most recent English headlines
//! mentioning the ticker's base symbol. Without one, returns two
//! templated headlines chosen deterministically from the ticker so
//! offline runs stay reproducible.
//!
//! API: `https://newsapi.org/v2/everything`
//! Auth: API key via the `X-Api-Key` header. Free tier: 100 req/day.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{split_ticker, HeadlineSource};

const DEFAULT_BASE_URL: &str = "https://newsapi.org";
const PAGE_SIZE: usize = 5;
const TEMPLATED_COUNT: usize = 2;

const TEMPLATES: &[&str] = &[
    "{t} shows strong momentum.",
    "Analysts are skeptical about {t}'s recent rally.",
    "New regulation could impact {t}.",
    "Institutional interest in {t} is growing.",
];

// ---------------------------------------------------------------------------
// NewsAPI response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsArticle {
    #[serde(default)]
    title: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct NewsFeed {
    http: Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl NewsFeed {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("QUORUM/0.1.0")
            .build()
            .context("Failed to build news HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.map(SecretString::new),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Two distinct templates picked by a hash of the ticker.
    pub fn templated(ticker: &str) -> Vec<String> {
        let seed = ticker
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        (0..TEMPLATED_COUNT)
            .map(|i| TEMPLATES[(seed + i) % TEMPLATES.len()].replace("{t}", ticker))
            .collect()
    }

    async fn fetch(&self, key: &SecretString, ticker: &str) -> Result<Vec<String>> {
        let (base, _) = split_ticker(ticker);
        let url = format!(
            "{}/v2/everything?q={}&pageSize={PAGE_SIZE}&sortBy=publishedAt&language=en",
            self.base_url,
            urlencoding::encode(&base),
        );

        let resp = self
            .http
            .get(&url)
            .header("X-Api-Key", key.expose_secret())
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("NewsAPI request failed")?;
        let status = resp.status();
        let data: NewsApiResponse = resp
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to parse NewsAPI response")?;
        if !status.is_success() || data.status == "error" {
            anyhow::bail!(
                "NewsAPI returned {status}: {}",
                data.message.unwrap_or_default()
            );
        }

        Ok(data
            .articles
            .into_iter()
            .filter_map(|a| a.title)
            .filter(|t| !t.trim().is_empty())
            .take(PAGE_SIZE)
            .collect())
    }
}

#[async_trait]
impl HeadlineSource for NewsFeed {
    async fn headlines(&self, ticker: &str) -> Result<Vec<String>> {
        let Some(key) = &self.api_key else {
            return Ok(Self::templated(ticker));
        };

        let headlines = self.fetch(key, ticker).await?;
        if headlines.is_empty() {
            warn!(ticker, "NewsAPI returned no headlines");
        } else {
            debug!(ticker, count = headlines.len(), "Headlines fetched");
        }
        Ok(headlines)
    }

    fn name(&self) -> &str {
        if self.api_key.is_some() {
            "newsapi"
        } else {
            "templated"
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Short-term memory: the most recent session per ticker.
//!
//! Backed by Redis (`discussion:{TICKER}`, JSON, expiring after the
//! configured TTL). If Redis can't be reached at startup, or any later
//! command fails, the store switches to an in-process map for the rest of
//! its life. Concurrent writers for one ticker race; the last write wins.

use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::types::SessionRecord;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub fn discussion_key(ticker: &str) -> String {
    format!("discussion:{ticker}")
}

pub struct ShortTermMemory {
    redis: Option<MultiplexedConnection>,
    degraded: AtomicBool,
    local: RwLock<HashMap<String, (String, Instant)>>,
    ttl: Duration,
}

impl ShortTermMemory {
    /// In-process store only.
    pub fn local(ttl: Duration) -> Self {
        Self {
            redis: None,
            degraded: AtomicBool::new(true),
            local: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Connect to Redis, falling back to the in-process store on failure.
    pub async fn connect(redis_url: Option<&str>, ttl: Duration) -> Self {
        let Some(url) = redis_url else {
            info!("No Redis URL configured, short-term memory is in-process");
            return Self::local(ttl);
        };

        match Self::open(url).await {
            Ok(conn) => {
                info!(url, "Short-term memory connected to Redis");
                Self {
                    redis: Some(conn),
                    degraded: AtomicBool::new(false),
                    local: RwLock::new(HashMap::new()),
                    ttl,
                }
            }
            Err(e) => {
                warn!(url, error = %e, "Redis unavailable, using in-process short-term memory");
                Self::local(ttl)
            }
        }
    }

    async fn open(url: &str) -> Result<MultiplexedConnection> {
        let client = redis::Client::open(url).context("Invalid Redis URL")?;
        tokio::time::timeout(CONNECT_TIMEOUT, client.get_multiplexed_async_connection())
            .await
            .context("Redis connect timed out")?
            .context("Redis connect failed")
    }

    pub fn is_redis(&self) -> bool {
        self.redis.is_some() && !self.degraded.load(Ordering::Relaxed)
    }

    fn degrade(&self, error: &redis::RedisError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(error = %error, "Redis command failed, short-term memory now in-process");
        }
    }

    /// Remember `record` as the latest discussion for `ticker`.
    pub async fn store(&self, ticker: &str, record: &SessionRecord) -> Result<()> {
        let key = discussion_key(ticker);
        let json = serde_json::to_string(record).context("Failed to serialise session record")?;

        if let (Some(conn), false) = (&self.redis, self.degraded.load(Ordering::Relaxed)) {
            let res: redis::RedisResult<()> = conn.clone().set_ex(&key, &json, self.ttl.as_secs()).await;
            match res {
                Ok(()) => {
                    debug!(key, "Discussion stored in Redis");
                    return Ok(());
                }
                Err(e) => self.degrade(&e),
            }
        }

        let now = Instant::now();
        let mut local = self.local.write().await;
        local.retain(|_, (_, expires)| *expires > now);
        local.insert(key, (json, now + self.ttl));
        Ok(())
    }

    /// The latest unexpired discussion for `ticker`, if any.
    pub async fn recent(&self, ticker: &str) -> Result<Option<SessionRecord>> {
        let key = discussion_key(ticker);

        let json = match (&self.redis, self.degraded.load(Ordering::Relaxed)) {
            (Some(conn), false) => {
                let res: redis::RedisResult<Option<String>> = conn.clone().get(&key).await;
                match res {
                    Ok(value) => value,
                    Err(e) => {
                        self.degrade(&e);
                        self.recent_local(&key).await
                    }
                }
            }
            _ => self.recent_local(&key).await,
        };

        json.map(|j| serde_json::from_str(&j).context("Failed to parse stored discussion"))
            .transpose()
    }

    async fn recent_local(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let map = self.local.read().await;
            match map.get(key) {
                Some((json, expires)) if *expires > now => return Some(json.clone()),
                None => return None,
                Some(_) => {}
            }
        }
        self.local.write().await.remove(key);
        None
    }
}

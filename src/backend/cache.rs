//! Read-through result cache
//!
//! Keyed by exact query text with a fixed time-to-live. Entries are never
//! invalidated explicitly; they simply expire. Failed queries are not cached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::QueryBackend;
use crate::error::BackendError;
use crate::models::AggregateRow;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let (Ok(mut now), Ok(by)) = (self.now.lock(), chrono::Duration::from_std(by)) {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

struct CacheEntry {
    rows: Vec<AggregateRow>,
    /// `None` when the TTL is too large to represent
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl QueryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Vec<AggregateRow>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<AggregateRow>, E>>,
    {
        // Check cache first
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if entry.is_fresh(self.clock.now()) {
                    debug!("cache hit ({} rows)", entry.rows.len());
                    return Ok(entry.rows.clone());
                }
            }
        }

        debug!("cache miss");
        let rows = compute().await?;

        // Update cache
        {
            let now = self.clock.now();
            let expires_at = chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl));
            let mut entries = self.entries.write().await;
            entries.retain(|_, entry| entry.is_fresh(now));
            entries.insert(
                key.to_string(),
                CacheEntry {
                    rows: rows.clone(),
                    expires_at,
                },
            );
        }

        Ok(rows)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Any backend, fronted by the result cache
pub struct CachedBackend<B> {
    inner: B,
    cache: QueryCache,
    ttl: Duration,
}

impl<B: QueryBackend> CachedBackend<B> {
    pub fn new(inner: B, cache: QueryCache, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: QueryBackend> QueryBackend for CachedBackend<B> {
    async fn execute(&self, sql: &str) -> Result<Vec<AggregateRow>, BackendError> {
        self.cache
            .get_or_compute(sql, self.ttl, || self.inner.execute(sql))
            .await
    }
}

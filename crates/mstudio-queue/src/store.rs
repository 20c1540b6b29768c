//! Job record storage.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use mstudio_models::{JobId, RenderJob};

use crate::error::{QueueError, QueueResult};

/// Storage for job records.
///
/// `update` never recreates a record that has been removed or swept, so a
/// late writer cannot resurrect an evicted job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails if the id is already present.
    async fn insert(&self, job: RenderJob) -> QueueResult<()>;

    async fn get(&self, id: &JobId) -> QueueResult<Option<RenderJob>>;

    /// Replace an existing record. Returns `false` when it no longer exists.
    async fn update(&self, job: &RenderJob) -> QueueResult<bool>;

    async fn remove(&self, id: &JobId) -> QueueResult<bool>;

    /// Drop records created more than `retention` before `now`.
    async fn sweep(&self, retention: Duration, now: DateTime<Utc>) -> QueueResult<usize>;

    async fn len(&self) -> QueueResult<usize>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, RenderJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: RenderJob) -> QueueResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(QueueError::Duplicate(job.id.to_string()));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> QueueResult<Option<RenderJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update(&self, job: &RenderJob) -> QueueResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &JobId) -> QueueResult<bool> {
        Ok(self.jobs.write().await.remove(id).is_some())
    }

    async fn sweep(&self, retention: Duration, now: DateTime<Utc>) -> QueueResult<usize> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_expired(retention, now));
        let removed = before - jobs.len();
        if removed > 0 {
            info!(removed, remaining = jobs.len(), "Swept expired job records");
        }
        Ok(removed)
    }

    async fn len(&self) -> QueueResult<usize> {
        Ok(self.jobs.read().await.len())
    }
}

/// Configuration for [`RedisJobStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub redis_url: String,
    pub key_prefix: String,
    /// Records expire this long after insertion
    pub retention: Duration,
}

impl RedisStoreConfig {
    /// Returns `None` when `REDIS_URL` is unset, meaning the in-memory store is used.
    pub fn from_env(retention: Duration) -> Option<Self> {
        let redis_url = std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty())?;
        Some(Self {
            redis_url,
            key_prefix: std::env::var("REDIS_JOB_PREFIX")
                .unwrap_or_else(|_| "mstudio:job:".to_string()),
            retention,
        })
    }
}

/// Redis-backed store. Retention is enforced with key TTLs.
pub struct RedisJobStore {
    client: redis::Client,
    key_prefix: String,
    retention_secs: u64,
}

impl RedisJobStore {
    pub fn new(config: RedisStoreConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self {
            client,
            key_prefix: config.key_prefix,
            retention_secs: config.retention.num_seconds().max(1) as u64,
        })
    }

    fn key(&self, id: &JobId) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn insert(&self, job: RenderJob) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&job)?;

        let created: Option<String> = redis::cmd("SET")
            .arg(self.key(&job.id))
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(self.retention_secs)
            .query_async(&mut conn)
            .await?;

        if created.is_none() {
            return Err(QueueError::Duplicate(job.id.to_string()));
        }
        debug!(job_id = %job.id, "Stored job record");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> QueueResult<Option<RenderJob>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = redis::cmd("GET")
            .arg(self.key(id))
            .query_async(&mut conn)
            .await?;

        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, job: &RenderJob) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        // XX: only if present; KEEPTTL: keep the original expiry
        let updated: Option<String> = redis::cmd("SET")
            .arg(self.key(&job.id))
            .arg(payload)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await?;

        Ok(updated.is_some())
    }

    async fn remove(&self, id: &JobId) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let removed: u64 = redis::cmd("DEL")
            .arg(self.key(id))
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn sweep(&self, _retention: Duration, _now: DateTime<Utc>) -> QueueResult<usize> {
        // Keys carry their own TTL.
        Ok(0)
    }

    async fn len(&self) -> QueueResult<usize> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut count = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await?;
            count += keys.len();
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(count)
    }
}

//! # Keyword cache
//! In-memory snapshot of every category keyword, read on the pipeline's hot
//! path and refreshed wholesale in the background.
//!
//! The snapshot is an `Arc` behind a lock: reloads build a new snapshot off to
//! the side and swap the pointer, so a reader sees either the old or the new
//! set in full. Readers get filtered copies, never references into the live
//! snapshot.
//!
//! Construction never fails. If the first load errors the cache starts empty
//! and reloads lazily on the next read.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::{CategoryId, CategoryKeyword};
use crate::store::KeywordStore;

#[derive(Debug, thiserror::Error)]
pub enum KeywordCacheError {
    #[error("failed to load keywords: {0:#}")]
    Load(anyhow::Error),
}

/// How often and how stubbornly the background task refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub interval: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3600),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    keywords: Vec<CategoryKeyword>,
    last_updated: Option<DateTime<Utc>>,
}

pub struct KeywordCache {
    store: Arc<dyn KeywordStore>,
    snapshot: RwLock<Arc<Snapshot>>,
    policy: RefreshPolicy,
    cancel: CancellationToken,
}

impl KeywordCache {
    /// Loads the initial snapshot and starts the refresh task. A failed
    /// initial load is logged and the cache starts empty.
    pub async fn new(store: Arc<dyn KeywordStore>, policy: RefreshPolicy) -> Arc<Self> {
        let cache = Arc::new(Self {
            store,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            policy,
            cancel: CancellationToken::new(),
        });

        if let Err(e) = cache.load_keywords().await {
            warn!(target: "keywords", error = %e, "initial keyword load failed; starting empty");
        }

        spawn_refresh(Arc::downgrade(&cache), cache.cancel.clone(), policy);
        cache
    }

    /// Replaces the snapshot with a fresh full read from the store. On error
    /// the previous snapshot is left untouched.
    pub async fn load_keywords(&self) -> Result<(), KeywordCacheError> {
        let keywords = self
            .store
            .load_all_keywords()
            .await
            .map_err(KeywordCacheError::Load)?;
        let count = keywords.len();
        let next = Arc::new(Snapshot {
            keywords,
            last_updated: Some(Utc::now()),
        });
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
        info!(target: "keywords", count, "Loaded {count} keywords");
        Ok(())
    }

    /// Keywords whose category is in `category_ids`. An empty cache triggers
    /// one reload attempt first.
    pub async fn get_keywords_by_categories(
        &self,
        category_ids: &[CategoryId],
    ) -> Vec<CategoryKeyword> {
        let mut snap = self.current();
        if snap.keywords.is_empty() {
            warn!(target: "keywords", "keyword cache empty; reloading");
            if let Err(e) = self.load_keywords().await {
                warn!(target: "keywords", error = %e, "lazy keyword reload failed");
                return Vec::new();
            }
            snap = self.current();
        }

        let wanted: HashSet<CategoryId> = category_ids.iter().copied().collect();
        snap.keywords
            .iter()
            .filter(|k| wanted.contains(&k.category_id))
            .cloned()
            .collect()
    }

    /// Stops the background refresh. Reads keep working.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.current().keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.current().last_updated
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// One refresh cycle: up to `retry_attempts` loads with a fixed delay.
    async fn refresh_with_retry(&self) {
        let attempts = self.policy.retry_attempts.max(1);
        for attempt in 1..=attempts {
            match self.load_keywords().await {
                Ok(()) => return,
                Err(e) => {
                    counter!("keyword_cache_refresh_failures_total").increment(1);
                    warn!(target: "keywords", attempt, attempts, error = %e, "keyword refresh failed");
                }
            }
            if attempt < attempts {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.policy.retry_delay) => {}
                }
            }
        }
        warn!(target: "keywords", attempts, "keyword refresh gave up; keeping previous snapshot");
    }
}

impl Drop for KeywordCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_refresh(
    cache: Weak<KeywordCache>,
    cancel: CancellationToken,
    policy: RefreshPolicy,
) {
    tokio::spawn(async move {
        let period = policy.interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(cache) = cache.upgrade() else { break };
            cache.refresh_with_retry().await;
        }
        info!(target: "keywords", "keyword refresh task stopped");
    });
}

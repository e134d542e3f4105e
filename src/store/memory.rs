// src/store/memory.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use super::{EventId, KeywordStore, SubjectStore};
use crate::models::{
    CategoryId, CategoryKeyword, NewAutoEvent, PostId, SubjectId, SubjectWithDetails,
};

/// Reminder offset applied to every auto-created event.
pub const AUTO_EVENT_NOTIFICATION_TIMING: &str = "15m";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredEvent {
    pub id: EventId,
    pub subject_id: SubjectId,
    pub post_id: PostId,
    pub title: String,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub has_alarm: bool,
    pub notification_timing: String,
    pub created_at: DateTime<Utc>,
}

/// Seed file shape: `{"subjects": [...], "keywords": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub subjects: Vec<SubjectWithDetails>,
    #[serde(default)]
    pub keywords: Vec<CategoryKeyword>,
}

impl SeedData {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parsing seed json")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed data from {}", path.display()))?;
        Self::from_json_str(&content)
    }
}

#[derive(Debug, Default)]
struct Inner {
    subjects: Vec<SubjectWithDetails>,
    keywords: Vec<CategoryKeyword>,
    events: Vec<StoredEvent>,
    next_event_id: EventId,
}

/// Process-local store backing both persistence traits.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedData) -> Self {
        let store = Self::new();
        let (subjects, keywords) = (seed.subjects.len(), seed.keywords.len());
        for s in seed.subjects {
            store.upsert_subject(s);
        }
        for k in seed.keywords {
            store.add_keyword(k);
        }
        info!(subjects, keywords, "seeded in-memory store");
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a subject, or merges accounts/categories into an existing one
    /// with the same id. Accounts stay ordered by creation time.
    pub fn upsert_subject(&self, details: SubjectWithDetails) {
        let mut inner = self.write();
        let idx = match inner
            .subjects
            .iter()
            .position(|s| s.subject.id == details.subject.id)
        {
            Some(i) => {
                inner.subjects[i].subject = details.subject.clone();
                i
            }
            None => {
                inner
                    .subjects
                    .push(SubjectWithDetails::new(details.subject.clone()));
                inner.subjects.len() - 1
            }
        };
        let target = &mut inner.subjects[idx];
        for a in details.accounts {
            target.push_account(a);
        }
        for c in details.categories {
            target.push_category(c);
        }
        target.accounts.sort_by_key(|a| a.created_at);
    }

    pub fn add_keyword(&self, keyword: CategoryKeyword) {
        let mut inner = self.write();
        if !inner.keywords.iter().any(|k| k.id == keyword.id) {
            inner.keywords.push(keyword);
        }
    }

    pub fn events(&self) -> Vec<StoredEvent> {
        self.read().events.clone()
    }

    pub fn events_for_subject(&self, subject_id: SubjectId) -> Vec<StoredEvent> {
        self.read()
            .events
            .iter()
            .filter(|e| e.subject_id == subject_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SubjectStore for InMemoryStore {
    async fn load_subjects_with_details(&self) -> Result<Vec<SubjectWithDetails>> {
        Ok(self.read().subjects.clone())
    }

    async fn event_exists(&self, post_id: PostId, subject_id: SubjectId) -> Result<bool> {
        Ok(self
            .read()
            .events
            .iter()
            .any(|e| e.post_id == post_id && e.subject_id == subject_id))
    }

    async fn create_auto_event(&self, event: NewAutoEvent) -> Result<EventId> {
        let mut inner = self.write();
        inner.next_event_id += 1;
        let id = inner.next_event_id;
        inner.events.push(StoredEvent {
            id,
            subject_id: event.subject_id,
            post_id: event.post_id,
            title: event.title,
            description: event.description,
            category_id: event.category_id,
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            has_alarm: true,
            notification_timing: AUTO_EVENT_NOTIFICATION_TIMING.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

#[async_trait]
impl KeywordStore for InMemoryStore {
    async fn load_all_keywords(&self) -> Result<Vec<CategoryKeyword>> {
        Ok(self.read().keywords.clone())
    }
}

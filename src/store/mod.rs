//! Persistence boundary consumed by the pipeline and the keyword cache.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CategoryKeyword, NewAutoEvent, PostId, SubjectId, SubjectWithDetails};

pub mod memory;

pub use memory::{InMemoryStore, SeedData, StoredEvent};

pub type EventId = u64;

#[async_trait]
pub trait SubjectStore: Send + Sync {
    /// Every subject with its linked accounts and categories.
    async fn load_subjects_with_details(&self) -> Result<Vec<SubjectWithDetails>>;

    async fn event_exists(&self, post_id: PostId, subject_id: SubjectId) -> Result<bool>;

    /// Inserts an auto-created event. Alarm defaults are applied here.
    async fn create_auto_event(&self, event: NewAutoEvent) -> Result<EventId>;
}

#[async_trait]
pub trait KeywordStore: Send + Sync {
    async fn load_all_keywords(&self) -> Result<Vec<CategoryKeyword>>;
}

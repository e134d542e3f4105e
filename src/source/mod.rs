// src/source/mod.rs
//! External post source: the latest posts of one account, by handle.

use anyhow::Result;

use crate::models::ExternalPost;

pub mod http;

pub use http::HttpPostSource;

#[async_trait::async_trait]
pub trait PostSource: Send + Sync {
    /// Up to `limit` posts for `handle`, newest first.
    async fn get_latest_posts(&self, handle: &str, limit: usize) -> Result<Vec<ExternalPost>>;
    fn name(&self) -> &'static str;
}

/// Newest first by the `created_at` text (fixed-width, so lexical order is
/// chronological). Ties keep their upstream order.
pub fn newest_first(mut posts: Vec<ExternalPost>, limit: usize) -> Vec<ExternalPost> {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts.truncate(limit);
    posts
}

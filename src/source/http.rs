// src/source/http.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::{newest_first, PostSource};
use crate::models::{ExternalPost, ExternalPostsResponse};

/// HTTP client for `GET {base}/v1/posts/username/{handle}`.
#[derive(Clone)]
pub struct HttpPostSource {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpPostSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn posts_url(&self, handle: &str) -> String {
        format!("{}/v1/posts/username/{}", self.base_url, handle)
    }
}

#[async_trait]
impl PostSource for HttpPostSource {
    async fn get_latest_posts(&self, handle: &str, limit: usize) -> Result<Vec<ExternalPost>> {
        let t0 = std::time::Instant::now();
        let url = self.posts_url(handle);

        let rsp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| anyhow!("failed to fetch posts for {handle}: {e}"))?;

        if rsp.status() != StatusCode::OK {
            return Err(anyhow!(
                "API returned status {} for account {}",
                rsp.status().as_u16(),
                handle
            ));
        }

        let body: ExternalPostsResponse = rsp
            .json()
            .await
            .context("failed to unmarshal response")?;
        let fetched = body.posts.len();
        let posts = newest_first(body.posts, limit);

        histogram!("post_source_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        debug!(target: "source", fetched, kept = posts.len(), "fetched posts");
        Ok(posts)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_has_no_double_slash() {
        let s = HttpPostSource::new("http://127.0.0.1:8000/");
        assert_eq!(s.base_url(), "http://127.0.0.1:8000");
        assert_eq!(
            s.posts_url("mika"),
            "http://127.0.0.1:8000/v1/posts/username/mika"
        );
        assert_eq!(s.name(), "http");
    }
}

//! # Auto-event pipeline
//! Turns recent posts of every tracked subject into calendar events.
//!
//! One run: load all subjects, queue them, let a fixed pool of workers drain
//! the queue, and fold the per-subject outcomes into a [`BatchReport`].
//! Failures below the subject load (fetches, timestamps, writes) are recorded
//! as strings on the subject's outcome and never stop sibling work.
//!
//! Cancellation is a [`CancellationToken`] checked at every dequeue, around
//! every fetch and before every post. Stopping is not an error: whatever
//! finished is reported.

use chrono::Utc;
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extract;
use crate::keywords::KeywordCache;
use crate::metrics::ensure_metrics_described;
use crate::models::{
    BatchReport, CategoryId, CategoryKeyword, ExternalPost, NewAutoEvent, SubjectOutcome,
    SubjectWithDetails,
};
use crate::source::PostSource;
use crate::store::{EventId, SubjectStore};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to load subjects: {0:#}")]
    LoadSubjects(anyhow::Error),
    #[error("cancelled before any subject was processed")]
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub workers: usize,
    pub posts_per_account: usize,
    /// Zone the post source writes `createdAt` in.
    pub timezone: chrono_tz::Tz,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 10,
            posts_per_account: 5,
            timezone: chrono_tz::Asia::Tokyo,
        }
    }
}

#[derive(Clone)]
pub struct AutoEventPipeline {
    subjects: Arc<dyn SubjectStore>,
    keywords: Arc<KeywordCache>,
    source: Arc<dyn PostSource>,
    opts: PipelineOptions,
}

/// Why a post produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Exists,
    NoKeyword,
    NoTime,
}

impl Skip {
    fn label(self) -> &'static str {
        match self {
            Skip::Exists => "exists",
            Skip::NoKeyword => "no_keyword",
            Skip::NoTime => "no_time",
        }
    }
}

enum PostOutcome {
    Created(EventId),
    Skipped(Skip),
}

impl AutoEventPipeline {
    pub fn new(
        subjects: Arc<dyn SubjectStore>,
        keywords: Arc<KeywordCache>,
        source: Arc<dyn PostSource>,
    ) -> Self {
        Self {
            subjects,
            keywords,
            source,
            opts: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: PipelineOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Runs under a hard deadline, and stops early if `parent` is cancelled.
    pub async fn run_with_deadline(
        &self,
        parent: &CancellationToken,
        deadline: Duration,
    ) -> Result<BatchReport, PipelineError> {
        let token = parent.child_token();
        let timer = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                token.cancel();
            })
        };
        let result = self.process_auto_event_creation(token).await;
        timer.abort();
        result
    }

    /// One full run over every subject.
    pub async fn process_auto_event_creation(
        &self,
        cancel: CancellationToken,
    ) -> Result<BatchReport, PipelineError> {
        ensure_metrics_described();
        info!(target: "pipeline", "starting auto event processing");

        let subjects = tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            loaded = self.subjects.load_subjects_with_details() => {
                loaded.map_err(PipelineError::LoadSubjects)?
            }
        };
        let total = subjects.len();

        // Both queues are sized to the subject count, so neither side blocks.
        let (job_tx, job_rx) = mpsc::channel::<SubjectWithDetails>(total.max(1));
        let (result_tx, mut result_rx) = mpsc::channel::<SubjectOutcome>(total.max(1));

        let mut queued = 0usize;
        for subject in subjects {
            if cancel.is_cancelled() || job_tx.send(subject).await.is_err() {
                break;
            }
            queued += 1;
        }
        drop(job_tx);

        if queued == 0 && cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = JoinSet::new();
        for worker in 0..self.opts.workers.max(1) {
            let this = self.clone();
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                this.work(worker, jobs, results, cancel).await;
            });
        }
        drop(result_tx);

        let mut report = BatchReport::default();
        while let Some(outcome) = result_rx.recv().await {
            report.absorb(outcome);
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(target: "pipeline", error = %e, "worker task failed");
            }
        }

        gauge!("auto_events_last_run_ts").set(Utc::now().timestamp() as f64);
        info!(
            target: "pipeline",
            processed = report.processed_subjects,
            created = report.created_events,
            errors = report.errors.len(),
            cancelled = cancel.is_cancelled(),
            "Processed: {}, Created: {}, Errors: {}",
            report.processed_subjects,
            report.created_events,
            report.errors.len()
        );
        Ok(report)
    }

    async fn work(
        &self,
        worker: usize,
        jobs: Arc<Mutex<mpsc::Receiver<SubjectWithDetails>>>,
        results: mpsc::Sender<SubjectOutcome>,
        cancel: CancellationToken,
    ) {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = async { jobs.lock().await.recv().await } => job,
            };
            let Some(subject) = next else { break };
            let outcome = self.process_subject(&subject, &cancel).await;
            if results.send(outcome).await.is_err() {
                break;
            }
        }
        debug!(target: "pipeline", worker, "worker finished");
    }

    async fn process_subject(
        &self,
        details: &SubjectWithDetails,
        cancel: &CancellationToken,
    ) -> SubjectOutcome {
        let subject = &details.subject;
        let mut outcome = SubjectOutcome::new(subject);

        if details.accounts.is_empty() {
            debug!(target: "pipeline", subject_id = subject.id, "no linked accounts; skipping");
            return outcome;
        }

        let keywords = self
            .keywords
            .get_keywords_by_categories(&details.category_ids())
            .await;
        if keywords.is_empty() {
            debug!(target: "pipeline", subject_id = subject.id, "no keywords for categories; skipping");
            return outcome;
        }

        for account in &details.accounts {
            if cancel.is_cancelled() {
                return outcome;
            }
            let handle = account.handle();
            if handle.is_empty() {
                continue;
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return outcome,
                r = self.source.get_latest_posts(handle, self.opts.posts_per_account) => r,
            };
            let posts = match fetched {
                Ok(posts) => posts,
                Err(e) => {
                    counter!("auto_events_fetch_errors_total").increment(1);
                    warn!(
                        target: "pipeline",
                        subject_id = subject.id,
                        handle,
                        source = self.source.name(),
                        error = %e,
                        "post fetch failed"
                    );
                    outcome.record_error(format!("Failed to get posts for {handle}: {e:#}"));
                    continue;
                }
            };
            info!(
                target: "pipeline",
                handle,
                source = self.source.name(),
                count = posts.len(),
                "Fetched {} posts for account {handle}",
                posts.len()
            );

            for post in &posts {
                if cancel.is_cancelled() {
                    return outcome;
                }
                match self.process_post(details, &keywords, post).await {
                    Ok(PostOutcome::Created(_)) => outcome.created_events += 1,
                    Ok(PostOutcome::Skipped(reason)) => {
                        counter!("auto_events_skipped_total", "reason" => reason.label())
                            .increment(1);
                    }
                    Err(msg) => {
                        warn!(target: "pipeline", subject_id = subject.id, post_id = post.id, "{msg}");
                        outcome.record_error(msg);
                    }
                }
            }
        }

        outcome
    }

    /// Dedup, keyword match, time extraction and insert for one post.
    /// `Err` carries the message recorded on the subject's outcome.
    async fn process_post(
        &self,
        details: &SubjectWithDetails,
        keywords: &[CategoryKeyword],
        post: &ExternalPost,
    ) -> Result<PostOutcome, String> {
        let subject_id = details.subject.id;

        let exists = self
            .subjects
            .event_exists(post.id, subject_id)
            .await
            .map_err(|e| format!("Failed to check event existence for post {}: {e:#}", post.id))?;
        if exists {
            return Ok(PostOutcome::Skipped(Skip::Exists));
        }

        let Some((category_id, matched)) = match_keywords(&post.content, keywords) else {
            return Ok(PostOutcome::Skipped(Skip::NoKeyword));
        };

        let created_at = post
            .created_at_in(&self.opts.timezone)
            .map_err(|e| format!("Failed to parse created_at for post {}: {e:#}", post.id))?;

        let found = extract::extract(&post.content, &created_at);
        if !found.matched {
            debug!(target: "pipeline", post_id = post.id, content = %anon_hash(&post.content), "no time expression; skipping");
            return Ok(PostOutcome::Skipped(Skip::NoTime));
        }

        let event = NewAutoEvent {
            subject_id,
            post_id: post.id,
            title: post.user.name.clone(),
            description: post.content.clone(),
            category_id: Some(category_id),
            starts_at: found.window.start.with_timezone(&Utc),
            ends_at: found.window.end.as_ref().map(|e| e.with_timezone(&Utc)),
        };
        let starts_at = event.starts_at;
        let id = self
            .subjects
            .create_auto_event(event)
            .await
            .map_err(|e| format!("Failed to create auto event for post {}: {e:#}", post.id))?;

        counter!("auto_events_created_total").increment(1);
        info!(
            target: "pipeline",
            subject_id,
            post_id = post.id,
            event_id = id,
            rule = found.rule.unwrap_or_default(),
            keywords = ?matched,
            %starts_at,
            "created auto event"
        );
        Ok(PostOutcome::Created(id))
    }
}

/// Case-insensitive substring match of `content` against every keyword.
/// Returns the first matching keyword's category and all matched keywords.
pub fn match_keywords<'k>(
    content: &str,
    keywords: &'k [CategoryKeyword],
) -> Option<(CategoryId, Vec<&'k str>)> {
    let content = content.to_lowercase();
    let matched: Vec<&CategoryKeyword> = keywords
        .iter()
        .filter(|k| content.contains(&k.keyword.to_lowercase()))
        .collect();
    let first = matched.first()?;
    Some((
        first.category_id,
        matched.iter().map(|k| k.keyword.as_str()).collect(),
    ))
}

/// Short anonymized identifier for post content in logs.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(id: u64, category_id: CategoryId, keyword: &str) -> CategoryKeyword {
        CategoryKeyword {
            id,
            category_id,
            keyword: keyword.into(),
        }
    }

    #[test]
    fn first_matching_keyword_decides_category() {
        let keywords = vec![kw(1, 4, "Release"), kw(2, 3, "LIVE"), kw(3, 4, "ライブ")];
        let (cat, matched) = match_keywords("Live and release 10/6", &keywords).unwrap();
        assert_eq!(cat, 4);
        assert_eq!(matched, vec!["Release", "LIVE"]);
    }

    #[test]
    fn non_ascii_keywords_match_verbatim_only() {
        let keywords = vec![kw(1, 3, "ライブ")];
        assert!(match_keywords("ライブ 10/6 18:00", &keywords).is_some());
        assert!(match_keywords("らいぶ 10/6 18:00", &keywords).is_none());
    }

    #[test]
    fn anon_hash_is_stable_and_short() {
        assert_eq!(anon_hash("abc"), anon_hash("abc"));
        assert_eq!(anon_hash("abc").len(), 12);
        assert_ne!(anon_hash("abc"), anon_hash("abd"));
    }
}

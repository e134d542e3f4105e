// src/scheduler.rs
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::POST_TIMESTAMP_FORMAT;
use crate::pipeline::AutoEventPipeline;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    /// Hard deadline for each scheduled run.
    pub deadline: Duration,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3600),
            deadline: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval: String,
    pub next_run_at: String,
    pub current_time: String,
}

/// Runs the pipeline once at start, then on a fixed interval.
pub struct Scheduler {
    pipeline: AutoEventPipeline,
    cfg: SchedulerCfg,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl Scheduler {
    pub fn new(pipeline: AutoEventPipeline, cfg: SchedulerCfg) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            cfg,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Spawns the run loop. Returns `None` if it is already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            info!(target: "scheduler", "Running initial auto event creation on startup");
            this.execute().await;

            let period = this.cfg.interval.max(Duration::from_secs(1));
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = this.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        info!(target: "scheduler", "Scheduled auto event creation triggered");
                        this.execute().await;
                    }
                }
            }
            info!(target: "scheduler", "Scheduler service stopped");
        }))
    }

    /// Stops the loop and cancels a run in progress.
    pub fn stop(&self) {
        info!(target: "scheduler", "Stopping scheduler service");
        self.cancel.cancel();
    }

    pub fn status(&self) -> SchedulerStatus {
        let now = Local::now();
        let next = chrono::Duration::from_std(self.cfg.interval)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        SchedulerStatus {
            running: !self.cancel.is_cancelled(),
            interval: interval_label(self.cfg.interval),
            next_run_at: next.format(POST_TIMESTAMP_FORMAT).to_string(),
            current_time: now.format(POST_TIMESTAMP_FORMAT).to_string(),
        }
    }

    async fn execute(&self) {
        let t0 = Instant::now();
        info!(
            target: "scheduler",
            "Auto event creation started at {}",
            Local::now().format(POST_TIMESTAMP_FORMAT)
        );

        match self
            .pipeline
            .run_with_deadline(&self.cancel, self.cfg.deadline)
            .await
        {
            Ok(report) => {
                info!(
                    target: "scheduler",
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    processed = report.processed_subjects,
                    created = report.created_events,
                    errors = report.errors.len(),
                    "Auto event creation completed"
                );
                for (i, msg) in report.errors.iter().enumerate() {
                    warn!(target: "scheduler", "  {}: {}", i + 1, msg);
                }
            }
            Err(e) => warn!(target: "scheduler", error = %e, "Auto event creation failed"),
        }
    }
}

/// "24 hours", "1 hour", "30 minutes", "45 seconds".
pub fn interval_label(d: Duration) -> String {
    let secs = d.as_secs();
    let (n, unit) = if secs > 0 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs > 0 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::{KeywordCache, RefreshPolicy};
    use crate::models::{Account, CategoryKeyword, ExternalPost, Subject, SubjectWithDetails};
    use crate::source::PostSource;
    use crate::store::InMemoryStore;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSource(AtomicUsize);

    #[async_trait::async_trait]
    impl PostSource for CountingSource {
        async fn get_latest_posts(&self, _: &str, _: usize) -> anyhow::Result<Vec<ExternalPost>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    async fn scheduler(source: Arc<CountingSource>) -> Arc<Scheduler> {
        let store = Arc::new(InMemoryStore::new());
        let mut s = SubjectWithDetails::new(Subject {
            id: 1,
            user_id: 1,
            name: "Mika".into(),
            theme_color: String::new(),
        });
        s.push_account(Account {
            id: 1,
            url: "https://sns.example/mika".into(),
            created_at: chrono::Utc::now(),
        });
        s.push_category(crate::models::Category {
            id: 1,
            slug: "live".into(),
            name: "Live".into(),
            description: None,
        });
        store.upsert_subject(s);
        store.add_keyword(CategoryKeyword {
            id: 1,
            category_id: 1,
            keyword: "live".into(),
        });
        let cache = KeywordCache::new(store.clone(), RefreshPolicy::default()).await;
        Scheduler::new(
            AutoEventPipeline::new(store, cache, source),
            SchedulerCfg::default(),
        )
    }

    #[test]
    fn labels() {
        assert_eq!(interval_label(Duration::from_secs(86_400)), "24 hours");
        assert_eq!(interval_label(Duration::from_secs(3600)), "1 hour");
        assert_eq!(interval_label(Duration::from_secs(1800)), "30 minutes");
        assert_eq!(interval_label(Duration::from_secs(45)), "45 seconds");
    }

    #[tokio::test(start_paused = true)]
    async fn runs_at_start_then_every_interval_until_stopped() {
        let source = Arc::new(CountingSource::default());
        let sched = scheduler(source.clone()).await;

        let handle = sched.start().expect("first start");
        assert!(sched.start().is_none());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 2);

        sched.stop();
        handle.await.expect("loop exits");
        tokio::time::sleep(Duration::from_secs(3 * 24 * 3600)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn status_reflects_stop() {
        let sched = scheduler(Arc::new(CountingSource::default())).await;
        let st = sched.status();
        assert!(st.running);
        assert_eq!(st.interval, "24 hours");
        assert_eq!(st.current_time.len(), "2025-10-03 12:00:00".len());

        sched.stop();
        assert!(!sched.status().running);
    }
}

//! Auto-Event Service: Binary Entrypoint
//! Loads settings, seeds the store, starts the keyword cache and the daily
//! scheduler, and serves the trigger/status routes plus `/metrics`.

use shuttle_axum::ShuttleAxum;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use oshi_auto_events::api::{self, AppState};
use oshi_auto_events::config::Settings;
use oshi_auto_events::keywords::KeywordCache;
use oshi_auto_events::metrics::Metrics;
use oshi_auto_events::pipeline::AutoEventPipeline;
use oshi_auto_events::scheduler::{Scheduler, SchedulerCfg};
use oshi_auto_events::source::HttpPostSource;
use oshi_auto_events::store::{InMemoryStore, SeedData};

const DEFAULT_FILTER: &str =
    "oshi_auto_events=info,keywords=info,pipeline=info,scheduler=info,source=info,warn";

/// Compact logs by default, JSON lines when LOG_FORMAT=json.
/// No-op if the runtime already installed a subscriber.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::load()?;
    let metrics = Metrics::init()?;

    let store = Arc::new(match &settings.seed_data_path {
        Some(path) => InMemoryStore::from_seed(SeedData::from_path(path)?),
        None => {
            warn!("SEED_DATA_PATH not set; store starts empty");
            InMemoryStore::new()
        }
    });

    let cache = KeywordCache::new(store.clone(), settings.refresh_policy()).await;
    let source = Arc::new(
        HttpPostSource::new(&settings.post_source_base_url)
            .with_timeout(settings.http_timeout_secs),
    );
    let pipeline = AutoEventPipeline::new(store.clone(), cache.clone(), source)
        .with_options(settings.pipeline_options());

    let scheduler = Scheduler::new(
        pipeline.clone(),
        SchedulerCfg {
            interval: settings.scheduler_interval(),
            deadline: settings.scheduled_deadline(),
        },
    );
    scheduler.start();

    // Cooperative shutdown of background work on Ctrl-C.
    let shutdown = CancellationToken::new();
    {
        let (scheduler, cache, shutdown) = (scheduler.clone(), cache.clone(), shutdown.clone());
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                scheduler.stop();
                cache.shutdown();
                shutdown.cancel();
            }
        });
    }

    info!(
        base_url = %settings.post_source_base_url,
        zone = %settings.source_timezone,
        workers = settings.workers,
        "auto event service ready"
    );

    let router = api::router(AppState {
        pipeline,
        scheduler,
        trigger_deadline: settings.trigger_deadline(),
        shutdown,
    })
    .merge(metrics.router());

    Ok(router.into())
}

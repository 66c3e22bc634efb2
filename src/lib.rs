pub mod comparator;
pub mod config;
pub mod identity;
pub mod models;
pub mod notifier;
pub mod orchestrator;
pub mod scraping;
pub mod snapshot;
pub mod sources;
pub mod store;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Utc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use notifier::{AlertSink, ChatWebhook, LogAlerts, LogNotifier, Notifier};
use orchestrator::{Orchestrator, RunStatus};
use store::{SnapshotStore, SqliteSnapshotStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,event_watch_lib=debug"));
    // A second init (tests, embedding) keeps the existing subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn open_store(config: &AppConfig) -> anyhow::Result<SqliteSnapshotStore> {
    let store = match &config.database_path {
        Some(path) => SqliteSnapshotStore::open(path),
        None => SqliteSnapshotStore::open_default(),
    };
    store.context("failed to open snapshot store")
}

fn channels(config: &AppConfig) -> (Arc<dyn Notifier>, Arc<dyn AlertSink>) {
    let Some(url) = config.webhook_url.as_deref() else {
        warn!("no chat webhook configured, new events will only be logged");
        return (Arc::new(LogNotifier), Arc::new(LogAlerts));
    };
    match ChatWebhook::new(url) {
        Ok(webhook) => {
            let webhook = Arc::new(webhook);
            (webhook.clone(), webhook)
        }
        Err(err) => {
            error!(error = %err, "chat webhook unavailable, falling back to logs");
            (Arc::new(LogNotifier), Arc::new(LogAlerts))
        }
    }
}

/// One scheduled invocation: scrape, diff, announce, persist.
pub fn run() -> anyhow::Result<RunStatus> {
    init_tracing();
    sources::validate_registry()?;
    let config = AppConfig::load()?;
    info!(bucket = %config.bucket, prefix = %config.prefix, weekly_day = %config.weekly_day, "starting event watch");

    let (notifier, alerts) = channels(&config);
    let store: Arc<dyn SnapshotStore> = Arc::new(open_store(&config)?);
    let jetaa_year = config.jetaa_year.unwrap_or_else(|| Utc::now().year());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let fetchers = scraping::active_sources(jetaa_year);
    for source in scraping::list_sources(&fetchers) {
        info!(id = %source.id, label = %source.label, name = %source.name, "source enabled");
    }

    let orchestrator = Orchestrator::new(&config, store, notifier, alerts);
    let status = runtime.block_on(orchestrator.run(fetchers));
    Ok(status)
}

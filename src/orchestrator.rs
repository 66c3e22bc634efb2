use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, Instrument, Span};

use crate::comparator::{
    find_new_events, find_new_since_last_week, BaselineMode, ComparisonOutcome,
};
use crate::config::AppConfig;
use crate::models::{EventRecord, SourceGroup};
use crate::notifier::{AlertSink, Notifier, NotifyReport};
use crate::scraping::{fetch_all, EventSource};
use crate::snapshot::{group_by_source, run_key, weekly_key};
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Fetching,
    DiffingLatest,
    Notifying,
    PersistingLatest,
    CheckingWeeklyGuard,
    DiffingWeekly,
    PersistingWeekly,
    Done,
}

/// A failure that was logged and alerted instead of ending the run.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunIssue {
    #[error("fetching {source_id} failed: {reason}")]
    FetchFailure { source_id: String, reason: String },
    #[error("could not load {mode} baseline: {reason}")]
    StoreAccessFailure { mode: &'static str, reason: String },
    #[error("{mode} comparison left out {records} {label} record(s) without identity, first: {reason}")]
    IdentityFieldMissing {
        mode: &'static str,
        label: String,
        records: usize,
        reason: String,
    },
    #[error("{failed} of {attempted} event notifications failed")]
    NotifyDeliveryFailure { failed: usize, attempted: usize },
    #[error("failed to persist {key}: {reason}")]
    PersistFailure { key: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WeeklyOutcome {
    NotScheduled,
    AlreadyDone { key: String },
    Saved { key: String, new_events: usize },
    Failed { key: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub started_at: DateTime<Utc>,
    pub states: Vec<RunState>,
    pub new_events: usize,
    pub notifications: NotifyReport,
    pub latest_key: Option<String>,
    pub weekly: WeeklyOutcome,
    pub issues: Vec<RunIssue>,
}

impl RunStatus {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            states: Vec::new(),
            new_events: 0,
            notifications: NotifyReport::default(),
            latest_key: None,
            weekly: WeeklyOutcome::NotScheduled,
            issues: Vec::new(),
        }
    }

    pub fn state(&self) -> Option<RunState> {
        self.states.last().copied()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn enter(&mut self, state: RunState) {
        info!(?state, "run state");
        self.states.push(state);
    }

    fn summary(&self) -> String {
        format!(
            "Event scan finished: {} new events, {} notified, {} issues.",
            self.new_events,
            self.notifications.delivered,
            self.issues.len()
        )
    }
}

/// Drives one run: diff, notify, persist, then the weekly digest.
pub struct Orchestrator {
    store: Arc<dyn SnapshotStore>,
    notifier: Arc<dyn Notifier>,
    alerts: Arc<dyn AlertSink>,
    bucket: String,
    prefix: String,
    weekly_day: Weekday,
    notify_run_summary: bool,
    span: Span,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn SnapshotStore>,
        notifier: Arc<dyn Notifier>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let span = info_span!("run", bucket = %config.bucket, prefix = %config.prefix);
        Self {
            store,
            notifier,
            alerts,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            weekly_day: config.weekly_day,
            notify_run_summary: config.notify_run_summary,
            span,
        }
    }

    /// Fetches every source, then runs the pipeline against the fresh scan.
    pub async fn run(&self, sources: Vec<Arc<dyn EventSource>>) -> RunStatus {
        let now = Utc::now();
        let mut status = RunStatus::new(now);
        status.enter(RunState::Fetching);

        let (current, failures) = fetch_all(sources).instrument(self.span.clone()).await;
        for failure in failures {
            self.raise(
                &mut status,
                RunIssue::FetchFailure {
                    source_id: failure.source_id.to_string(),
                    reason: failure.reason,
                },
            )
            .await;
        }

        self.process(now, current, status)
            .instrument(self.span.clone())
            .await
    }

    /// Runs the pipeline for an already assembled scan at a fixed time.
    pub async fn run_at(&self, now: DateTime<Utc>, current: SourceGroup) -> RunStatus {
        let mut status = RunStatus::new(now);
        status.enter(RunState::Fetching);
        self.process(now, current, status)
            .instrument(self.span.clone())
            .await
    }

    async fn process(
        &self,
        now: DateTime<Utc>,
        current: SourceGroup,
        mut status: RunStatus,
    ) -> RunStatus {
        status.enter(RunState::DiffingLatest);
        let new_events = self.diff_latest(&current, &mut status).await;
        status.new_events = new_events.len();

        status.enter(RunState::Notifying);
        let report = self.notifier.notify(&new_events).await;
        status.notifications = report;
        if report.failed > 0 {
            self.raise(
                &mut status,
                RunIssue::NotifyDeliveryFailure {
                    failed: report.failed,
                    attempted: new_events.len(),
                },
            )
            .await;
        }

        status.enter(RunState::PersistingLatest);
        let key = run_key(&self.prefix, now);
        match self.store.save(&self.bucket, &key, &current) {
            Ok(()) => {
                info!(key = %key, "fresh scan saved as latest baseline");
                status.latest_key = Some(key);
            }
            Err(err) => {
                self.raise(
                    &mut status,
                    RunIssue::PersistFailure {
                        key,
                        reason: err.to_string(),
                    },
                )
                .await;
            }
        }

        if now.weekday() == self.weekly_day {
            status.weekly = self.weekly(now, &current, &mut status).await;
        } else {
            info!(today = %now.weekday(), weekly_day = %self.weekly_day, "weekly digest not scheduled today");
        }

        status.enter(RunState::Done);
        info!(
            new_events = status.new_events,
            delivered = status.notifications.delivered,
            issues = status.issues.len(),
            "run finished"
        );
        if self.notify_run_summary {
            self.alerts.notice(&status.summary()).await;
        }
        status
    }

    async fn diff_latest(&self, current: &SourceGroup, status: &mut RunStatus) -> Vec<EventRecord> {
        let baseline = self.store.load_latest(&self.bucket, &self.prefix);
        let outcome = find_new_events(current, baseline);
        self.absorb(BaselineMode::Latest, outcome, status).await
    }

    /// Turns comparison side results into issues and keeps the new events.
    async fn absorb(
        &self,
        mode: BaselineMode,
        outcome: ComparisonOutcome,
        status: &mut RunStatus,
    ) -> Vec<EventRecord> {
        if let Some(err) = outcome.baseline_failure {
            self.raise(
                status,
                RunIssue::StoreAccessFailure {
                    mode: mode.as_str(),
                    reason: err.to_string(),
                },
            )
            .await;
        }
        for entry in outcome.malformed {
            let reason = entry
                .errors
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            self.raise(
                status,
                RunIssue::IdentityFieldMissing {
                    mode: mode.as_str(),
                    label: entry.label,
                    records: entry.errors.len(),
                    reason,
                },
            )
            .await;
        }
        outcome.new_events
    }

    async fn weekly(
        &self,
        now: DateTime<Utc>,
        current: &SourceGroup,
        status: &mut RunStatus,
    ) -> WeeklyOutcome {
        status.enter(RunState::CheckingWeeklyGuard);
        let key = weekly_key(&self.prefix, now.date_naive());
        if self.store.exists(&self.bucket, &key) {
            info!(key = %key, "weekly digest already written today");
            return WeeklyOutcome::AlreadyDone { key };
        }

        status.enter(RunState::DiffingWeekly);
        let target = now - Duration::days(7);
        let baseline = self.store.load_closest_to(&self.bucket, &self.prefix, target);
        let outcome = find_new_since_last_week(current, baseline);
        let new_events = self.absorb(BaselineMode::WeekOld, outcome, status).await;

        status.enter(RunState::PersistingWeekly);
        let digest = group_by_source(&new_events);
        match self.store.save(&self.bucket, &key, &digest) {
            Ok(()) => {
                info!(key = %key, new_events = new_events.len(), "weekly digest saved");
                WeeklyOutcome::Saved {
                    key,
                    new_events: new_events.len(),
                }
            }
            Err(err) => {
                self.raise(
                    status,
                    RunIssue::PersistFailure {
                        key: key.clone(),
                        reason: err.to_string(),
                    },
                )
                .await;
                WeeklyOutcome::Failed { key }
            }
        }
    }

    async fn raise(&self, status: &mut RunStatus, issue: RunIssue) {
        let message = issue.to_string();
        error!(issue = %message, "run issue");
        self.alerts.alert(&message).await;
        status.issues.push(issue);
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::models::{EventRecord, SourceGroup};
use crate::sources::Source;

pub const WEEKLY_DIR: &str = "weekly";

/// `{prefix}/events_{%Y-%m-%d-%H:%M:%S}.json`
pub fn run_key(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{prefix}/events_{}.json", at.format("%Y-%m-%d-%H:%M:%S"))
}

/// `{prefix}/weekly/events_{YYYY-MM-DD}.json`
pub fn weekly_key(prefix: &str, day: NaiveDate) -> String {
    format!("{prefix}/{WEEKLY_DIR}/events_{}.json", day.format("%Y-%m-%d"))
}

pub fn is_weekly_key(key: &str) -> bool {
    key.split('/').any(|segment| segment == WEEKLY_DIR)
}

/// Buckets detected events by source label for persistence.
///
/// Every known source gets a bucket, even when empty. Records whose
/// `event_source` is not a registered id are dropped here only; they have
/// already been handed to the notifier by the time this runs.
pub fn group_by_source(events: &[EventRecord]) -> SourceGroup {
    let mut grouped: SourceGroup = Source::ALL
        .iter()
        .map(|source| (source.label().to_string(), Vec::new()))
        .collect();

    for event in events {
        let source = event.event_source.as_deref().and_then(Source::from_id);
        match source {
            Some(source) => {
                if let Some(bucket) = grouped.get_mut(source.label()) {
                    bucket.push(event.clone());
                }
            }
            None => warn!(
                event_source = event.source_id(),
                event_name = event.title(),
                "unrecognized source, leaving event out of the grouped snapshot"
            ),
        }
    }

    grouped
}

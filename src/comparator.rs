use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::identity::{identity_key, IdentityFieldMissing, IdentityKey};
use crate::models::{EventRecord, Snapshot, SourceGroup};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineMode {
    Latest,
    WeekOld,
}

impl BaselineMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BaselineMode::Latest => "latest",
            BaselineMode::WeekOld => "week_old",
        }
    }
}

/// Records of one source bucket that had no identity and were left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecords {
    pub label: String,
    pub errors: Vec<IdentityFieldMissing>,
}

#[derive(Debug, Default, PartialEq)]
pub struct SourceDiff {
    pub new_events: Vec<EventRecord>,
    pub malformed: Vec<MalformedRecords>,
}

impl SourceDiff {
    fn note(&mut self, label: &str, error: IdentityFieldMissing) {
        match self.malformed.iter_mut().find(|entry| entry.label == label) {
            Some(entry) => entry.errors.push(error),
            None => self.malformed.push(MalformedRecords {
                label: label.to_string(),
                errors: vec![error],
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct ComparisonOutcome {
    pub new_events: Vec<EventRecord>,
    /// Set when the baseline could not be loaded; the diff is then empty.
    pub baseline_failure: Option<StoreError>,
    pub baseline_key: Option<String>,
    pub malformed: Vec<MalformedRecords>,
}

/// Events in `current` absent from the most recent stored snapshot.
pub fn find_new_events(
    current: &SourceGroup,
    baseline: Result<Snapshot, StoreError>,
) -> ComparisonOutcome {
    compare(BaselineMode::Latest, current, baseline)
}

/// Events in `current` absent from the snapshot stored closest to a week ago.
pub fn find_new_since_last_week(
    current: &SourceGroup,
    baseline: Result<Snapshot, StoreError>,
) -> ComparisonOutcome {
    compare(BaselineMode::WeekOld, current, baseline)
}

fn compare(
    mode: BaselineMode,
    current: &SourceGroup,
    baseline: Result<Snapshot, StoreError>,
) -> ComparisonOutcome {
    let baseline = match baseline {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(mode = mode.as_str(), error = %err, "no baseline to compare against");
            return ComparisonOutcome {
                baseline_failure: Some(err),
                ..Default::default()
            };
        }
    };

    debug!(
        mode = mode.as_str(),
        baseline = %baseline.key,
        saved_at = %baseline.saved_at,
        "comparing fresh scan against baseline"
    );
    let diff = diff_against(current, &baseline.events);
    for entry in &diff.malformed {
        warn!(
            mode = mode.as_str(),
            source = %entry.label,
            count = entry.errors.len(),
            "records without identity left out of comparison"
        );
    }
    debug!(mode = mode.as_str(), count = diff.new_events.len(), "comparison finished");

    ComparisonOutcome {
        new_events: diff.new_events,
        baseline_failure: None,
        baseline_key: Some(baseline.key),
        malformed: diff.malformed,
    }
}

/// Sources missing from `baseline` contribute nothing, so a newly added
/// source does not announce its whole listing on its first scan.
///
/// A record without identity is never matched nor flagged new; it is
/// reported under its source and the rest of the bucket is diffed as usual.
pub fn diff_against(current: &SourceGroup, baseline: &SourceGroup) -> SourceDiff {
    let mut diff = SourceDiff::default();

    let mut known: HashMap<&str, HashSet<IdentityKey>> = HashMap::with_capacity(baseline.len());
    for (source, events) in baseline {
        let mut keys = HashSet::with_capacity(events.len());
        for event in events {
            match identity_key(event) {
                Ok(key) => {
                    keys.insert(key);
                }
                Err(err) => diff.note(source, err),
            }
        }
        known.insert(source.as_str(), keys);
    }

    for (source, events) in current {
        let Some(seen) = known.get(source.as_str()) else {
            debug!(source = %source, "source absent from baseline, skipping");
            continue;
        };
        for event in events {
            match identity_key(event) {
                Ok(key) if seen.contains(&key) => {}
                Ok(_) => {
                    debug!(source = %source, event_name = event.title(), "new event found");
                    diff.new_events.push(event.clone());
                }
                Err(err) => diff.note(source, err),
            }
        }
    }

    diff
}

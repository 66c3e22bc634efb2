pub mod base;
pub mod daiwa_foundation_html;
pub mod japan_foundation_html;
pub mod japan_house_html;
pub mod japan_society_html;
pub mod jetaa_calendar_html;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span};

use crate::models::{EventRecord, SourceGroup};
use crate::sources::Source;

pub trait EventSource: Send + Sync {
    fn source(&self) -> Source;
    fn fetch(&self) -> anyhow::Result<Vec<EventRecord>>;
}

/// A fetcher that errored, panicked or came back empty.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{source_id} fetch failed: {reason}")]
pub struct FetchFailure {
    pub source_id: &'static str,
    pub reason: String,
}

#[derive(Clone, Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub label: String,
    pub name: String,
}

pub fn active_sources(jetaa_year: i32) -> Vec<Arc<dyn EventSource>> {
    vec![
        Arc::new(jetaa_calendar_html::JetaaCalendar::new(jetaa_year)),
        Arc::new(japan_house_html::JapanHouse),
        Arc::new(japan_society_html::JapanSociety),
        Arc::new(japan_foundation_html::JapanFoundation),
        Arc::new(daiwa_foundation_html::DaiwaFoundation),
    ]
}

pub fn list_sources(sources: &[Arc<dyn EventSource>]) -> Vec<SourceInfo> {
    sources
        .iter()
        .map(|fetcher| {
            let source = fetcher.source();
            SourceInfo {
                id: source.id().to_string(),
                label: source.label().to_string(),
                name: source.meta().display_name.to_string(),
            }
        })
        .collect()
}

/// Runs every fetcher on the blocking pool and waits for all of them.
///
/// The group has one entry per fetcher, in fetcher order; a failed fetcher
/// contributes an empty list.
pub async fn fetch_all(sources: Vec<Arc<dyn EventSource>>) -> (SourceGroup, Vec<FetchFailure>) {
    let handles: Vec<_> = sources
        .into_iter()
        .map(|fetcher| {
            let source = fetcher.source();
            let span = info_span!("fetch", source = source.id());
            let handle = tokio::task::spawn_blocking(move || {
                let _entered = span.enter();
                fetcher.fetch()
            });
            (source, handle)
        })
        .collect();

    let mut group = SourceGroup::new();
    let mut failures = Vec::new();
    for (source, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(events)) if events.is_empty() => Err("no events found".to_string()),
            Ok(Ok(events)) => Ok(events),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(join_err) => Err(format!("fetcher task aborted: {join_err}")),
        };

        let events = match outcome {
            Ok(events) => {
                info!(source = source.id(), count = events.len(), "fetched events");
                events
            }
            Err(reason) => {
                error!(source = source.id(), reason = %reason, "fetch failed");
                failures.push(FetchFailure {
                    source_id: source.id(),
                    reason,
                });
                Vec::new()
            }
        };
        group.entry(source.label().to_string()).or_default().extend(events);
    }

    (group, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    enum Behaviour {
        Events(Vec<&'static str>),
        Fails,
        Panics,
    }

    struct FakeSource {
        source: Source,
        behaviour: Behaviour,
    }

    impl EventSource for FakeSource {
        fn source(&self) -> Source {
            self.source
        }

        fn fetch(&self) -> anyhow::Result<Vec<EventRecord>> {
            match &self.behaviour {
                Behaviour::Events(urls) => Ok(urls
                    .iter()
                    .map(|url| EventRecord {
                        event_source: Some(self.source.id().to_string()),
                        event_url: Some(url.to_string()),
                        ..Default::default()
                    })
                    .collect()),
                Behaviour::Fails => Err(anyhow!("site unreachable")),
                Behaviour::Panics => panic!("selector blew up"),
            }
        }
    }

    fn fake(source: Source, behaviour: Behaviour) -> Arc<dyn EventSource> {
        Arc::new(FakeSource { source, behaviour })
    }

    #[tokio::test]
    async fn one_failing_fetcher_does_not_block_the_others() {
        let (group, failures) = fetch_all(vec![
            fake(Source::Jetaa, Behaviour::Events(vec!["a", "b"])),
            fake(Source::JapanHouse, Behaviour::Fails),
            fake(Source::JapanSociety, Behaviour::Panics),
            fake(Source::JapanFoundation, Behaviour::Events(vec![])),
            fake(Source::DaiwaFoundation, Behaviour::Events(vec!["d"])),
        ])
        .await;

        let labels: Vec<&str> = group.keys().map(String::as_str).collect();
        assert_eq!(
            labels,
            vec![
                "JETAA",
                "JAPAN_HOUSE",
                "JAPAN_SOCIETY",
                "JAPAN_FOUNDATION",
                "DAIWA_FOUNDATION"
            ]
        );
        assert_eq!(group["JETAA"].len(), 2);
        assert!(group["JAPAN_HOUSE"].is_empty());
        assert!(group["JAPAN_SOCIETY"].is_empty());
        assert_eq!(group["DAIWA_FOUNDATION"].len(), 1);

        let failed: Vec<&str> = failures.iter().map(|f| f.source_id).collect();
        assert_eq!(failed, vec!["japan_house", "japan_society", "japan_foundation"]);
        assert!(failures[0].reason.contains("site unreachable"));
        assert_eq!(failures[2].reason, "no events found");
    }

    #[test]
    fn shipped_sources_are_listed_with_display_names() {
        let info = list_sources(&active_sources(2024));
        let ids: Vec<&str> = info.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "jetaa",
                "japan_house",
                "japan_society",
                "japan_foundation",
                "daiwa_foundation"
            ]
        );
        assert_eq!(info[0].name, "JETAA Calendar");
        assert_eq!(info[3].label, "JAPAN_FOUNDATION");
    }
}

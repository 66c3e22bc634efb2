use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// One listing as produced by a source fetcher.
///
/// The seven identity fields stay optional so that a malformed record can
/// still be loaded and reported by the identity deriver instead of failing
/// the whole snapshot.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct EventRecord {
    #[serde(default)]
    pub event_source: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub event_location: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub event_price: Option<String>,
    #[serde(default)]
    pub event_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_description: Option<String>,
}

impl EventRecord {
    pub fn title(&self) -> &str {
        self.event_name.as_deref().unwrap_or("Untitled Event")
    }

    pub fn source_id(&self) -> &str {
        self.event_source.as_deref().unwrap_or("unknown")
    }
}

/// Source label (`"JETAA"`, `"JAPAN_HOUSE"`, ...) to the events seen for it,
/// in encounter order.
pub type SourceGroup = IndexMap<String, Vec<EventRecord>>;

/// A persisted source group together with the metadata the store keeps for it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub key: String,
    pub saved_at: DateTime<Utc>,
    pub events: SourceGroup,
}

// Some sources publish free events with a bare `0` price.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}

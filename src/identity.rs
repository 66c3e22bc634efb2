use thiserror::Error;

use crate::models::EventRecord;

/// `(source, name, location, date, time, price, url)`.
///
/// Image and description never take part in identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("event from {source_id} ({url}) is missing identity field `{field}`")]
pub struct IdentityFieldMissing {
    pub field: &'static str,
    pub source_id: String,
    pub url: String,
}

pub fn identity_key(event: &EventRecord) -> Result<IdentityKey, IdentityFieldMissing> {
    let require = |field: &'static str, value: &Option<String>| {
        value.clone().ok_or_else(|| IdentityFieldMissing {
            field,
            source_id: event.source_id().to_string(),
            url: event
                .event_url
                .clone()
                .unwrap_or_else(|| "no url".to_string()),
        })
    };

    Ok(IdentityKey(
        require("event_source", &event.event_source)?,
        require("event_name", &event.event_name)?,
        require("event_location", &event.event_location)?,
        require("event_date", &event.event_date)?,
        require("event_time", &event.event_time)?,
        require("event_price", &event.event_price)?,
        require("event_url", &event.event_url)?,
    ))
}

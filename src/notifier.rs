use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::EventRecord;
use crate::sources::{meta_for_id, DetailField};

const NOT_AVAILABLE: &str = "Not available";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(String),
    #[error("webhook rejected message: {0}")]
    Api(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Announces new events, one message each.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_event(&self, event: &EventRecord) -> Result<(), NotifyError>;

    /// Delivers in list order; a failed message is logged and skipped.
    async fn notify(&self, events: &[EventRecord]) -> NotifyReport {
        let mut report = NotifyReport::default();
        for event in events {
            match self.send_event(event).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(
                        event_source = event.source_id(),
                        event_name = event.title(),
                        error = %err,
                        "event notification failed"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

/// Operator-facing channel for failures that were downgraded instead of aborting.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, message: &str);

    /// Informational ping, such as the end-of-run summary.
    async fn notice(&self, message: &str) {
        info!(notice = message, "run notice");
    }
}

/// Google Chat incoming webhook, used for both event cards and alerts.
pub struct ChatWebhook {
    url: String,
    client: Client,
}

impl ChatWebhook {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|err| NotifyError::Http(err.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    async fn post(&self, payload: &Value) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|err| NotifyError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for ChatWebhook {
    async fn send_event(&self, event: &EventRecord) -> Result<(), NotifyError> {
        self.post(&event_card(event)).await?;
        debug!(event_name = event.title(), "event card delivered");
        Ok(())
    }
}

#[async_trait]
impl AlertSink for ChatWebhook {
    async fn alert(&self, message: &str) {
        error!(alert = message, "raising alert");
        if let Err(err) = self.post(&json!({ "text": format!("⚠️ {message}") })).await {
            error!(error = %err, "failed to deliver alert");
        }
    }

    async fn notice(&self, message: &str) {
        info!(notice = message, "posting run notice");
        if let Err(err) = self.post(&json!({ "text": message })).await {
            error!(error = %err, "failed to deliver run notice");
        }
    }
}

/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_event(&self, event: &EventRecord) -> Result<(), NotifyError> {
        info!(
            event_source = event.source_id(),
            event_name = event.title(),
            event_date = event.event_date.as_deref().unwrap_or(NOT_AVAILABLE),
            event_url = event.event_url.as_deref().unwrap_or(NOT_AVAILABLE),
            "new event"
        );
        Ok(())
    }
}

pub struct LogAlerts;

#[async_trait]
impl AlertSink for LogAlerts {
    async fn alert(&self, message: &str) {
        error!(alert = message, "raising alert");
    }
}

pub fn format_price(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "0" {
        "Free".to_string()
    } else if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_AVAILABLE) {
        NOT_AVAILABLE.to_string()
    } else if trimmed.contains('£') {
        trimmed.to_string()
    } else {
        format!("£{trimmed}")
    }
}

fn detail_value(event: &EventRecord, field: DetailField) -> String {
    let value = match field {
        DetailField::Name => event.event_name.as_deref(),
        DetailField::Location => event.event_location.as_deref(),
        DetailField::Date => event.event_date.as_deref(),
        DetailField::Time => event.event_time.as_deref(),
        DetailField::Price => return format_price(event.event_price.as_deref().unwrap_or("")),
    };
    value.unwrap_or(NOT_AVAILABLE).to_string()
}

fn detail_icon(field: DetailField) -> &'static str {
    match field {
        DetailField::Name => "BOOKMARK",
        DetailField::Location => "MAP_PIN",
        DetailField::Date => "INVITE",
        DetailField::Time => "CLOCK",
        DetailField::Price => "DOLLAR",
    }
}

/// `cardsV2` payload for one event, shaped by the source's registry entry.
pub fn event_card(event: &EventRecord) -> Value {
    let meta = meta_for_id(event.source_id());

    let mut widgets = Vec::new();
    if let Some(image_url) = event.event_image_url.as_deref() {
        widgets.push(json!({
            "image": { "imageUrl": image_url, "altText": "Event Image" }
        }));
    }
    for field in meta.details.iter().copied() {
        if field == DetailField::Name {
            continue;
        }
        widgets.push(json!({
            "decoratedText": {
                "topLabel": field.heading(),
                "startIcon": { "knownIcon": detail_icon(field) },
                "text": detail_value(event, field),
            }
        }));
    }
    if let Some(url) = event.event_url.as_deref() {
        widgets.push(json!({
            "buttonList": {
                "buttons": [{
                    "text": "🌐 View Event",
                    "onClick": { "openLink": { "url": url } }
                }]
            }
        }));
    }

    json!({
        "cardsV2": [{
            "cardId": event.title(),
            "card": {
                "header": {
                    "title": format!("✨ New Event Found on {}!", meta.display_name),
                    "subtitle": event.title(),
                    "imageUrl": meta.logo_url,
                    "imageType": "SQUARE",
                },
                "sections": [{ "widgets": widgets }],
            }
        }]
    })
}

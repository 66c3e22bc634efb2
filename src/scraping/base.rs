use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use scraper::{ElementRef, Selector};

use crate::models::EventRecord;
use crate::sources::Source;

pub const NOT_AVAILABLE: &str = "Not available";

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().and_then(|node| {
        let cleaned = inner_text(node);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    })
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(&href).ok().map(|u| u.to_string())
}

pub fn fetch_html(url: &str) -> Result<String> {
    static CLIENT: Lazy<Result<Client, String>> = Lazy::new(|| {
        Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("EventWatch/0.1")
            .build()
            .map_err(|err| err.to_string())
    });

    let client = match &*CLIENT {
        Ok(client) => client,
        Err(err) => return Err(anyhow!("http client unavailable: {err}")),
    };
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("request failed for {url}"))?;
    let response = response
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    response
        .text()
        .with_context(|| format!("unable to read response body for {url}"))
}

/// Assembles a record; absent descriptive fields use the shared placeholder.
pub struct RecordBuilder {
    record: EventRecord,
}

impl RecordBuilder {
    pub fn new(source: Source, name: impl Into<String>) -> Self {
        Self {
            record: EventRecord {
                event_source: Some(source.id().to_string()),
                event_name: Some(name.into()),
                event_location: Some(NOT_AVAILABLE.to_string()),
                event_date: Some(NOT_AVAILABLE.to_string()),
                event_time: Some(NOT_AVAILABLE.to_string()),
                event_price: Some(NOT_AVAILABLE.to_string()),
                event_url: Some(NOT_AVAILABLE.to_string()),
                event_image_url: None,
                event_description: None,
            },
        }
    }

    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.record.event_location = Some(value.into());
        self
    }

    pub fn date(mut self, value: impl Into<String>) -> Self {
        self.record.event_date = Some(value.into());
        self
    }

    pub fn time(mut self, value: impl Into<String>) -> Self {
        self.record.event_time = Some(value.into());
        self
    }

    pub fn price(mut self, value: impl Into<String>) -> Self {
        self.record.event_price = Some(value.into());
        self
    }

    pub fn url(mut self, value: impl Into<String>) -> Self {
        self.record.event_url = Some(value.into());
        self
    }

    pub fn image_url(mut self, value: Option<String>) -> Self {
        self.record.event_image_url = value;
        self
    }

    pub fn description(mut self, value: impl Into<String>) -> Self {
        self.record.event_description = Some(value.into());
        self
    }

    pub fn build(self) -> EventRecord {
        self.record
    }
}

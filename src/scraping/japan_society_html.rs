use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::base::{self, RecordBuilder};
use super::EventSource;
use crate::models::EventRecord;
use crate::sources::Source;

const SITE_URL: &str = "https://www.japansociety.org.uk/";
const LISTING_URL: &str = "https://www.japansociety.org.uk/events";
const PLACEHOLDER: &str = "Not Available";

static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.card").expect("japan society card selector"));
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.js-news-image a[href]").expect("japan society link selector")
});
static DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.js-event-date").expect("japan society date selector"));
static NAME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.card-text").expect("japan society name selector"));
static INTRO_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.js-listing-intro").expect("japan society intro selector"));
static PAGE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.page-link[href]").expect("japan society pager selector"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[alt][src]").expect("japan society image selector"));

/// Paginated card listing; each event page is visited for its poster.
pub struct JapanSociety;

impl EventSource for JapanSociety {
    fn source(&self) -> Source {
        Source::JapanSociety
    }

    fn fetch(&self) -> Result<Vec<EventRecord>> {
        let first = base::fetch_html(LISTING_URL)?;
        let mut events = parse_cards(&first);

        for url in page_urls(&first) {
            match base::fetch_html(&url) {
                Ok(html) => events.extend(parse_cards(&html)),
                Err(err) => warn!(url = %url, error = %err, "skipping listing page"),
            }
        }

        for event in &mut events {
            let (Some(url), Some(name)) = (event.event_url.as_deref(), event.event_name.as_deref())
            else {
                continue;
            };
            if !url.starts_with("http") {
                continue;
            }
            match base::fetch_html(url) {
                Ok(html) => event.event_image_url = poster_url(&html, name),
                Err(err) => debug!(url = %url, error = %err, "event page unavailable"),
            }
        }

        Ok(events)
    }
}

pub(crate) fn parse_cards(html: &str) -> Vec<EventRecord> {
    let document = Html::parse_document(html);
    let mut events = Vec::new();

    for card in document.select(&CARD_SELECTOR) {
        let url = base::first_attr(&card, &LINK_SELECTOR, "href");
        let date = base::first_text(&card, &DATE_SELECTOR);
        let name = base::first_text(&card, &NAME_SELECTOR);
        if url.is_none() && date.is_none() && name.is_none() {
            continue;
        }

        let mut builder =
            RecordBuilder::new(Source::JapanSociety, name.unwrap_or_else(|| "Title not found".into()))
                .location(PLACEHOLDER)
                .time(PLACEHOLDER)
                .price(PLACEHOLDER)
                .date(date.unwrap_or_else(|| "Date not found".into()))
                .url(url.unwrap_or_else(|| "URL not found".into()));
        if let Some(intro) = base::first_text(&card, &INTRO_SELECTOR) {
            builder = builder.description(intro);
        }
        events.push(builder.build());
    }

    events
}

/// Further listing pages, first occurrence order, `#` placeholders dropped.
pub(crate) fn page_urls(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut urls: Vec<String> = Vec::new();
    for link in document.select(&PAGE_LINK_SELECTOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if href == "#" {
            continue;
        }
        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{LISTING_URL}{href}")
        };
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// The image on an event page whose alt text is the event name.
fn poster_url(html: &str, name: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let src = document
        .select(&IMAGE_SELECTOR)
        .find(|img| img.value().attr("alt").map(str::trim) == Some(name))
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);
    base::absolute_url(SITE_URL, src)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r##"
        <html><body>
          <div class="card">
            <div class="js-news-image mb-3">
              <a href="https://www.japansociety.org.uk/events/haiku-evening">
                <img src="/thumbs/haiku.jpg">
              </a>
            </div>
            <span class="js-event-date"> 14 November 2024 </span>
            <span class="card-text">Haiku evening</span>
            <div class="js-listing-intro">An evening of seasonal verse.</div>
          </div>
          <div class="card">
            <span class="card-text">Members' lecture</span>
          </div>
          <div class="card"><p>Sponsored</p></div>
          <ul class="pagination">
            <li><a class="page-link" href="#">1</a></li>
            <li><a class="page-link" href="?page=2">2</a></li>
            <li><a class="page-link" href="?page=2">Next</a></li>
          </ul>
        </body></html>
    "##;

    #[test]
    fn cards_become_records() {
        let events = parse_cards(LISTING);
        assert_eq!(events.len(), 2);

        let haiku = &events[0];
        assert_eq!(haiku.event_source.as_deref(), Some("japan_society"));
        assert_eq!(haiku.event_name.as_deref(), Some("Haiku evening"));
        assert_eq!(haiku.event_date.as_deref(), Some("14 November 2024"));
        assert_eq!(haiku.event_location.as_deref(), Some("Not Available"));
        assert_eq!(haiku.event_price.as_deref(), Some("Not Available"));
        assert_eq!(
            haiku.event_url.as_deref(),
            Some("https://www.japansociety.org.uk/events/haiku-evening")
        );
        assert_eq!(
            haiku.event_description.as_deref(),
            Some("An evening of seasonal verse.")
        );
    }

    #[test]
    fn sparse_card_keeps_not_found_markers() {
        let events = parse_cards(LISTING);
        let lecture = &events[1];
        assert_eq!(lecture.event_date.as_deref(), Some("Date not found"));
        assert_eq!(lecture.event_url.as_deref(), Some("URL not found"));
        assert_eq!(lecture.event_description, None);
    }

    #[test]
    fn pagination_links_are_deduplicated() {
        assert_eq!(
            page_urls(LISTING),
            vec!["https://www.japansociety.org.uk/events?page=2"]
        );
    }

    #[test]
    fn poster_is_matched_by_alt_text() {
        let page = r#"
            <img alt="Logo" src="/logo.png">
            <img alt="Haiku evening" src="media/haiku-large.jpg">
        "#;
        assert_eq!(
            poster_url(page, "Haiku evening").as_deref(),
            Some("https://www.japansociety.org.uk/media/haiku-large.jpg")
        );
        assert_eq!(poster_url(page, "Tea ceremony"), None);
    }
}

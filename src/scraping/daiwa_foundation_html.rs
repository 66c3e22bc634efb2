use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::warn;

use super::base::{self, RecordBuilder, NOT_AVAILABLE};
use super::EventSource;
use crate::models::EventRecord;
use crate::sources::Source;

const SITE_URL: &str = "https://dajf.org.uk/";
const LISTING_URL: &str = "https://dajf.org.uk/events";

static LISTING_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("article.event_listing h2.listing_title a[href]")
        .expect("daiwa listing selector")
});
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1#no_rule").expect("daiwa title selector"));
static DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p#head_date").expect("daiwa date selector"));
static LOCATION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("header p.head_txt").expect("daiwa location selector"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[src]").expect("daiwa image selector"));

/// Daiwa Anglo-Japanese Foundation: a listing of links, one page per event.
pub struct DaiwaFoundation;

impl EventSource for DaiwaFoundation {
    fn source(&self) -> Source {
        Source::DaiwaFoundation
    }

    fn fetch(&self) -> Result<Vec<EventRecord>> {
        let listing = base::fetch_html(LISTING_URL)?;
        let links = event_links(&listing);
        if links.is_empty() {
            warn!("no event links on the listing page");
        }

        let mut events = Vec::with_capacity(links.len());
        for url in links {
            match base::fetch_html(&url) {
                Ok(html) => events.push(parse_event_page(&html, &url)),
                Err(err) => warn!(url = %url, error = %err, "skipping event page"),
            }
        }
        Ok(events)
    }
}

pub(crate) fn event_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&LISTING_LINK_SELECTOR)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| base::absolute_url(SITE_URL, Some(href.to_string())))
        .collect()
}

pub(crate) fn parse_event_page(html: &str, url: &str) -> EventRecord {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let name = base::first_text(&root, &TITLE_SELECTOR)
        .unwrap_or_else(|| "No title available".into());
    let location = base::first_text(&root, &LOCATION_SELECTOR)
        .unwrap_or_else(|| "No location available".into());
    let image_url = base::absolute_url(SITE_URL, base::first_attr(&root, &IMAGE_SELECTOR, "src"));

    // The header line carries both; the first word is kept as the date.
    let (date, time) = match base::first_text(&root, &DATE_SELECTOR) {
        Some(when) => match when.split_once(' ') {
            Some((date, time)) => (date.to_string(), time.to_string()),
            None => (when.clone(), NOT_AVAILABLE.to_string()),
        },
        None => ("No date available".to_string(), NOT_AVAILABLE.to_string()),
    };

    RecordBuilder::new(Source::DaiwaFoundation, name)
        .location(location)
        .date(date)
        .time(time)
        .url(url)
        .image_url(image_url)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <article class="event_listing">
            <h2 class="listing_title"><a href="https://dajf.org.uk/event/manga-talk">Manga talk</a></h2>
          </article>
          <article class="event_listing">
            <h2 class="listing_title"><a href="/event/book-launch">Book launch</a></h2>
          </article>
          <article class="news_listing">
            <h2 class="listing_title"><a href="/news/annual-report">Annual report</a></h2>
          </article>
        </body></html>
    "#;

    const EVENT_PAGE: &str = r#"
        <html><body>
          <header>
            <h1 id="no_rule">Manga talk</h1>
            <p id="head_date">21/11/2024 18:00 - 19:30</p>
            <p class="head_txt">Daiwa Foundation, 13/14 Cornwall Terrace</p>
          </header>
          <img src="/wp-content/uploads/manga.jpg">
        </body></html>
    "#;

    #[test]
    fn only_event_listings_are_followed() {
        assert_eq!(
            event_links(LISTING),
            vec![
                "https://dajf.org.uk/event/manga-talk",
                "https://dajf.org.uk/event/book-launch"
            ]
        );
    }

    #[test]
    fn event_page_becomes_record() {
        let event = parse_event_page(EVENT_PAGE, "https://dajf.org.uk/event/manga-talk");
        assert_eq!(event.event_source.as_deref(), Some("daiwa_foundation"));
        assert_eq!(event.event_name.as_deref(), Some("Manga talk"));
        assert_eq!(event.event_date.as_deref(), Some("21/11/2024"));
        assert_eq!(event.event_time.as_deref(), Some("18:00 - 19:30"));
        assert_eq!(
            event.event_location.as_deref(),
            Some("Daiwa Foundation, 13/14 Cornwall Terrace")
        );
        assert_eq!(event.event_price.as_deref(), Some("Not available"));
        assert_eq!(
            event.event_image_url.as_deref(),
            Some("https://dajf.org.uk/wp-content/uploads/manga.jpg")
        );
    }

    #[test]
    fn bare_page_uses_placeholders() {
        let event = parse_event_page("<html><body></body></html>", "https://dajf.org.uk/event/x");
        assert_eq!(event.event_name.as_deref(), Some("No title available"));
        assert_eq!(event.event_date.as_deref(), Some("No date available"));
        assert_eq!(event.event_time.as_deref(), Some("Not available"));
        assert_eq!(event.event_location.as_deref(), Some("No location available"));
        assert_eq!(event.event_image_url, None);
    }
}

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, RecordBuilder, NOT_AVAILABLE};
use super::EventSource;
use crate::models::EventRecord;
use crate::sources::Source;

const BASE_URL: &str = "https://www.jpf.org.uk/";
const WHATSON_URL: &str = "https://www.jpf.org.uk/whatson.php";

// Anchors and listing blocks in one pass, so each block sees the anchor before it.
static ANCHOR_OR_BLOCK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[id], div[style="border: solid 1px #666666;"]"#)
        .expect("japan foundation block selector")
});
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r##"font[color="#FFFFFF"]"##).expect("jpf title selector"));
static DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"td[width="100%"]"#).expect("jpf date selector"));
static CELL_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("jpf cell"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"img[alt=""]"#).expect("jpf image selector"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}\s+[A-Za-z]+\s+\d{4}").expect("valid date regex"));

/// The single what's-on page of the Japan Foundation London office.
pub struct JapanFoundation;

impl EventSource for JapanFoundation {
    fn source(&self) -> Source {
        Source::JapanFoundation
    }

    fn fetch(&self) -> Result<Vec<EventRecord>> {
        let html = base::fetch_html(WHATSON_URL)?;
        Ok(parse_document(&html))
    }
}

pub(crate) fn parse_document(html: &str) -> Vec<EventRecord> {
    let document = Html::parse_document(html);
    let mut anchor_id: Option<String> = None;
    let mut events = Vec::new();

    for node in document.select(&ANCHOR_OR_BLOCK_SELECTOR) {
        if node.value().name() == "a" {
            anchor_id = node.value().attr("id").map(str::to_string);
            continue;
        }

        let title =
            base::first_text(&node, &TITLE_SELECTOR).unwrap_or_else(|| "Title Not Found".into());
        let date = base::first_text(&node, &DATE_SELECTOR)
            .map(|text| extract_dates(&text))
            .unwrap_or_else(|| "Date Info Not Found".into());
        let venue = venue(&node).unwrap_or_else(|| "Venue Not Found".into());
        let image_url = base::absolute_url(BASE_URL, base::first_attr(&node, &IMAGE_SELECTOR, "src"));
        let url = anchor_id
            .as_ref()
            .map(|id| format!("{WHATSON_URL}#{id}"))
            .unwrap_or_else(|| "URL Not Available".into());

        events.push(
            RecordBuilder::new(Source::JapanFoundation, title)
                .location(venue)
                .date(date)
                .url(url)
                .image_url(image_url)
                .description(NOT_AVAILABLE)
                .build(),
        );
    }

    events
}

fn extract_dates(text: &str) -> String {
    let dates: Vec<&str> = DATE_RE.find_iter(text).map(|m| m.as_str()).collect();
    if dates.is_empty() {
        "Date Info Not Found".to_string()
    } else {
        dates.join(" - ")
    }
}

/// Text of the cell following the innermost `Venue:` label.
fn venue(block: &ElementRef<'_>) -> Option<String> {
    let label = block
        .select(&CELL_SELECTOR)
        .filter(|cell| base::inner_text(*cell).contains("Venue:"))
        .last()?;
    label
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().name() == "td")
        .map(base::inner_text)
}

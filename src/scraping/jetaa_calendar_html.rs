use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::base::{self, RecordBuilder};
use super::EventSource;
use crate::models::EventRecord;
use crate::sources::Source;

const BASE_URL: &str = "https://www.jetaa.org.uk/";
const CALENDAR_PATH: &str = "events/events-calendar/";
const LOGO_URL: &str = "https://www.jetaa.org.uk/site/assets/files/1021/logo.460x0.png";

static MONTH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.currentmonth").expect("jetaa month selector"));
static DAY_CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td.containsevent").expect("jetaa day cell selector"));
static DAY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h4").expect("jetaa day"));
static POPUP_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.popup").expect("jetaa popup selector"));
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").expect("jetaa title"));
static DETAIL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("jetaa detail selector"));
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("jetaa link"));

/// Month pages of the JETAA UK events calendar for one year.
pub struct JetaaCalendar {
    year: i32,
}

impl JetaaCalendar {
    pub fn new(year: i32) -> Self {
        Self { year }
    }

    fn month_url(&self, month: u32) -> String {
        format!("{BASE_URL}{CALENDAR_PATH}{}/{month}/", self.year)
    }
}

impl EventSource for JetaaCalendar {
    fn source(&self) -> Source {
        Source::Jetaa
    }

    fn fetch(&self) -> Result<Vec<EventRecord>> {
        let mut events = Vec::new();
        for month in 1..=12 {
            let url = self.month_url(month);
            match base::fetch_html(&url) {
                Ok(html) => events.extend(parse_month(&html)?),
                Err(err) => warn!(month, error = %err, "skipping calendar month"),
            }
        }
        Ok(events)
    }
}

pub(crate) fn parse_month(html: &str) -> Result<Vec<EventRecord>> {
    let document = Html::parse_document(html);
    let month_year = document
        .select(&MONTH_SELECTOR)
        .next()
        .map(base::inner_text)
        .context("calendar page has no current month heading")?;
    debug!(month = %month_year, "parsing calendar month");

    let mut events = Vec::new();
    for cell in document.select(&DAY_CELL_SELECTOR) {
        let Some(popup) = cell.select(&POPUP_SELECTOR).next() else {
            continue;
        };
        let Some(name) = base::first_text(&popup, &TITLE_SELECTOR) else {
            continue;
        };
        let day = base::first_text(&cell, &DAY_SELECTOR).unwrap_or_else(|| "Unknown day".into());

        let detail = base::first_text(&popup, &DETAIL_SELECTOR).unwrap_or_default();
        let (time, price) = match detail.split_once("//") {
            Some((time, price)) => (time.trim().to_string(), price.trim().to_string()),
            None => ("Unknown time".to_string(), "Unknown price".to_string()),
        };

        let url = base::absolute_url(BASE_URL, base::first_attr(&cell, &LINK_SELECTOR, "href"))
            .unwrap_or_else(|| "URL not found".to_string());

        events.push(
            RecordBuilder::new(Source::Jetaa, name)
                .location("Not Available")
                .date(format!("{day} {month_year}"))
                .time(time)
                .price(price)
                .url(url)
                .image_url(Some(LOGO_URL.to_string()))
                .build(),
        );
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONTH_PAGE: &str = r#"
        <html><body>
          <h2 class="currentmonth"> October 2024 </h2>
          <table>
            <tr>
              <td class="containsevent">
                <h4>12</h4>
                <a href="/events/events-calendar/2024/10/autumn-walk/">Autumn walk</a>
                <div class="popup">
                  <h3>Autumn walk</h3>
                  <p>11am // <strong>£5</strong></p>
                </div>
              </td>
              <td class="containsevent">
                <h4>19</h4>
                <div class="popup">
                  <h3>Pub quiz</h3>
                  <p>Evening</p>
                </div>
              </td>
              <td class="containsevent"><h4>20</h4></td>
            </tr>
          </table>
        </body></html>
    "#;

    #[test]
    fn parses_popups_into_records() {
        let events = parse_month(MONTH_PAGE).unwrap();
        assert_eq!(events.len(), 2);

        let walk = &events[0];
        assert_eq!(walk.event_source.as_deref(), Some("jetaa"));
        assert_eq!(walk.event_name.as_deref(), Some("Autumn walk"));
        assert_eq!(walk.event_date.as_deref(), Some("12 October 2024"));
        assert_eq!(walk.event_time.as_deref(), Some("11am"));
        assert_eq!(walk.event_price.as_deref(), Some("£5"));
        assert_eq!(
            walk.event_url.as_deref(),
            Some("https://www.jetaa.org.uk/events/events-calendar/2024/10/autumn-walk/")
        );
        assert_eq!(walk.event_location.as_deref(), Some("Not Available"));
    }

    #[test]
    fn detail_without_separator_uses_unknown_markers() {
        let events = parse_month(MONTH_PAGE).unwrap();
        let quiz = &events[1];
        assert_eq!(quiz.event_time.as_deref(), Some("Unknown time"));
        assert_eq!(quiz.event_price.as_deref(), Some("Unknown price"));
        assert_eq!(quiz.event_url.as_deref(), Some("URL not found"));
    }

    #[test]
    fn page_without_month_heading_is_an_error() {
        assert!(parse_month("<html><body><p>maintenance</p></body></html>").is_err());
    }

    #[test]
    fn month_urls_follow_calendar_layout() {
        assert_eq!(
            JetaaCalendar::new(2024).month_url(3),
            "https://www.jetaa.org.uk/events/events-calendar/2024/3/"
        );
    }
}

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;

use super::base::{self, RecordBuilder};
use super::EventSource;
use crate::models::EventRecord;
use crate::sources::Source;

const URL: &str = "https://www.japanhouselondon.uk/whats-on/";

static LOADER_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"component-loader[name="ArchiveWhatsOn"]"#)
        .expect("japan house loader selector")
});
static IMAGE_SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\d+x\d+(\.\w{3,4})$").expect("valid image size regex"));

#[derive(Debug, Deserialize)]
struct Archive {
    #[serde(default)]
    posts: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: Option<String>,
    event_location: Option<String>,
    date_range: Option<String>,
    url: Option<String>,
    image: Option<PostImage>,
}

#[derive(Debug, Deserialize)]
struct PostImage {
    url: Option<String>,
}

/// What's-on archive, embedded as JSON in a `v-bind` attribute.
pub struct JapanHouse;

impl EventSource for JapanHouse {
    fn source(&self) -> Source {
        Source::JapanHouse
    }

    fn fetch(&self) -> Result<Vec<EventRecord>> {
        let html = base::fetch_html(URL)?;
        parse_document(&html)
    }
}

pub(crate) fn parse_document(html: &str) -> Result<Vec<EventRecord>> {
    let document = Html::parse_document(html);
    let payload = document
        .select(&LOADER_SELECTOR)
        .next()
        .and_then(|node| node.value().attr("v-bind"))
        .context("archive component with v-bind payload not found")?;
    let archive: Archive =
        serde_json::from_str(payload).context("archive payload is not valid JSON")?;

    // Missing fields stay absent so identity checks can flag them.
    Ok(archive
        .posts
        .into_iter()
        .map(|post| {
            let mut record = RecordBuilder::new(Source::JapanHouse, "")
                .image_url(
                    post.image
                        .and_then(|image| image.url)
                        .map(|url| strip_size_suffix(&url)),
                )
                .build();
            record.event_name = post.title;
            record.event_location = post.event_location;
            record.event_date = post.date_range;
            record.event_url = post.url;
            record
        })
        .collect())
}

/// `photo-300x200.jpg` -> `photo.jpg`
fn strip_size_suffix(url: &str) -> String {
    IMAGE_SIZE_RE.replace(url, "$1").into_owned()
}

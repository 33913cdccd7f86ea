//! About-page and gallery-page scraping

use std::sync::LazyLock;

use devline_core::FetchError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::api::DeviantApi;

const SITE: &str = "https://www.deviantart.com";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("invalid selector")
}

static USERSTATS: LazyLock<Selector> = LazyLock::new(|| selector("#userstats"));
static GROUPS: LazyLock<Selector> = LazyLock::new(|| selector("#group_list_members"));
static BADGES: LazyLock<Selector> = LazyLock::new(|| selector("#badges_activity"));
static WATCHING: LazyLock<Selector> = LazyLock::new(|| selector("#watching"));
static MODULES: LazyLock<Selector> = LazyLock::new(|| selector(r#"[id^="module-"]"#));
static THUMBS: LazyLock<Selector> = LazyLock::new(|| selector(".torpedo-thumb-link"));

static MODULE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^module-\d{10}$").expect("invalid regex"));

/// Statistic name in output → pattern over the userstats text
static STAT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("Pageviews", r"Pageviews\s*([\d,]+)"),
        ("Deviations", r"Deviations\s*([\d,]+)"),
        ("Watchers", r"Watchers\s*([\d,]+)"),
        ("Watching", r"Watching\s*([\d,]+)"),
        ("Favourites", r"Favourites\s*([\d,]+)"),
        ("Comments Made", r"Comments\sMade\s*([\d,]+)"),
        ("Comments Received", r"Comments\sReceived\s*([\d,]+)"),
    ]
    .into_iter()
    .map(|(name, pat)| (name, Regex::new(pat).expect("invalid regex")))
    .collect()
});

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AboutRow {
    pub username: String,
    /// JSON object of the statistics found
    pub statistics: String,
    pub about_info: String,
    pub group_members_of: String,
    #[serde(rename = "Badges")]
    pub badges: String,
    #[serde(rename = "Watching")]
    pub watching: String,
    /// JSON list of deviation links from the gallery page
    pub gallery_links: String,
}

pub fn about_url(username: &str) -> String {
    format!("{SITE}/{username}/about")
}

pub fn gallery_url(username: &str) -> String {
    format!("{SITE}/{username}/gallery/")
}

/// Text of an element with whitespace runs collapsed to single spaces
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(doc: &Html, sel: &Selector) -> String {
    doc.select(sel).next().map(element_text).unwrap_or_default()
}

/// Statistics present in the userstats text, as integers
pub fn parse_stats(text: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, re) in STAT_PATTERNS.iter() {
        let value = re
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().replace(',', "").parse::<u64>().ok());
        if let Some(v) = value {
            out.insert((*name).to_string(), Value::from(v));
        }
    }
    out
}

/// Parse a user's about page into a row (gallery links left empty)
pub fn parse_about(username: &str, html: &str) -> AboutRow {
    let doc = Html::parse_document(html);
    let stats_text = first_text(&doc, &USERSTATS);
    let about_info = doc
        .select(&MODULES)
        .find(|el| el.value().id().is_some_and(|id| MODULE_ID.is_match(id)))
        .map(element_text)
        .unwrap_or_default();
    AboutRow {
        username: username.to_string(),
        statistics: Value::Object(parse_stats(&stats_text)).to_string(),
        about_info,
        group_members_of: first_text(&doc, &GROUPS),
        badges: first_text(&doc, &BADGES),
        watching: first_text(&doc, &WATCHING),
        gallery_links: "[]".to_string(),
    }
}

/// Deviation links on a gallery page, in page order without repeats
pub fn parse_gallery_links(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = rustc_hash::FxHashSet::default();
    doc.select(&THUMBS)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| seen.insert(href.to_string()))
        .map(String::from)
        .collect()
}

/// Fetch and parse about + gallery pages.
///
/// The about page is required; a failing gallery page only costs the links.
pub fn scrape_about<A: DeviantApi + ?Sized>(
    api: &A,
    username: &str,
) -> Result<AboutRow, FetchError> {
    let html = api.get_html(&about_url(username))?;
    let mut row = parse_about(username, &html);
    match api.get_html(&gallery_url(username)) {
        Ok(gallery) => {
            let links = parse_gallery_links(&gallery);
            row.gallery_links = serde_json::to_string(&links).unwrap_or_else(|_| "[]".into());
        }
        Err(e) => log::warn!("{username}: gallery page: {e}"),
    }
    Ok(row)
}

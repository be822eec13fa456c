//! News listing extractor.
//!
//! Pulls `(url, title)` pairs out of the news section's listing page. The
//! page layout is not under our control and changes without notice, so the
//! extractor is deliberately permissive:
//!
//! 1. Every `<a href>` whose raw target matches the news path pattern is a
//!    candidate (`/ru/news/...` by default).
//! 2. The target is resolved against the page URL and kept only if the
//!    resolved path still matches. This drops anchors such as `#/ru/news/`.
//! 3. The resolved URL is the identity key. Percent-escapes added by
//!    resolution are undone when the raw target had none, so a Cyrillic slug
//!    keys the same way as in state files written by earlier deployments.
//! 4. The first occurrence of each resolved URL wins.
//! 5. The title comes from the first heuristic in [`TITLE_HEURISTICS`] that
//!    yields at least [`MIN_TITLE_CHARS`] characters.
//!
//! Malformed markup never produces an error; at worst the result is empty.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, trace};
use url::Url;

use crate::models::Item;

/// Titles shorter than this (after trimming) are treated as missing.
pub const MIN_TITLE_CHARS: usize = 3;

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3").expect("static selector"));

/// A title lookup strategy, given the matched link element.
pub type TitleHeuristic = fn(ElementRef<'_>) -> Option<String>;

/// Title heuristics in priority order. The first non-trivial result wins;
/// append here to teach the extractor a new layout.
pub const TITLE_HEURISTICS: &[(&str, TitleHeuristic)] = &[
    ("link_text", link_text),
    ("parent_heading", parent_heading),
    ("nested_heading", nested_heading),
];

/// Extracts news items from the listing markup.
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    path_pattern: Regex,
}

impl ListingExtractor {
    pub fn new(path_pattern: Regex) -> Self {
        Self { path_pattern }
    }

    /// Extract items in document order, unique by resolved URL.
    #[instrument(level = "debug", skip_all, fields(base = %base_url))]
    pub fn extract(&self, html: &str, base_url: &Url) -> Vec<Item> {
        let document = Html::parse_document(html);

        let items: Vec<Item> = document
            .select(&LINK_SELECTOR)
            .filter_map(|anchor| {
                let href = anchor.value().attr("href")?;
                if !self.path_pattern.is_match(href) {
                    return None;
                }
                let resolved = base_url.join(href).ok()?;
                if !self.path_pattern.is_match(resolved.path()) {
                    trace!(%href, "Resolved path left the news section; skipping");
                    return None;
                }
                Some((identity_key(href, &resolved), anchor))
            })
            .unique_by(|(url, _)| url.clone())
            .map(|(url, anchor)| Item::new(url, resolve_title(anchor)))
            .collect();

        debug!(count = items.len(), "Extracted listing items");
        items
    }
}

/// Serialise `resolved`, keeping non-ASCII characters raw when `href` was
/// written without percent-escapes.
fn identity_key(href: &str, resolved: &Url) -> String {
    if href.contains('%') {
        return resolved.to_string();
    }
    match urlencoding::decode(resolved.as_str()) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => resolved.to_string(),
    }
}

/// Run [`TITLE_HEURISTICS`] in order and return the first usable title.
fn resolve_title(anchor: ElementRef<'_>) -> Option<String> {
    TITLE_HEURISTICS.iter().find_map(|(name, heuristic)| {
        let title = heuristic(anchor).filter(|t| is_meaningful(t))?;
        trace!(heuristic = name, %title, "Resolved title");
        Some(title)
    })
}

fn is_meaningful(title: &str) -> bool {
    title.trim().chars().count() >= MIN_TITLE_CHARS
}

/// Visible text of an element: text nodes trimmed and joined by one space.
fn visible_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .join(" ")
}

fn first_heading_text(scope: ElementRef<'_>) -> Option<String> {
    scope
        .select(&HEADING_SELECTOR)
        .map(visible_text)
        .find(|text| !text.is_empty())
}

fn link_text(anchor: ElementRef<'_>) -> Option<String> {
    Some(visible_text(anchor)).filter(|text| !text.is_empty())
}

/// Card layouts that wrap an image link and a separate headline.
fn parent_heading(anchor: ElementRef<'_>) -> Option<String> {
    let parent = anchor.parent().and_then(ElementRef::wrap)?;
    first_heading_text(parent)
}

fn nested_heading(anchor: ElementRef<'_>) -> Option<String> {
    first_heading_text(anchor)
}

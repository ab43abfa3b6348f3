//! Listing page parser
//!
//! A listing page carries three things the crawl depends on:
//! - the number of listing pages in the partition (pagination widget)
//! - the total number of items in the partition (the "x-y of N" counter)
//! - one link per item on the current page

use crate::state::ItemId;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// One item link found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    /// Item identifier taken from the trailing path segment
    pub id: ItemId,

    /// Link text
    pub title: String,

    /// Absolute link to the detail page
    pub href: String,
}

/// Extracted information from a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    /// Total number of items in the partition, if the counter is present
    pub total_items: Option<u64>,

    /// Number of listing pages; 1 when the page has no pagination widget
    pub total_pages: u32,

    /// Items in page order
    pub items: Vec<ListingItem>,
}

/// Parses a listing page
///
/// # Extraction Rules
///
/// | Field | Source |
/// |-------|--------|
/// | `total_pages` | last `ul.list li.arr a` link, `/page/N/` in its href |
/// | `total_items` | last number in the `.pagesFromTo` counter |
/// | `items` | `div.item div.name a`, id from the trailing `/N/` of the href |
///
/// Links without a numeric trailing segment are skipped.
///
/// # Example
///
/// ```
/// use mdb_harvest::crawler::parse_listing;
/// use url::Url;
///
/// let html = r#"<div class="pagesFromTo">1—1 из 1</div>
///   <div class="item"><div class="name"><a href="/film/42/">Answer</a></div></div>"#;
/// let base = Url::parse("https://example.com/list/").unwrap();
/// let page = parse_listing(html, &base);
/// assert_eq!(page.total_items, Some(1));
/// assert_eq!(page.items[0].id.get(), 42);
/// ```
pub fn parse_listing(html: &str, base_url: &Url) -> ListingPage {
    let document = Html::parse_document(html);

    ListingPage {
        total_items: extract_total_items(&document),
        total_pages: extract_total_pages(&document).unwrap_or(1),
        items: extract_items(&document, base_url),
    }
}

/// Reads the item id from the trailing path segment of an href
///
/// Accepts `/film/326/`, `/film/326` and absolute URLs ending the same way.
pub fn trailing_id(href: &str) -> Option<ItemId> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"/(\d+)/?$").expect("valid id pattern"));

    let path = href.split(['?', '#']).next().unwrap_or(href);
    pattern
        .captures(path)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .map(ItemId)
}

fn extract_total_pages(document: &Html) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"/page/(\d+)/").expect("valid page pattern"));

    let selector = Selector::parse("ul.list li.arr a[href]").ok()?;
    let href = document.select(&selector).last()?.value().attr("href")?;

    pattern
        .captures(href)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|pages| *pages > 0)
}

fn extract_total_items(document: &Html) -> Option<u64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Thousands may be grouped with plain or non-breaking spaces
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"\d(?:[\d \x{a0}]*\d)?").expect("valid counter pattern"));

    let selector = Selector::parse(".pagesFromTo").ok()?;
    let text = document.select(&selector).last().map(element_text)?;

    let last = pattern.find_iter(&text).last()?;
    last.as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

fn extract_items(document: &Html, base_url: &Url) -> Vec<ListingItem> {
    let Ok(selector) = Selector::parse("div.item div.name a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?.trim();
            let Some(id) = trailing_id(href) else {
                tracing::debug!("Skipping listing link without id: {}", href);
                return None;
            };
            let absolute = base_url
                .join(href)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| href.to_string());

            Some(ListingItem {
                id,
                title: element_text(element),
                href: absolute,
            })
        })
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

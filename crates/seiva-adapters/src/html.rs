//! Markup helpers shared by the family adapters.
//!
//! Thin wrappers over the `scraper` crate plus the date formats SEI portals
//! render (`dd/mm/yyyy`, `dd/mm/yyyy hh:mm`). Parsed `Html` documents are
//! never held across await points; every adapter parses synchronously from
//! an owned body string.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{ElementRef, Html, Selector};

/// Compile a selector known at development time.
///
/// # Panics
///
/// Panics on an invalid selector literal.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("selector literal should parse")
}

/// First element matching `css`, if any.
pub(crate) fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    doc.select(&selector(css)).next()
}

/// All elements matching `css`.
pub(crate) fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    doc.select(&selector(css)).collect()
}

/// Value of a hidden `<input>` by name.
pub(crate) fn hidden_input(doc: &Html, name: &str) -> Option<String> {
    select_first(doc, &format!("input[type=\"hidden\"][name=\"{name}\"]"))
        .and_then(|el| el.value().attr("value"))
        .map(str::to_string)
}

/// An attribute of the first element matching `css`.
pub(crate) fn attr_of(doc: &Html, css: &str, attr: &str) -> Option<String> {
    select_first(doc, css)
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Text content of an element with whitespace collapsed.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized text of the first element matching `css`.
pub(crate) fn first_text(doc: &Html, css: &str) -> Option<String> {
    select_first(doc, css).map(text_of)
}

/// `dd/mm/yyyy` portal date, taken as midnight UTC.
pub(crate) fn parse_sei_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s.trim(), "%d/%m/%Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// `dd/mm/yyyy hh:mm` portal timestamp, taken as UTC.
pub(crate) fn parse_sei_datetime(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%d/%m/%Y %H:%M")
        .ok()
        .map(|dt| dt.and_utc())
}

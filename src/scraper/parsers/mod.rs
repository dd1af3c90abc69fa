//! HTML extractors for the listing, odds, and results pages.
//!
//! Each parser is a site-specific [`Extractor`](super::port::Extractor); the
//! acquirers only ever see the structured output.

pub mod odds;
pub mod race_list;
pub mod results;

pub use odds::{OddsGridParser, RunnerNamesParser};
pub use race_list::{date_from_event_url, MeetingListParser, SelectedTabParser, TrackMeeting};
pub use results::{ResultsIndexParser, ResultsTableParser, TrackLink};

use scraper::{ElementRef, Html, Selector};

/// Parse a CSS selector, treating an invalid one as matching nothing
pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Count elements matching `css` in a full document
pub fn count_matches(html: &str, css: &str) -> usize {
    let Some(sel) = selector(css) else {
        return 0;
    };
    Html::parse_document(html).select(&sel).count()
}

/// Element text with runs of whitespace collapsed to single spaces
pub(crate) fn clean_text(elem: &ElementRef) -> String {
    elem.text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve a possibly site-relative href against a base URL
pub(crate) fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            href.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_matches() {
        let html = r#"<ul><li class="a">1</li><li class="a">2</li><li>3</li></ul>"#;
        assert_eq!(count_matches(html, "li.a"), 2);
        assert_eq!(count_matches(html, "li"), 3);
        assert_eq!(count_matches(html, "table"), 0);
        assert_eq!(count_matches(html, "!!not a selector"), 0);
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("https://www.odds.com.au", "/greyhounds/sale-20250420/race-1/"),
            "https://www.odds.com.au/greyhounds/sale-20250420/race-1/"
        );
        assert_eq!(
            absolute_url("https://www.odds.com.au/", "https://other.example/x"),
            "https://other.example/x"
        );
    }
}

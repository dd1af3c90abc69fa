//! Race list parser for the greyhound meetings page.
//!
//! The page shows one date tab at a time. Track names sit in a left column
//! and each track's race links in a row on the right, aligned by index.
//! Race links look like `/greyhounds/sale-20250420/race-1/` with the text
//! `R1 19:42`.

use chrono::NaiveDate;
use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

use super::{absolute_url, clean_text, selector};
use crate::scraper::port::Extractor;

pub const TAB_SELECTOR: &str = ".date-selectors__item";
pub const CONTENT_SELECTOR: &str = ".racing-meeting-rows__right-inner";
const TRACK_NAME_SELECTOR: &str = ".racing-meeting-rows__main-left > div";
const TRACK_ROW_SELECTOR: &str = ".racing-meeting-rows__right-inner > .racing-meeting-row";

static DATE_TOKEN_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"-(\d{8})/").ok());
static EVENT_NUMBER_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^R\d+$").ok());
static START_TIME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}$").ok());

/// A race link on the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceLink {
    pub event_number: String,
    pub start_time: String,
    pub url: String,
}

/// One track's races on the active tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMeeting {
    pub track: String,
    pub races: Vec<RaceLink>,
}

/// Extracts track meetings from the active date tab
pub struct MeetingListParser {
    base_url: String,
}

impl MeetingListParser {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
        }
    }

    /// Parse the active tab's meetings. Tracks without a usable race link are dropped.
    pub fn parse(&self, html: &str) -> Vec<TrackMeeting> {
        let document = Html::parse_document(html);
        let (Some(name_sel), Some(row_sel), Some(link_sel)) = (
            selector(TRACK_NAME_SELECTOR),
            selector(TRACK_ROW_SELECTOR),
            selector("a"),
        ) else {
            return Vec::new();
        };

        let names: Vec<String> = document.select(&name_sel).map(|e| clean_text(&e)).collect();

        let mut meetings = Vec::new();
        for (index, row) in document.select(&row_sel).enumerate() {
            let Some(track) = names.get(index).filter(|n| !n.is_empty()) else {
                continue;
            };

            let races: Vec<RaceLink> = row
                .select(&link_sel)
                .filter_map(|link| {
                    let href = link.value().attr("href")?;
                    let text = clean_text(&link);
                    let (event_number, start_time) = split_link_text(&text)?;
                    Some(RaceLink {
                        event_number,
                        start_time,
                        url: absolute_url(&self.base_url, href),
                    })
                })
                .collect();

            if !races.is_empty() {
                meetings.push(TrackMeeting {
                    track: track.clone(),
                    races,
                });
            }
        }

        meetings
    }
}

impl Extractor for MeetingListParser {
    type Output = Vec<TrackMeeting>;

    fn extract(&self, html: &str) -> Self::Output {
        self.parse(html)
    }
}

/// Index of the date tab currently marked `selected`
pub struct SelectedTabParser;

impl Extractor for SelectedTabParser {
    type Output = Option<usize>;

    fn extract(&self, html: &str) -> Self::Output {
        let document = Html::parse_document(html);
        let sel = selector(TAB_SELECTOR)?;
        document
            .select(&sel)
            .position(|tab| tab.value().classes().any(|c| c == "selected"))
    }
}

/// Pull `R<n>` and `H:MM` out of a race link's text
fn split_link_text(text: &str) -> Option<(String, String)> {
    let number_re = EVENT_NUMBER_RE.as_ref()?;
    let time_re = START_TIME_RE.as_ref()?;
    let parts: Vec<&str> = text.split_whitespace().collect();
    let number = parts.iter().find(|p| number_re.is_match(p))?;
    let time = parts.iter().find(|p| time_re.is_match(p))?;
    Some((number.to_string(), time.to_string()))
}

/// Calendar date embedded in an event URL (`...-YYYYMMDD/...`).
///
/// `None` when the token is missing or not a real date.
pub fn date_from_event_url(url: &str) -> Option<NaiveDate> {
    let caps = DATE_TOKEN_RE.as_ref()?.captures(url)?;
    NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()
}

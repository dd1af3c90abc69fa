//! Results index and results table parsers.
//!
//! The index groups meetings under headings such as `Sunday, April 20`.
//! A track's results page has one nav tab per race and a single results
//! table that is re-rendered when a tab is clicked.

use chrono::NaiveDate;
use scraper::Html;

use super::{clean_text, selector};
use crate::scraper::port::Extractor;
use crate::types::ResultRecord;

pub const INDEX_SELECTOR: &str = "div.meeting-list";
pub const TABLE_SELECTOR: &str = "table.results-event__table";
pub const RACE_TAB_SELECTOR: &str = "nav.meeting-events-nav .meeting-events-nav__item";
const HEADING_SELECTOR: &str = "h2.meeting-list__title";
const MEETING_ROW_SELECTOR: &str = ".meeting-row";
const MEETING_TITLE_SELECTOR: &str = ".meeting-row__title";
const MEETING_LINK_SELECTOR: &str = ".meeting-row__links a";
const RESULT_ROW_SELECTOR: &str = "table.results-event__table tbody tr";

/// Columns a results row must have to be read
const MIN_RESULT_CELLS: usize = 12;

/// Natural-language heading the index uses for a date, e.g. `Sunday, April 20`
pub fn results_heading(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}

/// Link to one track's results page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLink {
    pub track: String,
    pub href: String,
}

/// A dated section of the results index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingSection {
    pub heading: String,
    pub links: Vec<TrackLink>,
}

/// Extracts every dated section of the results index
pub struct ResultsIndexParser;

impl Extractor for ResultsIndexParser {
    type Output = Vec<MeetingSection>;

    fn extract(&self, html: &str) -> Self::Output {
        let document = Html::parse_document(html);
        let (Some(section_sel), Some(heading_sel), Some(row_sel), Some(title_sel), Some(link_sel)) = (
            selector(INDEX_SELECTOR),
            selector(HEADING_SELECTOR),
            selector(MEETING_ROW_SELECTOR),
            selector(MEETING_TITLE_SELECTOR),
            selector(MEETING_LINK_SELECTOR),
        ) else {
            return Vec::new();
        };

        document
            .select(&section_sel)
            .filter_map(|section| {
                let heading = clean_text(&section.select(&heading_sel).next()?);
                let links = section
                    .select(&row_sel)
                    .filter_map(|row| {
                        let track = clean_text(&row.select(&title_sel).next()?);
                        let href = row.select(&link_sel).next()?.value().attr("href")?;
                        if track.is_empty() {
                            return None;
                        }
                        Some(TrackLink {
                            track,
                            href: href.to_string(),
                        })
                    })
                    .collect();
                Some(MeetingSection { heading, links })
            })
            .collect()
    }
}

/// Extracts the finishing order from the currently displayed race tab
pub struct ResultsTableParser {
    track: String,
    event_label: String,
}

impl ResultsTableParser {
    /// `tab_index` is zero-based; labels are `Race 1`, `Race 2`, ...
    pub fn new(track: &str, tab_index: usize) -> Self {
        Self {
            track: track.to_string(),
            event_label: format!("Race {}", tab_index + 1),
        }
    }
}

impl Extractor for ResultsTableParser {
    type Output = Vec<ResultRecord>;

    fn extract(&self, html: &str) -> Self::Output {
        let document = Html::parse_document(html);
        let (Some(row_sel), Some(cell_sel)) = (selector(RESULT_ROW_SELECTOR), selector("td")) else {
            return Vec::new();
        };

        document
            .select(&row_sel)
            .filter_map(|row| {
                let cells: Vec<String> = row.select(&cell_sel).map(|td| clean_text(&td)).collect();
                if cells.len() < MIN_RESULT_CELLS {
                    return None;
                }
                // Column 1 is the rug number, not exported
                Some(ResultRecord {
                    track: self.track.clone(),
                    event_label: self.event_label.clone(),
                    finish_place: cells[0].clone(),
                    runner_name: cells[2].clone(),
                    trainer: cells[3].clone(),
                    finish_time: cells[4].clone(),
                    margin: cells[5].clone(),
                    split_time: cells[6].clone(),
                    in_run_position: cells[7].clone(),
                    weight: cells[8].clone(),
                    sire: cells[9].clone(),
                    dam: cells[10].clone(),
                    starting_price: cells[11].clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<div class="meeting-list">
  <h2 class="meeting-list__title">Sunday, April 20</h2>
  <div class="meeting-row">
    <div class="meeting-row__title">Sale</div>
    <div class="meeting-row__links"><a href="/results/sale/250420">Results</a></div>
  </div>
  <div class="meeting-row">
    <div class="meeting-row__title">Healesville</div>
    <div class="meeting-row__links"><a href="/results/healesville/250420">Results</a></div>
  </div>
  <div class="meeting-row">
    <div class="meeting-row__title">Abandoned Park</div>
    <div class="meeting-row__links"></div>
  </div>
</div>
<div class="meeting-list">
  <h2 class="meeting-list__title">Saturday, April 19</h2>
  <div class="meeting-row">
    <div class="meeting-row__title">Albion Park</div>
    <div class="meeting-row__links"><a href="/results/albion-park/250419">Results</a></div>
  </div>
</div>
</body>
</html>"#;

    const TABLE_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<table class="results-event__table">
  <thead><tr><th>Place</th></tr></thead>
  <tbody>
    <tr>
      <td>1</td><td>4</td><td>Zipping Zara</td><td>J. Smith</td><td>22.41</td><td>3.5</td>
      <td>5.61</td><td>1-1</td><td>30.2</td><td>Fernando Bale</td><td>Zara Lee</td><td>$2.40</td>
    </tr>
    <tr>
      <td>2</td><td>1</td><td>Bold Bandit</td><td>K. Jones</td><td>22.66</td><td>0.5</td>
      <td>5.70</td><td>2-2</td><td>31.0</td><td>Barcia Bale</td><td>Bandit Queen</td><td>$5.00</td>
    </tr>
    <tr><td colspan="12">Scratched: 7</td></tr>
  </tbody>
</table>
</body>
</html>"#;

    #[test]
    fn test_results_heading() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();
        assert_eq!(results_heading(date), "Sunday, April 20");
        let date = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        assert_eq!(results_heading(date), "Monday, November 3");
    }

    #[test]
    fn test_index_sections() {
        let sections = ResultsIndexParser.extract(INDEX_HTML);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, "Sunday, April 20");
        assert_eq!(
            sections[0].links,
            vec![
                TrackLink {
                    track: "Sale".into(),
                    href: "/results/sale/250420".into()
                },
                TrackLink {
                    track: "Healesville".into(),
                    href: "/results/healesville/250420".into()
                },
            ]
        );
        assert_eq!(sections[1].links.len(), 1);
    }

    #[test]
    fn test_results_table() {
        let records = ResultsTableParser::new("Sale", 2).extract(TABLE_HTML);

        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert_eq!(first.track, "Sale");
        assert_eq!(first.event_label, "Race 3");
        assert_eq!(first.finish_place, "1");
        assert_eq!(first.runner_name, "Zipping Zara");
        assert_eq!(first.trainer, "J. Smith");
        assert_eq!(first.split_time, "5.61");
        assert_eq!(first.dam, "Zara Lee");
        assert_eq!(first.starting_price, "$2.40");
        assert_eq!(records[1].in_run_position, "2-2");
    }
}

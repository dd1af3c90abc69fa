//! Records produced by the acquirers and persisted under the export root.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One race on the day's card.
///
/// Uniquely identified by `(date, track, event_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub date: NaiveDate,
    pub track: String,
    #[serde(rename = "eventNumber")]
    pub event_number: String, // "R1", "R2", ...
    #[serde(rename = "startTime")]
    pub start_time: String, // "19:42", local to the listing page
    #[serde(rename = "eventURL")]
    pub event_url: String,
}

/// Wager type tracked per runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetVariant {
    Win,
    Place,
}

impl fmt::Display for BetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetVariant::Win => f.pad("Win"),
            BetVariant::Place => f.pad("Place"),
        }
    }
}

/// A single bookmaker's price, or the "no quote" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OddsQuote {
    Price(f64),
    #[default]
    NoQuote,
}

impl OddsQuote {
    /// Sentinel written to CSV for a missing price.
    pub const NO_QUOTE: &'static str = "-";

    /// Parse a cell's text. Anything that isn't a positive number is `NoQuote`.
    pub fn parse(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => OddsQuote::Price(v),
            _ => OddsQuote::NoQuote,
        }
    }

    pub fn price(&self) -> Option<f64> {
        match self {
            OddsQuote::Price(v) => Some(*v),
            OddsQuote::NoQuote => None,
        }
    }
}

impl fmt::Display for OddsQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OddsQuote::Price(v) => write!(f, "{}", v),
            OddsQuote::NoQuote => f.write_str(Self::NO_QUOTE),
        }
    }
}

/// Prices serialize as numbers, a missing quote as `null`.
impl Serialize for OddsQuote {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.price().serialize(serializer)
    }
}

/// Odds for one runner and one bet variant across all tracked bookmakers.
///
/// `quotes` is positional: index `i` belongs to the `i`-th configured bookmaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsRecord {
    pub track: String,
    pub event_number: String,
    pub runner_name: String,
    pub bet_variant: BetVariant,
    pub quotes: Vec<OddsQuote>,
}

/// Immutable batch of odds records from one scrape cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Wall-clock time the batch scrape started.
    pub captured_at: DateTime<Tz>,
    pub bookmakers: Vec<String>,
    pub records: Vec<OddsRecord>,
}

impl Snapshot {
    /// File stem used under the day's directory, e.g. `details-19-05`.
    pub fn file_stem(&self) -> String {
        format!("details-{}", self.captured_at.format("%H-%M"))
    }

    pub fn date(&self) -> NaiveDate {
        self.captured_at.date_naive()
    }
}

/// Finishing-order row for one runner in one concluded race.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub track: String,
    pub event_label: String, // "Race 1", "Race 2", ...
    pub finish_place: String,
    pub runner_name: String,
    pub trainer: String,
    pub finish_time: String,
    pub margin: String,
    pub split_time: String,
    pub in_run_position: String,
    pub weight: String,
    pub sire: String,
    pub dam: String,
    pub starting_price: String,
}

/// The three scheduled job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    RaceList,
    Details,
    Results,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::RaceList, JobKind::Details, JobKind::Results];

    /// Key used in the status ledger and API responses
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::RaceList => "raceList",
            JobKind::Details => "details",
            JobKind::Results => "results",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_quote_parse() {
        assert_eq!(OddsQuote::parse(" 3.40 "), OddsQuote::Price(3.4));
        assert_eq!(OddsQuote::parse("SCR"), OddsQuote::NoQuote);
        assert_eq!(OddsQuote::parse(""), OddsQuote::NoQuote);
        assert_eq!(OddsQuote::parse("0"), OddsQuote::NoQuote);
    }

    #[test]
    fn test_quote_display() {
        assert_eq!(OddsQuote::Price(2.5).to_string(), "2.5");
        assert_eq!(OddsQuote::Price(12.0).to_string(), "12");
        assert_eq!(OddsQuote::NoQuote.to_string(), "-");
    }

    #[test]
    fn test_snapshot_file_stem() {
        let captured_at = chrono_tz::Australia::Brisbane
            .with_ymd_and_hms(2025, 4, 20, 9, 5, 31)
            .unwrap();
        let snapshot = Snapshot {
            captured_at,
            bookmakers: vec![],
            records: vec![],
        };
        assert_eq!(snapshot.file_stem(), "details-09-05");
        assert_eq!(snapshot.date(), NaiveDate::from_ymd_opt(2025, 4, 20).unwrap());
    }

    #[test]
    fn test_job_names_match_serde() {
        for kind in JobKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }
}

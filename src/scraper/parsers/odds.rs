//! Odds comparison grid parser for an event page.
//!
//! Each runner is one `.octd-right__main-row`; each bookmaker is one
//! `.octd-right__main-cell` in column order. A cell without a numeric
//! `.octd-right__odds-value-cell` is a missing quote.

use scraper::Html;

use super::{clean_text, selector};
use crate::scraper::port::Extractor;
use crate::types::OddsQuote;

pub const ROW_SELECTOR: &str = ".octd-right__main-row";
pub const TOGGLE_SELECTOR: &str = "button.bettype-button";
const CELL_SELECTOR: &str = ".octd-right__main-cell";
const VALUE_SELECTOR: &str = ".octd-right__odds-value-cell";
const RUNNER_SELECTOR: &str = ".competitor-details a";

/// Runner names in grid order
pub struct RunnerNamesParser;

impl Extractor for RunnerNamesParser {
    type Output = Vec<String>;

    fn extract(&self, html: &str) -> Self::Output {
        let document = Html::parse_document(html);
        let Some(sel) = selector(RUNNER_SELECTOR) else {
            return Vec::new();
        };
        document.select(&sel).map(|e| clean_text(&e)).collect()
    }
}

/// One row of quotes per runner, in bookmaker column order
pub struct OddsGridParser;

impl Extractor for OddsGridParser {
    type Output = Vec<Vec<OddsQuote>>;

    fn extract(&self, html: &str) -> Self::Output {
        let document = Html::parse_document(html);
        let (Some(row_sel), Some(cell_sel), Some(value_sel)) = (
            selector(ROW_SELECTOR),
            selector(CELL_SELECTOR),
            selector(VALUE_SELECTOR),
        ) else {
            return Vec::new();
        };

        document
            .select(&row_sel)
            .map(|row| {
                row.select(&cell_sel)
                    .map(|cell| {
                        cell.select(&value_sel)
                            .next()
                            .map(|value| OddsQuote::parse(&clean_text(&value)))
                            .unwrap_or(OddsQuote::NoQuote)
                    })
                    .collect()
            })
            .collect()
    }
}

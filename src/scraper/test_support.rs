//! HTML fixtures and wiring shared by the acquirer tests.

use std::path::Path;
use std::sync::Arc;

use super::fake::FakePort;
use super::ScrapeContext;
use crate::config::TimeoutConfig;
use crate::storage::{DiagnosticDumps, ExportStore};

pub const LISTING_URL: &str = "https://odds.test/greyhounds/";
pub const ODDS_BASE: &str = "https://odds.test";
pub const RESULTS_BASE: &str = "https://results.test";

/// No settle delays, so tests never sleep
pub fn zero_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        navigation: 1_000,
        listing_ready: 1_000,
        tab_content: 1_000,
        odds_table: 1_000,
        results_index: 1_000,
        results_table: 1_000,
        tab_settle: 0,
        toggle_settle: 0,
        results_settle: 0,
    }
}

/// Exports under `dir/exports`, dumps under `dir/diagnostics`
pub fn test_context(port: &Arc<FakePort>, dir: &Path) -> ScrapeContext<FakePort> {
    ScrapeContext {
        port: Arc::clone(port),
        store: Arc::new(ExportStore::new(dir.join("exports"))),
        dumps: Arc::new(DiagnosticDumps::new(dir.join("diagnostics"))),
        timeouts: zero_timeouts(),
    }
}

/// Listing page with two date tabs, `selected` active, showing `tracks`
/// as `(name, url slug, ["R1 19:42", ...])`
pub fn listing_html(selected: usize, tracks: &[(&str, &str, &[&str])]) -> String {
    let tabs: String = (0..2)
        .map(|i| {
            let class = if i == selected { " selected" } else { "" };
            format!(r#"<div class="date-selectors__item{}">Day {}</div>"#, class, i)
        })
        .collect();

    let names: String = tracks
        .iter()
        .map(|(name, _, _)| format!("<div>{}</div>", name))
        .collect();

    let rows: String = tracks
        .iter()
        .map(|(_, slug, races)| {
            let links: String = races
                .iter()
                .map(|label| {
                    let number = label
                        .split_whitespace()
                        .next()
                        .unwrap_or("R1")
                        .trim_start_matches('R');
                    format!(
                        r#"<a href="/greyhounds/{}/race-{}/">{}</a>"#,
                        slug, number, label
                    )
                })
                .collect();
            format!(r#"<div class="racing-meeting-row">{}</div>"#, links)
        })
        .collect();

    format!(
        r#"<html><body>
<div class="date-selectors">{}</div>
<div class="racing-meeting-rows">
  <div class="racing-meeting-rows__main-left">{}</div>
  <div class="racing-meeting-rows__right-inner">{}</div>
</div>
</body></html>"#,
        tabs, names, rows
    )
}

/// Event page with one grid row per runner; `"-"` renders an empty cell
pub fn event_html(runners: &[&str], grid: &[&[&str]]) -> String {
    let names: String = runners
        .iter()
        .map(|n| format!(r#"<div class="competitor-details"><a href="/r">{}</a></div>"#, n))
        .collect();

    let rows: String = grid
        .iter()
        .map(|quotes| {
            let cells: String = quotes
                .iter()
                .map(|q| {
                    if *q == "-" {
                        r#"<div class="octd-right__main-cell"></div>"#.to_string()
                    } else {
                        format!(
                            r#"<div class="octd-right__main-cell"><span class="octd-right__odds-value-cell">{}</span></div>"#,
                            q
                        )
                    }
                })
                .collect();
            format!(r#"<div class="octd-right__main-row">{}</div>"#, cells)
        })
        .collect();

    format!(
        r#"<html><body>
<button class="bettype-button">Win</button><button class="bettype-button">Place</button>
<div class="octd-left">{}</div>
<div class="octd-right">{}</div>
</body></html>"#,
        names, rows
    )
}

/// Results index with one dated section per `(heading, [(track, href)])`
pub fn results_index_html(sections: &[(&str, &[(&str, &str)])]) -> String {
    let body: String = sections
        .iter()
        .map(|(heading, links)| {
            let rows: String = links
                .iter()
                .map(|(track, href)| {
                    format!(
                        r#"<div class="meeting-row"><div class="meeting-row__title">{}</div><div class="meeting-row__links"><a href="{}">Results</a></div></div>"#,
                        track, href
                    )
                })
                .collect();
            format!(
                r#"<div class="meeting-list"><h2 class="meeting-list__title">{}</h2>{}</div>"#,
                heading, rows
            )
        })
        .collect();

    format!("<html><body>{}</body></html>", body)
}

/// Track results page with `tabs` race tabs showing `runners` in finishing order
pub fn results_page_html(tabs: usize, runners: &[&str]) -> String {
    let nav: String = (0..tabs)
        .map(|i| format!(r#"<a class="meeting-events-nav__item">R{}</a>"#, i + 1))
        .collect();

    let rows: String = runners
        .iter()
        .enumerate()
        .map(|(i, name)| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>T. Trainer</td><td>22.50</td><td>1.0</td>\
                 <td>5.60</td><td>1-1</td><td>30.0</td><td>Sire</td><td>Dam</td><td>$3.00</td></tr>",
                i + 1,
                i + 3,
                name
            )
        })
        .collect();

    format!(
        r#"<html><body>
<nav class="meeting-events-nav">{}</nav>
<table class="results-event__table"><tbody>{}</tbody></table>
</body></html>"#,
        nav, rows
    )
}

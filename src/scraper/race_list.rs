//! Race List Acquirer
//!
//! Walks the listing's date tabs and keeps the tab whose races are dated
//! `target`. The date comes from the first event URL on the tab, never from
//! the tab label.

use chrono::NaiveDate;
use tracing::{error, info, warn};

use super::parsers::race_list::{CONTENT_SELECTOR, TAB_SELECTOR};
use super::parsers::{date_from_event_url, MeetingListParser, SelectedTabParser, TrackMeeting};
use super::port::{AutomationPort, ReadyCondition, Session, Target};
use super::{as_unavailable, close_session, ScrapeContext};
use crate::config::{SourceConfig, TimeoutConfig};
use crate::error::{ScrapeError, ScrapeResult};
use crate::types::ScheduledEvent;

pub struct RaceListAcquirer<P: AutomationPort> {
    ctx: ScrapeContext<P>,
    listing_url: String,
    base_url: String,
}

impl<P: AutomationPort> RaceListAcquirer<P> {
    pub fn new(ctx: ScrapeContext<P>, source: &SourceConfig) -> Self {
        Self {
            ctx,
            listing_url: source.race_list_url.clone(),
            base_url: source.odds_base_url.clone(),
        }
    }

    /// Fetch the schedule for `target` and overwrite its `schedule.csv`.
    ///
    /// Returns an empty list, without writing, when no tab carries `target`'s
    /// races. Fails with `SourceUnavailable` when the listing never renders.
    pub async fn acquire(&self, target: NaiveDate) -> ScrapeResult<Vec<ScheduledEvent>> {
        info!("Race list scrape started for {}", target);
        let mut session = self.ctx.port.open().await?;

        let outcome = self.scan_tabs(&mut session, target).await;
        if let Err(e) = &outcome {
            error!("Race list scrape failed: {}", e);
            if let Ok(html) = session.content().await {
                self.ctx.dumps.dump("race-list", &html);
            }
        }
        close_session(&mut session).await;

        let events = outcome?;
        if events.is_empty() {
            let soft = ScrapeError::EmptyResult(format!("no listing tab dated {}", target));
            warn!("{}", soft);
            return Ok(events);
        }

        match self.ctx.store.write_schedule(target, &events) {
            Ok(path) => info!("Race list saved to {} ({} events)", path.display(), events.len()),
            Err(e) => error!("{}", e),
        }
        Ok(events)
    }

    async fn scan_tabs(&self, session: &mut P::Session, target: NaiveDate) -> ScrapeResult<Vec<ScheduledEvent>> {
        let timeouts: &TimeoutConfig = &self.ctx.timeouts;

        let ready = ReadyCondition::navigate(TimeoutConfig::ms(timeouts.navigation))
            .wait_for(TAB_SELECTOR, TimeoutConfig::ms(timeouts.listing_ready));
        session
            .goto(&self.listing_url, &ready)
            .await
            .map_err(as_unavailable("race list tabs"))?;

        let tab_count = session.count(TAB_SELECTOR).await?;
        info!("Tabs found: {}", tab_count);
        let parser = MeetingListParser::new(&self.base_url);

        for i in 0..tab_count {
            info!("Scraping tab {} of {}", i + 1, tab_count);

            let selected = session.extract(&SelectedTabParser).await?;
            if selected != Some(i) {
                if !session.click(Target::Nth(TAB_SELECTOR, i)).await? {
                    warn!("Tab index {} not found", i);
                    continue;
                }
                tokio::time::sleep(TimeoutConfig::ms(timeouts.tab_settle)).await;
            }

            session
                .wait_for(CONTENT_SELECTOR, TimeoutConfig::ms(timeouts.tab_content))
                .await
                .map_err(as_unavailable("race list content"))?;

            let meetings = session.extract(&parser).await?;
            let Some(first_url) = meetings
                .iter()
                .flat_map(|m| m.races.iter())
                .map(|r| r.url.as_str())
                .next()
            else {
                warn!("No data found on tab {}", i + 1);
                continue;
            };

            match date_from_event_url(first_url) {
                Some(date) if date == target => {
                    return Ok(flatten(target, meetings));
                }
                Some(date) => {
                    info!("Skipping tab {}: races are dated {}", i + 1, date);
                }
                None => {
                    // Malformed date token: never guess which day the tab is
                    warn!("Skipping tab {}: no date token in {}", i + 1, first_url);
                }
            }
        }

        Ok(Vec::new())
    }
}

fn flatten(date: NaiveDate, meetings: Vec<TrackMeeting>) -> Vec<ScheduledEvent> {
    meetings
        .into_iter()
        .flat_map(|meeting| {
            let track = meeting.track;
            meeting.races.into_iter().map(move |race| ScheduledEvent {
                date,
                track: track.clone(),
                event_number: race.event_number,
                start_time: race.start_time,
                event_url: race.url,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::fake::FakePort;
    use crate::scraper::test_support::{listing_html, test_context, LISTING_URL};
    use std::sync::Arc;

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 20).unwrap()
    }

    fn two_tab_port() -> FakePort {
        // Tab 0 shows yesterday's card, tab 1 today's
        FakePort::new()
            .page(
                LISTING_URL,
                &listing_html(0, &[("Albion Park", "albion-park-20250419", &["R1 18:00"])]),
            )
            .on_click(
                LISTING_URL,
                Target::Nth(TAB_SELECTOR, 1),
                &listing_html(
                    1,
                    &[
                        ("Sale", "sale-20250420", &["R1 19:42", "R2 20:01"]),
                        ("Healesville", "healesville-20250420", &["R1 11:05"]),
                    ],
                ),
            )
    }

    #[tokio::test]
    async fn test_acquire_picks_tab_by_url_date() {
        let temp = tempfile::tempdir().unwrap();
        let port = Arc::new(two_tab_port());
        let acquirer = RaceListAcquirer::new(test_context(&port, temp.path()), &test_source());

        let events = acquirer.acquire(target()).await.unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].track, "Sale");
        assert_eq!(events[0].event_number, "R1");
        assert_eq!(events[0].start_time, "19:42");
        assert_eq!(events[2].track, "Healesville");
        assert!(events.iter().all(|e| e.date == target()));

        let store = crate::storage::ExportStore::new(temp.path().join("exports"));
        let saved = store.read_schedule(target()).unwrap().unwrap();
        assert_eq!(saved, events);
        assert_eq!(port.opened_sessions(), port.closed_sessions());
    }

    #[tokio::test]
    async fn test_rerun_replaces_schedule() {
        let temp = tempfile::tempdir().unwrap();
        let store = crate::storage::ExportStore::new(temp.path().join("exports"));
        let stale = ScheduledEvent {
            date: target(),
            track: "Stale Park".into(),
            event_number: "R9".into(),
            start_time: "23:59".into(),
            event_url: "https://www.odds.com.au/greyhounds/stale-20250420/race-9/".into(),
        };
        store.write_schedule(target(), &[stale.clone(), stale]).unwrap();

        let port = Arc::new(two_tab_port());
        let acquirer = RaceListAcquirer::new(test_context(&port, temp.path()), &test_source());
        acquirer.acquire(target()).await.unwrap();
        acquirer.acquire(target()).await.unwrap();

        let saved = store.read_schedule(target()).unwrap().unwrap();
        assert_eq!(saved.len(), 3);
        assert!(saved.iter().all(|e| e.track != "Stale Park"));
    }

    #[tokio::test]
    async fn test_no_matching_tab_is_empty_and_unwritten() {
        let temp = tempfile::tempdir().unwrap();
        let port = Arc::new(two_tab_port());
        let acquirer = RaceListAcquirer::new(test_context(&port, temp.path()), &test_source());

        let other_day = NaiveDate::from_ymd_opt(2025, 4, 22).unwrap();
        let events = acquirer.acquire(other_day).await.unwrap();

        assert!(events.is_empty());
        let store = crate::storage::ExportStore::new(temp.path().join("exports"));
        assert!(store.read_schedule(other_day).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_date_token_skips_tab() {
        let temp = tempfile::tempdir().unwrap();
        let port = Arc::new(FakePort::new().page(
            LISTING_URL,
            &listing_html(0, &[("Sale", "sale-today", &["R1 19:42"])]),
        ));
        let acquirer = RaceListAcquirer::new(test_context(&port, temp.path()), &test_source());

        let events = acquirer.acquire(target()).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_listing_never_ready_is_source_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let port = Arc::new(FakePort::new().page(LISTING_URL, "<html><body>Maintenance</body></html>"));
        let acquirer = RaceListAcquirer::new(test_context(&port, temp.path()), &test_source());

        let err = acquirer.acquire(target()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::SourceUnavailable(_)));
        assert!(err.is_transient());
        assert_eq!(port.closed_sessions(), 1);

        // Diagnostic dump written
        let dumps: Vec<_> = std::fs::read_dir(temp.path().join("diagnostics")).unwrap().collect();
        assert_eq!(dumps.len(), 1);
    }

    fn test_source() -> SourceConfig {
        SourceConfig {
            race_list_url: LISTING_URL.to_string(),
            odds_base_url: "https://www.odds.com.au".to_string(),
            results_base_url: "https://results.test".to_string(),
        }
    }
}

//! Batch Detail Scraper
//!
//! Visits every scheduled event, at most `max_concurrent` at a time, and
//! reads the Win and Place odds grids. The result is one snapshot file per
//! run, stamped with the time the run started.

use chrono::Utc;
use chrono_tz::Tz;
use futures::future::join_all;
use std::time::Instant;
use tracing::{error, info, warn};

use super::parsers::odds::{ROW_SELECTOR, TOGGLE_SELECTOR};
use super::parsers::{OddsGridParser, RunnerNamesParser};
use super::port::{AutomationPort, ReadyCondition, Session, Target};
use super::{close_session, ScrapeContext};
use crate::config::TimeoutConfig;
use crate::error::{ScrapeError, ScrapeResult};
use crate::types::{BetVariant, OddsQuote, OddsRecord, ScheduledEvent, Snapshot};

pub struct DetailScraper<P: AutomationPort> {
    ctx: ScrapeContext<P>,
    bookmakers: Vec<String>,
    tz: Tz,
}

impl<P: AutomationPort> DetailScraper<P> {
    pub fn new(ctx: ScrapeContext<P>, bookmakers: Vec<String>, tz: Tz) -> Self {
        Self { ctx, bookmakers, tz }
    }

    /// Scrape every event and write one snapshot.
    ///
    /// Events run in batches of `max_concurrent`; a batch finishes before the
    /// next starts. A failing event contributes no records and never stops
    /// the rest. An empty schedule is a no-op.
    pub async fn scrape_all(&self, schedule: &[ScheduledEvent], max_concurrent: usize) -> Vec<OddsRecord> {
        if schedule.is_empty() {
            warn!("Schedule is empty, nothing to scrape");
            return Vec::new();
        }

        let captured_at = Utc::now().with_timezone(&self.tz);
        let batch_size = max_concurrent.max(1);
        let started = Instant::now();
        info!(
            "Scraping {} events, {} at a time",
            schedule.len(),
            batch_size
        );

        let mut records = Vec::new();
        for (n, batch) in schedule.chunks(batch_size).enumerate() {
            info!("Batch {}: {} events", n + 1, batch.len());
            let results = join_all(batch.iter().map(|event| self.scrape_event(event))).await;
            records.extend(results.into_iter().flatten());
        }

        let snapshot = Snapshot {
            captured_at,
            bookmakers: self.bookmakers.clone(),
            records,
        };
        match self.ctx.store.write_snapshot(&snapshot) {
            Ok(path) => info!(
                "Saved {} odds rows to {} in {:.1}s",
                snapshot.records.len(),
                path.display(),
                started.elapsed().as_secs_f64()
            ),
            Err(e) => error!("{}", e),
        }

        snapshot.records
    }

    /// One event in its own session. Never fails: errors yield no records.
    async fn scrape_event(&self, event: &ScheduledEvent) -> Vec<OddsRecord> {
        let label = format!("{} {}", event.track, event.event_number);
        info!("Scraping {} - {}", label, event.event_url);

        let mut session = match self.ctx.port.open().await {
            Ok(session) => session,
            Err(e) => {
                error!("{}: could not open session: {}", label, e);
                return Vec::new();
            }
        };

        let records = match self.read_event(&mut session, event).await {
            Ok(records) => {
                info!("{}: {} odds rows", label, records.len());
                records
            }
            Err(e) => {
                error!("{}: {}", label, e);
                if let Ok(html) = session.content().await {
                    self.ctx.dumps.dump(&label, &html);
                }
                Vec::new()
            }
        };

        close_session(&mut session).await;
        records
    }

    async fn read_event(&self, session: &mut P::Session, event: &ScheduledEvent) -> ScrapeResult<Vec<OddsRecord>> {
        let timeouts = &self.ctx.timeouts;
        let ready = ReadyCondition::navigate(TimeoutConfig::ms(timeouts.navigation))
            .wait_for(ROW_SELECTOR, TimeoutConfig::ms(timeouts.odds_table));
        session.goto(&event.event_url, &ready).await?;

        let names = session.extract(&RunnerNamesParser).await?;
        let win = session.extract(&OddsGridParser).await?;
        let mut records = self.to_records(event, &names, win, BetVariant::Win);

        match self.read_place(session).await {
            Ok(place) => records.extend(self.to_records(event, &names, place, BetVariant::Place)),
            // Win odds are still worth keeping
            Err(e @ (ScrapeError::ToggleNotFound(_) | ScrapeError::SelectorTimeout { .. })) => {
                warn!("{} {}: Place odds unavailable: {}", event.track, event.event_number, e);
            }
            Err(e) => return Err(e),
        }

        Ok(records)
    }

    async fn read_place(&self, session: &mut P::Session) -> ScrapeResult<Vec<Vec<OddsQuote>>> {
        let toggle = Target::Text {
            selector: TOGGLE_SELECTOR,
            text: "Place",
        };
        if !session.click(toggle).await? {
            return Err(ScrapeError::ToggleNotFound("Place".to_string()));
        }

        tokio::time::sleep(TimeoutConfig::ms(self.ctx.timeouts.toggle_settle)).await;
        session
            .wait_for(ROW_SELECTOR, TimeoutConfig::ms(self.ctx.timeouts.odds_table))
            .await?;
        session.extract(&OddsGridParser).await
    }

    fn to_records(
        &self,
        event: &ScheduledEvent,
        names: &[String],
        grid: Vec<Vec<OddsQuote>>,
        variant: BetVariant,
    ) -> Vec<OddsRecord> {
        let columns = self.bookmakers.len();
        grid.into_iter()
            .enumerate()
            .map(|(i, mut quotes)| {
                quotes.resize(columns, OddsQuote::NoQuote);
                OddsRecord {
                    track: event.track.clone(),
                    event_number: event.event_number.clone(),
                    runner_name: names
                        .get(i)
                        .filter(|n| !n.is_empty())
                        .cloned()
                        .unwrap_or_else(|| format!("Runner {}", i + 1)),
                    bet_variant: variant,
                    quotes,
                }
            })
            .collect()
    }
}

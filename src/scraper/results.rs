//! Results Acquirer
//!
//! Finds the day's section on the results index by its natural-language
//! heading, then reads every race tab of every linked track.

use chrono::NaiveDate;
use tracing::{error, info, warn};

use super::parsers::results::{results_heading, INDEX_SELECTOR, RACE_TAB_SELECTOR, TABLE_SELECTOR};
use super::parsers::{absolute_url, ResultsIndexParser, ResultsTableParser, TrackLink};
use super::port::{AutomationPort, ReadyCondition, Session, Target};
use super::{as_unavailable, close_session, ScrapeContext};
use crate::config::{SourceConfig, TimeoutConfig};
use crate::error::{ScrapeError, ScrapeResult};
use crate::types::ResultRecord;

pub struct ResultsAcquirer<P: AutomationPort> {
    ctx: ScrapeContext<P>,
    base_url: String,
}

impl<P: AutomationPort> ResultsAcquirer<P> {
    pub fn new(ctx: ScrapeContext<P>, source: &SourceConfig) -> Self {
        Self {
            ctx,
            base_url: source.results_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn index_url(&self, date: NaiveDate) -> String {
        format!("{}/results/search/{}", self.base_url, date.format("%Y-%m-%d"))
    }

    /// Collect every finishing position for `date` and overwrite `results.csv`.
    ///
    /// A track that fails is logged and skipped. Nothing is written when no
    /// records were collected.
    pub async fn acquire_results(&self, date: NaiveDate) -> ScrapeResult<Vec<ResultRecord>> {
        info!("Results scrape started for {}", date);
        let mut session = self.ctx.port.open().await?;

        let links = match self.find_links(&mut session, date).await {
            Ok(links) => links,
            Err(e) => {
                error!("Results index failed: {}", e);
                if let Ok(html) = session.content().await {
                    self.ctx.dumps.dump("results-index", &html);
                }
                close_session(&mut session).await;
                return Err(e);
            }
        };
        info!("Found {} result URLs for {}", links.len(), date);

        let mut records = Vec::new();
        for link in &links {
            match self.read_track(&mut session, link).await {
                Ok(rows) => records.extend(rows),
                Err(e) => {
                    error!("Failed to scrape {}: {}", link.track, e);
                    if let Ok(html) = session.content().await {
                        self.ctx.dumps.dump(&link.track, &html);
                    }
                }
            }
        }
        close_session(&mut session).await;

        if records.is_empty() {
            warn!("{}", ScrapeError::EmptyResult(format!("no results for {}", date)));
            return Ok(records);
        }

        match self.ctx.store.write_results(date, &records) {
            Ok(path) => info!("Saved {} results to {}", records.len(), path.display()),
            Err(e) => error!("{}", e),
        }
        Ok(records)
    }

    async fn find_links(&self, session: &mut P::Session, date: NaiveDate) -> ScrapeResult<Vec<TrackLink>> {
        let timeouts = &self.ctx.timeouts;
        let url = self.index_url(date);
        info!("Navigating to: {}", url);

        let ready = ReadyCondition::navigate(TimeoutConfig::ms(timeouts.navigation))
            .wait_for(INDEX_SELECTOR, TimeoutConfig::ms(timeouts.results_index));
        session
            .goto(&url, &ready)
            .await
            .map_err(as_unavailable("results index"))?;

        let heading = results_heading(date);
        let sections = session.extract(&ResultsIndexParser).await?;
        let available: Vec<&str> = sections.iter().map(|s| s.heading.as_str()).collect();
        info!("Available meeting headings: {}", available.join(" | "));

        let links = sections
            .into_iter()
            .find(|s| s.heading == heading)
            .map(|s| s.links)
            .unwrap_or_default();
        if links.is_empty() {
            info!("No section headed {:?}", heading);
        }
        Ok(links)
    }

    async fn read_track(&self, session: &mut P::Session, link: &TrackLink) -> ScrapeResult<Vec<ResultRecord>> {
        let timeouts = &self.ctx.timeouts;
        let url = absolute_url(&self.base_url, &link.href);
        info!("Scraping {} - {}", link.track, url);

        let ready = ReadyCondition::navigate(TimeoutConfig::ms(timeouts.navigation))
            .wait_for(TABLE_SELECTOR, TimeoutConfig::ms(timeouts.results_table));
        session.goto(&url, &ready).await?;

        // A single-race meeting may render no tab strip
        let tabs = session.count(RACE_TAB_SELECTOR).await?.max(1);

        let mut records = Vec::new();
        for i in 0..tabs {
            if i > 0 {
                if !session.click(Target::Nth(RACE_TAB_SELECTOR, i)).await? {
                    warn!("{}: race tab {} disappeared", link.track, i + 1);
                    continue;
                }
                session
                    .wait_for(TABLE_SELECTOR, TimeoutConfig::ms(timeouts.results_table))
                    .await?;
                tokio::time::sleep(TimeoutConfig::ms(timeouts.results_settle)).await;
            }

            let rows = session.extract(&ResultsTableParser::new(&link.track, i)).await?;
            info!("Scraped {} rows from {} Race {}", rows.len(), link.track, i + 1);
            records.extend(rows);
        }
        Ok(records)
    }
}

//! Job bodies: the three acquirers wired to today's date and the export store.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::info;

use crate::config::AppConfig;
use crate::error::ScrapeResult;
use crate::scheduler::{JobReport, JobRunner};
use crate::scraper::{AutomationPort, DetailScraper, RaceListAcquirer, ResultsAcquirer, ScrapeContext};
use crate::storage::ExportStore;
use crate::types::{JobKind, OddsRecord, ResultRecord, ScheduledEvent};
use std::sync::Arc;

pub struct Pipeline<P: AutomationPort> {
    race_list: RaceListAcquirer<P>,
    details: DetailScraper<P>,
    results: ResultsAcquirer<P>,
    store: Arc<ExportStore>,
    max_concurrent: usize,
    tz: Tz,
}

impl<P: AutomationPort> Pipeline<P> {
    pub fn new(ctx: ScrapeContext<P>, config: &AppConfig) -> anyhow::Result<Self> {
        let tz = config.schedule.tz()?;
        Ok(Self {
            race_list: RaceListAcquirer::new(ctx.clone(), &config.source),
            details: DetailScraper::new(ctx.clone(), config.scraper.bookmakers.clone(), tz),
            results: ResultsAcquirer::new(ctx.clone(), &config.source),
            store: ctx.store,
            max_concurrent: config.scraper.max_concurrent,
            tz,
        })
    }

    /// Today in the configured timezone
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    pub async fn acquire_schedule(&self, date: NaiveDate) -> ScrapeResult<Vec<ScheduledEvent>> {
        self.race_list.acquire(date).await
    }

    /// Snapshot `date`'s schedule, acquiring the schedule first if it was
    /// never written.
    pub async fn scrape_details(&self, date: NaiveDate, max_concurrent: usize) -> ScrapeResult<Vec<OddsRecord>> {
        let schedule = match self.store.read_schedule(date)? {
            Some(schedule) => schedule,
            None => {
                info!("No schedule for {}, acquiring it first", date);
                self.race_list.acquire(date).await?
            }
        };
        Ok(self.details.scrape_all(&schedule, max_concurrent).await)
    }

    pub async fn acquire_results(&self, date: NaiveDate) -> ScrapeResult<Vec<ResultRecord>> {
        self.results.acquire_results(date).await
    }
}

#[async_trait]
impl<P: AutomationPort> JobRunner for Pipeline<P> {
    async fn run(&self, kind: JobKind) -> ScrapeResult<JobReport> {
        let today = self.today();
        let rows = match kind {
            JobKind::RaceList => self.acquire_schedule(today).await?.len(),
            JobKind::Details => self.scrape_details(today, self.max_concurrent).await?.len(),
            JobKind::Results => self.acquire_results(today).await?.len(),
        };
        Ok(JobReport { rows })
    }
}

//! CLI commands for greyhound-harvest.
//!
//! Supports the scheduler daemon and one-shot runs of each acquirer.

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::jobs::Pipeline;
use crate::ledger::RunStatusLedger;
use crate::retry::{retry, RetryConfig};
use crate::scheduler::{ManualTrigger, Scheduler};
use crate::scraper::{Browser, ScrapeContext};
use crate::storage::{DiagnosticDumps, ExportStore};
use crate::types::{OddsRecord, ResultRecord, ScheduledEvent};

#[derive(Parser)]
#[command(name = "greyhound-harvest")]
#[command(version, about = "Greyhound racing schedule, odds and results harvester", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler until Ctrl-C
    Run {
        /// Do not start the HTTP query layer
        #[arg(long)]
        no_server: bool,

        /// Host override for the HTTP layer
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port override for the HTTP layer
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Acquire the race schedule once
    RaceList {
        /// Target date (YYYY-MM-DD), default today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Take one odds snapshot of today's schedule
    Details {
        /// Sessions per batch (default from config)
        #[arg(short, long)]
        max_concurrent: Option<usize>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Acquire race results once
    Results {
        /// Target date (YYYY-MM-DD), default today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Output format (json, table)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Run all three jobs now, through the single-flight guard and ledger
    Trigger,

    /// Print the run status ledger
    Status,
}

/// Browser plus the pipeline driving it
pub struct Harness {
    pub browser: Arc<Browser>,
    pub pipeline: Pipeline<Browser>,
}

impl Harness {
    pub async fn launch(config: &AppConfig) -> anyhow::Result<Self> {
        info!("Launching browser (headless: {})", config.browser.headless);
        let launch_retry = RetryConfig::from(&config.retry);
        let browser = Arc::new(retry(&launch_retry, "launch browser", || Browser::launch(&config.browser)).await?);
        let ctx = ScrapeContext {
            port: Arc::clone(&browser),
            store: Arc::new(ExportStore::new(&config.export.root)),
            dumps: Arc::new(DiagnosticDumps::new(&config.export.diagnostics_dir)),
            timeouts: config.scraper.timeouts.clone(),
        };
        let pipeline = Pipeline::new(ctx, config)?;
        Ok(Self { browser, pipeline })
    }

    /// Drop the pipeline and close the browser
    pub async fn shutdown(self) {
        let Harness { browser, pipeline } = self;
        drop(pipeline);
        close_browser(browser).await;
    }
}

pub async fn close_browser(browser: Arc<Browser>) {
    match Arc::try_unwrap(browser) {
        Ok(browser) => {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
        }
        Err(_) => warn!("Browser still in use at shutdown"),
    }
}

fn today(config: &AppConfig) -> anyhow::Result<NaiveDate> {
    Ok(Utc::now().with_timezone(&config.schedule.tz()?).date_naive())
}

/// Scheduler over a browser-backed pipeline
pub fn build_scheduler(
    config: &AppConfig,
    pipeline: &Arc<Pipeline<Browser>>,
) -> anyhow::Result<Scheduler<Pipeline<Browser>>> {
    let ledger = Arc::new(RunStatusLedger::new(&config.export.status_file));
    Scheduler::new(
        Arc::clone(pipeline),
        ledger,
        &config.schedule,
        RetryConfig::from(&config.retry),
    )
}

pub async fn run_race_list(config: AppConfig, date: Option<NaiveDate>, format: String) -> anyhow::Result<()> {
    let date = date.map_or_else(|| today(&config), Ok)?;
    let harness = Harness::launch(&config).await?;
    let result = harness.pipeline.acquire_schedule(date).await;
    harness.shutdown().await;

    let events = result?;
    eprintln!("{} events for {}", events.len(), date);
    print_output(events.as_slice(), &format, print_schedule_table)
}

pub async fn run_details(config: AppConfig, max_concurrent: Option<usize>, format: String) -> anyhow::Result<()> {
    let date = today(&config)?;
    let max_concurrent = max_concurrent.unwrap_or(config.scraper.max_concurrent).max(1);
    let harness = Harness::launch(&config).await?;
    let result = harness.pipeline.scrape_details(date, max_concurrent).await;
    harness.shutdown().await;

    let records = result?;
    eprintln!("{} odds rows", records.len());
    print_output(records.as_slice(), &format, print_odds_table)
}

pub async fn run_results(config: AppConfig, date: Option<NaiveDate>, format: String) -> anyhow::Result<()> {
    let date = date.map_or_else(|| today(&config), Ok)?;
    let harness = Harness::launch(&config).await?;
    let result = harness.pipeline.acquire_results(date).await;
    harness.shutdown().await;

    let records = result?;
    eprintln!("{} result rows for {}", records.len(), date);
    print_output(records.as_slice(), &format, print_results_table)
}

pub async fn run_trigger(config: AppConfig) -> anyhow::Result<()> {
    let Harness { browser, pipeline } = Harness::launch(&config).await?;
    let pipeline = Arc::new(pipeline);
    let scheduler = build_scheduler(&config, &pipeline)?;

    let outcomes = scheduler.trigger_all().await;
    drop(scheduler);
    drop(pipeline);
    close_browser(browser).await;

    for (kind, outcome) in outcomes {
        println!("{:<10} {}", kind.name(), serde_json::to_string(&outcome)?);
    }
    Ok(())
}

pub async fn run_status(config: AppConfig) -> anyhow::Result<()> {
    let ledger = RunStatusLedger::new(&config.export.status_file);
    let record = ledger.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn print_output<T: Serialize + ?Sized>(value: &T, format: &str, table: impl Fn(&T)) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(value)?),
        "table" => table(value),
        _ => {
            eprintln!("Unknown format: {}. Using JSON.", format);
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

fn print_schedule_table(events: &[ScheduledEvent]) {
    println!("{:<20} {:>5} {:>6}  URL", "Track", "Race", "Start");
    for event in events {
        println!(
            "{:<20} {:>5} {:>6}  {}",
            event.track, event.event_number, event.start_time, event.event_url
        );
    }
}

fn print_odds_table(records: &[OddsRecord]) {
    for record in records {
        let quotes: Vec<String> = record.quotes.iter().map(|q| format!("{:>6}", q.to_string())).collect();
        println!(
            "{:<16} {:>4} {:<24} {:<5} {}",
            record.track,
            record.event_number,
            record.runner_name,
            record.bet_variant,
            quotes.join(" ")
        );
    }
}

fn print_results_table(records: &[ResultRecord]) {
    println!("{:<16} {:<8} {:>5}  {:<24} {:>7}", "Track", "Race", "Place", "Runner", "SP");
    for r in records {
        println!(
            "{:<16} {:<8} {:>5}  {:<24} {:>7}",
            r.track, r.event_label, r.finish_place, r.runner_name, r.starting_price
        );
    }
}

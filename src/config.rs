//! Configuration for the harvester.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where exports, the status ledger and diagnostic dumps are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_root")]
    pub root: PathBuf,
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    #[serde(default = "default_diagnostics_dir")]
    pub diagnostics_dir: PathBuf,
}

fn default_export_root() -> PathBuf {
    PathBuf::from("exports")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("logs/run-status.json")
}

fn default_diagnostics_dir() -> PathBuf {
    PathBuf::from("logs/diagnostics")
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root: default_export_root(),
            status_file: default_status_file(),
            diagnostics_dir: default_diagnostics_dir(),
        }
    }
}

/// Local-time window in which the details job is allowed to do work
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowConfig {
    pub start_hour: u32,
    /// Inclusive
    pub end_hour: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 23,
        }
    }
}

/// Trigger schedules (six-field cron: sec min hour dom month dow)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_race_list_cron")]
    pub race_list: String,
    #[serde(default = "default_details_cron")]
    pub details: String,
    #[serde(default = "default_results_cron")]
    pub results: String,
    #[serde(default)]
    pub details_window: WindowConfig,
}

fn default_timezone() -> String {
    "Australia/Brisbane".to_string()
}

fn default_race_list_cron() -> String {
    "0 0 9 * * *".to_string()
}

fn default_details_cron() -> String {
    "0 0 * * * *".to_string()
}

fn default_results_cron() -> String {
    "0 30 23 * * *".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            race_list: default_race_list_cron(),
            details: default_details_cron(),
            results: default_results_cron(),
            details_window: WindowConfig::default(),
        }
    }
}

impl ScheduleConfig {
    pub fn tz(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone {}: {}", self.timezone, e))
    }
}

/// Scheduler retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay_secs() -> u64 {
    2
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_retry_delay_secs(),
        }
    }
}

/// Explicit bound for every wait, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation: u64,
    pub listing_ready: u64,
    pub tab_content: u64,
    pub odds_table: u64,
    pub results_index: u64,
    pub results_table: u64,
    pub tab_settle: u64,
    pub toggle_settle: u64,
    pub results_settle: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: 60_000,
            listing_ready: 10_000,
            tab_content: 20_000,
            odds_table: 20_000,
            results_index: 30_000,
            results_table: 15_000,
            tab_settle: 2_000,
            toggle_settle: 1_500,
            results_settle: 1_200,
        }
    }
}

impl TimeoutConfig {
    pub fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }
}

/// Scraper tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_bookmakers")]
    pub bookmakers: Vec<String>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_bookmakers() -> Vec<String> {
    [
        "bet365",
        "ubet",
        "tabtouch",
        "betr",
        "boombet",
        "sportsbet",
        "betfair_back",
        "betfair_lay",
        "picketbet",
        "ladbrokes",
        "pointsbet",
        "neds",
        "colossal",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            bookmakers: default_bookmakers(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Source site locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_race_list_url")]
    pub race_list_url: String,
    #[serde(default = "default_odds_base_url")]
    pub odds_base_url: String,
    #[serde(default = "default_results_base_url")]
    pub results_base_url: String,
}

fn default_race_list_url() -> String {
    "https://www.odds.com.au/greyhounds/".to_string()
}

fn default_odds_base_url() -> String {
    "https://www.odds.com.au".to_string()
}

fn default_results_base_url() -> String {
    "https://www.thegreyhoundrecorder.com.au".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            race_list_url: default_race_list_url(),
            odds_base_url: default_odds_base_url(),
            results_base_url: default_results_base_url(),
        }
    }
}

/// Headless browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub chrome_path: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

fn default_headless() -> bool {
    true
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36".to_string()
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    800
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            chrome_path: None,
            user_agent: default_user_agent(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of the human-readable format
    #[serde(default)]
    pub json: bool,
    /// Persistent log file next to the diagnostic dumps; empty disables it
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/greyhound-harvest.log"))
}

impl LoggingConfig {
    pub fn log_file(&self) -> Option<&Path> {
        self.file.as_deref().filter(|p| !p.as_os_str().is_empty())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            file: default_log_file(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (GREYHOUND__SCRAPER__MAX_CONCURRENT, etc.)
            .add_source(
                config::Environment::with_prefix("GREYHOUND")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.schedule.tz()?;
        if self.scraper.max_concurrent == 0 {
            anyhow::bail!("scraper.max_concurrent must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        let window = self.schedule.details_window;
        if window.start_hour > 23 || window.end_hour > 23 {
            anyhow::bail!("details_window hours must be within 0..=23");
        }
        if self.scraper.bookmakers.is_empty() {
            anyhow::bail!("scraper.bookmakers must name at least one bookmaker");
        }
        Ok(())
    }
}

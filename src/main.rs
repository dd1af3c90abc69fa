//! Greyhound Harvest
//!
//! Scheduled harvester for greyhound race schedules, odds snapshots and
//! results, with a thin read-only HTTP layer over the exports.

mod cli;
mod config;
mod error;
mod jobs;
mod ledger;
mod retry;
mod routes;
mod scheduler;
mod scraper;
mod storage;
mod types;

use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, Harness};
use crate::config::{AppConfig, LoggingConfig};
use crate::routes::AppState;
use crate::storage::ExportStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let _log_guard = init_tracing(&config.logging);

    match cli.command {
        Commands::Run { no_server, host, port } => run_daemon(config, no_server, host, port).await,
        Commands::RaceList { date, format } => cli::run_race_list(config, date, format).await,
        Commands::Details {
            max_concurrent,
            format,
        } => cli::run_details(config, max_concurrent, format).await,
        Commands::Results { date, format } => cli::run_results(config, date, format).await,
        Commands::Trigger => cli::run_trigger(config).await,
        Commands::Status => cli::run_status(config).await,
    }
}

/// Install stdout logging plus, when configured, a non-blocking file layer.
/// The returned guard flushes the file on drop and must outlive `main`'s work.
fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "greyhound_harvest=info,tower_http=info".into());

    let (log_file, guard) = match logging.log_file().map(file_writer) {
        Some(Ok((writer, guard))) => (Some(writer), Some(guard)),
        Some(Err(e)) => {
            eprintln!("File logging disabled: {:#}", e);
            (None, None)
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(fmt::layer().json())
            .with(log_file.map(|w| fmt::layer().json().with_writer(w)))
            .init();
    } else {
        registry
            .with(fmt::layer())
            .with(log_file.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .init();
    }
    guard
}

/// Append-only log file, created along with its directory
fn file_writer(path: &Path) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log file path {} has no file name", path.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Run the scheduler, and the HTTP layer unless disabled, until Ctrl-C.
async fn run_daemon(
    mut config: AppConfig,
    no_server: bool,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    // Override with CLI args
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("Export root: {}", config.export.root.display());
    tracing::info!("Timezone: {}", config.schedule.timezone);

    let Harness { browser, pipeline } = Harness::launch(&config).await?;
    let pipeline = Arc::new(pipeline);
    let scheduler = Arc::new(cli::build_scheduler(&config, &pipeline)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run_forever(shutdown_rx.clone()));

    let server_task = if no_server {
        None
    } else {
        let state = Arc::new(AppState {
            store: Arc::new(ExportStore::new(&config.export.root)),
            ledger: Arc::clone(scheduler.ledger()),
            trigger: scheduler.clone(),
            tz: config.schedule.tz()?,
        });
        let app = routes::router(state);

        let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
        tracing::info!("Starting server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;

        let mut rx = shutdown_rx;
        Some(tokio::spawn(async move {
            let shutdown = async move {
                while rx.changed().await.is_ok() {
                    if *rx.borrow() {
                        break;
                    }
                }
            };
            axum::serve(listener, app).with_graceful_shutdown(shutdown).await
        }))
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler_task.await {
        tracing::error!("Scheduler task failed: {}", e);
    }
    if let Some(task) = server_task {
        match task.await {
            Ok(Err(e)) => tracing::error!("Server error: {}", e),
            Err(e) => tracing::error!("Server task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    // In-flight jobs spawned by the scheduler hold their own references
    drop(scheduler);
    drop(pipeline);
    cli::close_browser(browser).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_writer_creates_log_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("logs/greyhound-harvest.log");

        let (mut writer, guard) = file_writer(&path).unwrap();
        writer.write_all(b"raceList completed (12 rows)\n").unwrap();
        drop(writer);
        drop(guard);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("raceList completed"));
    }

    #[test]
    fn test_file_writer_rejects_bare_directory() {
        assert!(file_writer(Path::new("/")).is_err());
    }
}

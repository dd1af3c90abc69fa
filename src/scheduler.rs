//! Run Scheduler
//!
//! Fires each job on its own cron schedule. A job type never runs twice at
//! once: a trigger that finds its job running is dropped, not queued.
//! Transient failures are retried with a fixed delay before the outcome is
//! written to the status ledger.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{ScheduleConfig, WindowConfig};
use crate::error::{ScrapeError, ScrapeResult};
use crate::ledger::RunStatusLedger;
use crate::retry::{retry_if, RetryConfig};
use crate::types::JobKind;

/// What a job body did on success
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Rows collected (events, odds rows or result rows)
    pub rows: usize,
}

/// Executes job bodies. The scheduler owns when and how often.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, kind: JobKind) -> ScrapeResult<JobReport>;
}

/// Who asked for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Cron fire; the details window applies
    Scheduled,
    /// CLI or HTTP trigger; runs at any hour
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    AlreadyRunning,
    OutsideWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TriggerOutcome {
    Completed { rows: usize },
    Failed { error: String },
    Skipped { reason: SkipReason },
}

// ==================== Single-flight ====================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobState {
    #[default]
    Idle,
    Running,
}

/// One state token per job type
#[derive(Debug, Default)]
pub struct JobSlots {
    states: Mutex<HashMap<JobKind, JobState>>,
}

impl JobSlots {
    /// Move `kind` from Idle to Running. `None` if it is already Running.
    pub fn try_acquire(self: &Arc<Self>, kind: JobKind) -> Option<RunGuard> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = states.entry(kind).or_default();
        if *state == JobState::Running {
            return None;
        }
        *state = JobState::Running;
        Some(RunGuard {
            slots: Arc::clone(self),
            kind,
        })
    }

    #[cfg(test)]
    pub fn state(&self, kind: JobKind) -> JobState {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.get(&kind).copied().unwrap_or_default()
    }
}

/// Returns its job to Idle when dropped, including on panic or cancellation
#[derive(Debug)]
pub struct RunGuard {
    slots: Arc<JobSlots>,
    kind: JobKind,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut states = self.slots.states.lock().unwrap_or_else(|e| e.into_inner());
        states.insert(self.kind, JobState::Idle);
    }
}

// ==================== Time window ====================

/// Local hours in which the details job may do work
#[derive(Debug, Clone, Copy)]
pub struct DetailsWindow {
    start_hour: u32,
    end_hour: u32,
    tz: Tz,
}

impl DetailsWindow {
    pub fn new(config: WindowConfig, tz: Tz) -> Self {
        Self {
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            tz,
        }
    }

    /// Inclusive at both ends. A window with `start > end` wraps midnight.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let hour = at.with_timezone(&self.tz).hour();
        if self.start_hour <= self.end_hour {
            (self.start_hour..=self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }
}

// ==================== Scheduler ====================

pub struct Scheduler<R: JobRunner> {
    runner: Arc<R>,
    ledger: Arc<RunStatusLedger>,
    slots: Arc<JobSlots>,
    schedules: Vec<(JobKind, Schedule)>,
    window: DetailsWindow,
    retry: RetryConfig,
    tz: Tz,
}

impl<R: JobRunner> Scheduler<R> {
    pub fn new(
        runner: Arc<R>,
        ledger: Arc<RunStatusLedger>,
        config: &ScheduleConfig,
        retry: RetryConfig,
    ) -> anyhow::Result<Self> {
        let tz = config.tz()?;
        let mut schedules = Vec::new();
        for (kind, expr) in [
            (JobKind::RaceList, &config.race_list),
            (JobKind::Details, &config.details),
            (JobKind::Results, &config.results),
        ] {
            let schedule = Schedule::from_str(expr)
                .map_err(|e| anyhow::anyhow!("Invalid {} schedule {:?}: {}", kind, expr, e))?;
            schedules.push((kind, schedule));
        }

        Ok(Self {
            runner,
            ledger,
            slots: Arc::new(JobSlots::default()),
            schedules,
            window: DetailsWindow::new(config.details_window, tz),
            retry,
            tz,
        })
    }

    pub fn ledger(&self) -> &Arc<RunStatusLedger> {
        &self.ledger
    }

    #[cfg(test)]
    pub fn job_state(&self, kind: JobKind) -> JobState {
        self.slots.state(kind)
    }

    fn schedule(&self, kind: JobKind) -> Option<&Schedule> {
        self.schedules.iter().find(|(k, _)| *k == kind).map(|(_, s)| s)
    }

    /// First fire time of `kind` strictly after `after`, in local time
    pub fn next_run(&self, kind: JobKind, after: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
        self.schedule(kind)?
            .after(&after.with_timezone(&self.tz))
            .next()
            .map(|t| t.fixed_offset())
    }

    pub fn next_runs(&self, after: DateTime<Utc>) -> Vec<(JobKind, Option<DateTime<FixedOffset>>)> {
        JobKind::ALL
            .iter()
            .map(|kind| (*kind, self.next_run(*kind, after)))
            .collect()
    }

    /// Run `kind` once through the single-flight guard, retries and ledger.
    pub async fn trigger(&self, kind: JobKind, gate: Gate) -> TriggerOutcome {
        if gate == Gate::Scheduled && kind == JobKind::Details && !self.window.contains(Utc::now()) {
            info!("{} trigger outside the active window, skipping", kind);
            return TriggerOutcome::Skipped {
                reason: SkipReason::OutsideWindow,
            };
        }

        let Some(_guard) = self.slots.try_acquire(kind) else {
            warn!("{} is already running, skipping this trigger", kind);
            return TriggerOutcome::Skipped {
                reason: SkipReason::AlreadyRunning,
            };
        };

        info!("{} started", kind);
        self.ledger.mark_started(kind).await;

        let result = retry_if(
            &self.retry,
            kind.name(),
            || self.runner.run(kind),
            ScrapeError::is_transient,
        )
        .await;

        let now = Utc::now();
        let finished_at = now.with_timezone(&self.tz).fixed_offset();
        let next_runs = self.next_runs(now);

        match result {
            Ok(report) => {
                info!("{} completed ({} rows)", kind, report.rows);
                self.ledger
                    .record_outcome(kind, finished_at, None, &next_runs)
                    .await;
                TriggerOutcome::Completed { rows: report.rows }
            }
            Err(e) => {
                error!("{} failed: {}", kind, e);
                self.ledger
                    .record_outcome(kind, finished_at, Some(e.to_string()), &next_runs)
                    .await;
                TriggerOutcome::Failed { error: e.to_string() }
            }
        }
    }

    /// Fire every job on its schedule until `shutdown` flips to true.
    ///
    /// Each fire runs on its own task, so a slow job never delays the next
    /// tick; an overlapping tick is dropped by the single-flight guard.
    pub async fn run_forever(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        self.ledger.reset_running().await;
        self.ledger.set_next_runs(&self.next_runs(Utc::now())).await;

        for (kind, next) in self.next_runs(Utc::now()) {
            match next {
                Some(at) => info!("{} next run at {}", kind, at),
                None => warn!("{} has no upcoming fire time", kind),
            }
        }

        let tasks: Vec<_> = JobKind::ALL
            .iter()
            .map(|kind| {
                let this = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(this.tick_loop(*kind, shutdown))
            })
            .collect();

        for task in tasks {
            if let Err(e) = task.await {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
    }

    async fn tick_loop(self: Arc<Self>, kind: JobKind, mut shutdown: watch::Receiver<bool>) {
        // Slots are computed after the last fired one, never from the wall
        // clock alone, so a timer that wakes early cannot fire a slot twice.
        let mut last_fired: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let after = last_fired.map_or(now, |fired| fired.max(now));
            let Some(next) = self.next_run(kind, after) else {
                warn!("{} schedule is exhausted", kind);
                return;
            };
            let next = next.with_timezone(&Utc);
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            }

            last_fired = Some(next);
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.trigger(kind, Gate::Scheduled).await;
            });
        }
    }
}

/// Out-of-band run of every job, used by the CLI and the HTTP layer
#[async_trait]
pub trait ManualTrigger: Send + Sync {
    async fn trigger_all(&self) -> Vec<(JobKind, TriggerOutcome)>;
}

#[async_trait]
impl<R: JobRunner> ManualTrigger for Scheduler<R> {
    async fn trigger_all(&self) -> Vec<(JobKind, TriggerOutcome)> {
        let mut outcomes = Vec::new();
        for kind in JobKind::ALL {
            outcomes.push((kind, self.trigger(kind, Gate::Manual).await));
        }
        outcomes
    }
}

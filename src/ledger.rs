//! Run Status Ledger
//!
//! One JSON record with a status block per job. Every write re-reads the
//! file and changes only the fields it owns, so keys written by anyone else
//! survive.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::storage::write_atomic;
use crate::types::JobKind;

/// Observable state of one job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub last_run: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub next_run: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The whole persisted record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    /// True while any job is running
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub race_list: RunStatus,
    #[serde(default)]
    pub details: RunStatus,
    #[serde(default)]
    pub results: RunStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LedgerRecord {
    pub fn job(&self, kind: JobKind) -> &RunStatus {
        match kind {
            JobKind::RaceList => &self.race_list,
            JobKind::Details => &self.details,
            JobKind::Results => &self.results,
        }
    }

    pub fn job_mut(&mut self, kind: JobKind) -> &mut RunStatus {
        match kind {
            JobKind::RaceList => &mut self.race_list,
            JobKind::Details => &mut self.details,
            JobKind::Results => &mut self.results,
        }
    }
}

/// File-backed ledger. Writes are serialized and best-effort.
#[derive(Debug)]
pub struct RunStatusLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RunStatusLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Current record. A missing or unreadable file reads as all defaults.
    pub async fn snapshot(&self) -> LedgerRecord {
        let _guard = self.lock.lock().await;
        self.read()
    }

    /// Read, apply `change`, and write back.
    ///
    /// Write failures are logged and swallowed; the merged record is returned
    /// either way.
    pub async fn update<F>(&self, change: F) -> LedgerRecord
    where
        F: FnOnce(&mut LedgerRecord),
    {
        let _guard = self.lock.lock().await;
        let mut record = self.read();
        change(&mut record);
        record.running = JobKind::ALL.iter().any(|k| record.job(*k).running);

        match serde_json::to_vec_pretty(&record) {
            Ok(bytes) => {
                if let Err(e) = write_atomic(&self.path, &bytes) {
                    error!("Failed to write status ledger: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize status ledger: {}", e),
        }
        record
    }

    pub async fn mark_started(&self, kind: JobKind) -> LedgerRecord {
        debug!("Ledger: {} started", kind);
        self.update(|record| record.job_mut(kind).running = true).await
    }

    /// Terminal transition: clear `running`, stamp `lastRun`, set or clear
    /// `lastError`, and refresh every job's `nextRun`.
    pub async fn record_outcome(
        &self,
        kind: JobKind,
        finished_at: DateTime<FixedOffset>,
        error: Option<String>,
        next_runs: &[(JobKind, Option<DateTime<FixedOffset>>)],
    ) -> LedgerRecord {
        self.update(|record| {
            let status = record.job_mut(kind);
            status.running = false;
            status.last_run = Some(finished_at);
            status.last_error = error;
            apply_next_runs(record, next_runs);
        })
        .await
    }

    pub async fn set_next_runs(&self, next_runs: &[(JobKind, Option<DateTime<FixedOffset>>)]) -> LedgerRecord {
        self.update(|record| apply_next_runs(record, next_runs)).await
    }

    /// Clear stale `running` flags left by a process that died mid-job
    pub async fn reset_running(&self) -> LedgerRecord {
        self.update(|record| {
            for kind in JobKind::ALL {
                record.job_mut(kind).running = false;
            }
        })
        .await
    }

    fn read(&self) -> LedgerRecord {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LedgerRecord::default(),
            Err(e) => {
                warn!("Failed to read status ledger {}: {}", self.path.display(), e);
                return LedgerRecord::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("Status ledger {} is malformed, starting fresh: {}", self.path.display(), e);
            LedgerRecord::default()
        })
    }
}

fn apply_next_runs(record: &mut LedgerRecord, next_runs: &[(JobKind, Option<DateTime<FixedOffset>>)]) {
    for (kind, next) in next_runs {
        record.job_mut(*kind).next_run = *next;
    }
}

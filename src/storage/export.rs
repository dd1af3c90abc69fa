//! Date-partitioned CSV exports

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::write_atomic;
use crate::error::{ScrapeError, ScrapeResult};
use crate::types::{OddsRecord, ResultRecord, ScheduledEvent, Snapshot};
use tracing::warn;

const SCHEDULE_FILE: &str = "schedule.csv";
const RESULTS_FILE: &str = "results.csv";
const SNAPSHOT_PREFIX: &str = "details-";

/// Upper bound on same-minute snapshot suffixes
const MAX_SNAPSHOT_SUFFIX: u32 = 100;

/// A CSV row read back as header -> cell
pub type Row = Map<String, Value>;

/// Export root with one directory per calendar date
#[derive(Debug, Clone)]
pub struct ExportStore {
    root: PathBuf,
}

impl ExportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn date_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format("%Y-%m-%d").to_string())
    }

    pub fn schedule_path(&self, date: NaiveDate) -> PathBuf {
        self.date_dir(date).join(SCHEDULE_FILE)
    }

    pub fn results_path(&self, date: NaiveDate) -> PathBuf {
        self.date_dir(date).join(RESULTS_FILE)
    }

    pub fn snapshot_path(&self, date: NaiveDate, stem: &str) -> PathBuf {
        self.date_dir(date).join(format!("{}.csv", stem))
    }

    // ==================== Schedule ====================

    /// Replace the day's schedule
    pub fn write_schedule(&self, date: NaiveDate, events: &[ScheduledEvent]) -> ScrapeResult<PathBuf> {
        let path = self.schedule_path(date);
        let bytes = serialize_rows(&path, events)?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// The day's schedule, or `None` if it was never written
    pub fn read_schedule(&self, date: NaiveDate) -> ScrapeResult<Option<Vec<ScheduledEvent>>> {
        let path = self.schedule_path(date);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path).map_err(|e| ScrapeError::persistence(&path, e))?;
        let events = reader
            .deserialize()
            .collect::<Result<Vec<ScheduledEvent>, _>>()
            .map_err(|e| ScrapeError::persistence(&path, e))?;
        Ok(Some(events))
    }

    // ==================== Snapshots ====================

    /// Write a new snapshot file. Existing snapshots are never overwritten:
    /// a second snapshot in the same minute gets a `-2`, `-3`, ... suffix.
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> ScrapeResult<PathBuf> {
        let dir = self.date_dir(snapshot.date());
        std::fs::create_dir_all(&dir).map_err(|e| ScrapeError::persistence(&dir, e))?;

        let base = snapshot.file_stem();
        let bytes = snapshot_csv(&dir.join(format!("{}.csv", base)), snapshot)?;

        for n in 1..=MAX_SNAPSHOT_SUFFIX {
            let stem = if n == 1 {
                base.clone()
            } else {
                format!("{}-{}", base, n)
            };
            let path = dir.join(format!("{}.csv", stem));

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    fill_new_file(&path, file, &bytes)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(ScrapeError::persistence(&path, e)),
            }
        }

        Err(ScrapeError::persistence(
            dir.join(format!("{}.csv", base)),
            "too many snapshots in one minute",
        ))
    }

    /// Snapshot file stems for a date, oldest first
    pub fn list_snapshots(&self, date: NaiveDate) -> ScrapeResult<Vec<String>> {
        let dir = self.date_dir(date);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir).map_err(|e| ScrapeError::persistence(&dir, e))?;
        let mut stems: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let stem = name.strip_suffix(".csv")?;
                stem.starts_with(SNAPSHOT_PREFIX).then(|| stem.to_string())
            })
            .collect();

        stems.sort_by_key(|stem| snapshot_sort_key(stem));
        Ok(stems)
    }

    // ==================== Results ====================

    /// Replace the day's results
    pub fn write_results(&self, date: NaiveDate, records: &[ResultRecord]) -> ScrapeResult<PathBuf> {
        let path = self.results_path(date);
        let bytes = serialize_rows(&path, records)?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    // ==================== Generic reads ====================

    /// Read any export back as header-keyed rows. Missing file reads as empty.
    pub fn read_rows(&self, path: &Path) -> ScrapeResult<Vec<Row>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(path).map_err(|e| ScrapeError::persistence(path, e))?;
        let headers = reader
            .headers()
            .map_err(|e| ScrapeError::persistence(path, e))?
            .clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ScrapeError::persistence(path, e))?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }
}

fn serialize_rows<T: Serialize>(path: &Path, rows: &[T]) -> ScrapeResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ScrapeError::persistence(path, e))?;
    }
    writer
        .into_inner()
        .map_err(|e| ScrapeError::persistence(path, e))
}

fn snapshot_csv(path: &Path, snapshot: &Snapshot) -> ScrapeResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![
        "track".to_string(),
        "eventNumber".to_string(),
        "runnerName".to_string(),
        "betVariant".to_string(),
    ];
    header.extend(snapshot.bookmakers.iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| ScrapeError::persistence(path, e))?;

    for record in &snapshot.records {
        writer
            .write_record(odds_row(record, snapshot.bookmakers.len()))
            .map_err(|e| ScrapeError::persistence(path, e))?;
    }

    writer
        .into_inner()
        .map_err(|e| ScrapeError::persistence(path, e))
}

fn odds_row(record: &OddsRecord, columns: usize) -> Vec<String> {
    let mut row = vec![
        record.track.clone(),
        record.event_number.clone(),
        record.runner_name.clone(),
        record.bet_variant.to_string(),
    ];
    row.extend((0..columns).map(|i| {
        record
            .quotes
            .get(i)
            .copied()
            .unwrap_or_default()
            .to_string()
    }));
    row
}

/// `details-HH-MM[-N]` orders by time, then by suffix
fn snapshot_sort_key(stem: &str) -> (String, u32) {
    let rest = stem.trim_start_matches(SNAPSHOT_PREFIX);
    let time: String = rest.chars().take(5).collect();
    let suffix = rest
        .get(5..)
        .and_then(|s| s.strip_prefix('-'))
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    (time, suffix)
}

/// Write `bytes` into a just-created `path`, removing the file again if the
/// write fails so a partial snapshot is never left behind
fn fill_new_file<W: Write>(path: &Path, mut file: W, bytes: &[u8]) -> ScrapeResult<()> {
    let written = file.write_all(bytes).and_then(|_| file.flush());
    drop(file);

    if let Err(e) = written {
        if let Err(rm) = std::fs::remove_file(path) {
            warn!("Failed to remove partial snapshot {}: {}", path.display(), rm);
        }
        return Err(ScrapeError::persistence(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BetVariant, OddsQuote};
    use chrono::TimeZone;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 20).unwrap()
    }

    fn event(track: &str, number: &str) -> ScheduledEvent {
        ScheduledEvent {
            date: date(),
            track: track.to_string(),
            event_number: number.to_string(),
            start_time: "19:42".to_string(),
            event_url: format!("https://www.odds.com.au/greyhounds/{}-20250420/race-1/", track),
        }
    }

    fn snapshot(hour: u32, minute: u32) -> Snapshot {
        Snapshot {
            captured_at: chrono_tz::Australia::Brisbane
                .with_ymd_and_hms(2025, 4, 20, hour, minute, 0)
                .unwrap(),
            bookmakers: vec!["bet365".into(), "neds".into()],
            records: vec![OddsRecord {
                track: "Sale".into(),
                event_number: "R1".into(),
                runner_name: "1. Zipping Zara".into(),
                bet_variant: BetVariant::Win,
                quotes: vec![OddsQuote::Price(3.4)],
            }],
        }
    }

    #[test]
    fn test_schedule_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let store = ExportStore::new(temp.path());

        assert!(store.read_schedule(date()).unwrap().is_none());

        let events = vec![event("sale", "R1"), event("sale", "R2")];
        let path = store.write_schedule(date(), &events).unwrap();
        assert!(path.ends_with("2025-04-20/schedule.csv"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("date,track,eventNumber,startTime,eventURL\n"));

        let read = store.read_schedule(date()).unwrap().unwrap();
        assert_eq!(read, events);
    }

    #[test]
    fn test_schedule_overwrite_replaces() {
        let temp = tempfile::tempdir().unwrap();
        let store = ExportStore::new(temp.path());

        store
            .write_schedule(date(), &[event("sale", "R1"), event("sale", "R2")])
            .unwrap();
        store.write_schedule(date(), &[event("angle-park", "R1")]).unwrap();

        let read = store.read_schedule(date()).unwrap().unwrap();
        assert_eq!(read, vec![event("angle-park", "R1")]);
    }

    #[test]
    fn test_snapshot_layout() {
        let temp = tempfile::tempdir().unwrap();
        let store = ExportStore::new(temp.path());

        let path = store.write_snapshot(&snapshot(19, 5)).unwrap();
        assert!(path.ends_with("2025-04-20/details-19-05.csv"));

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("track,eventNumber,runnerName,betVariant,bet365,neds")
        );
        // Missing trailing quotes are padded with the sentinel
        assert_eq!(lines.next(), Some("Sale,R1,1. Zipping Zara,Win,3.4,-"));
    }

    #[test]
    fn test_snapshot_never_overwritten() {
        let temp = tempfile::tempdir().unwrap();
        let store = ExportStore::new(temp.path());

        let first = store.write_snapshot(&snapshot(9, 0)).unwrap();
        let second = store.write_snapshot(&snapshot(9, 0)).unwrap();
        let later = store.write_snapshot(&snapshot(10, 0)).unwrap();

        assert_ne!(first, second);
        assert!(second.ends_with("details-09-00-2.csv"));
        assert!(later.ends_with("details-10-00.csv"));

        let stems = store.list_snapshots(date()).unwrap();
        assert_eq!(stems, vec!["details-09-00", "details-09-00-2", "details-10-00"]);
    }

    /// Accepts a few bytes, then fails like a full disk
    struct ShortWriter(usize);

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.0 == 0 {
                return Err(std::io::Error::other("no space left on device"));
            }
            let n = buf.len().min(self.0);
            self.0 -= n;
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_snapshot_write_leaves_no_file() {
        let temp = tempfile::tempdir().unwrap();
        let store = ExportStore::new(temp.path());
        let date = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();
        let dir = store.date_dir(date);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("details-19-00.csv");
        std::fs::write(&path, b"").unwrap();

        let err = fill_new_file(&path, ShortWriter(8), b"track,eventNumber\nSale,R1\n").unwrap_err();

        assert!(matches!(err, ScrapeError::Persistence { .. }));
        assert!(!path.exists());
        assert!(store.list_snapshots(date).unwrap().is_empty());
    }

    #[test]
    fn test_read_rows() {
        let temp = tempfile::tempdir().unwrap();
        let store = ExportStore::new(temp.path());

        let path = store.write_snapshot(&snapshot(9, 0)).unwrap();
        let rows = store.read_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["runnerName"], "1. Zipping Zara");
        assert_eq!(rows[0]["neds"], "-");

        let missing = store.read_rows(&store.results_path(date())).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_results_written() {
        let temp = tempfile::tempdir().unwrap();
        let store = ExportStore::new(temp.path());

        let record = ResultRecord {
            track: "Sale".into(),
            event_label: "Race 1".into(),
            finish_place: "1".into(),
            runner_name: "Zipping Zara".into(),
            ..Default::default()
        };
        let path = store.write_results(date(), &[record]).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with(
            "track,eventLabel,finishPlace,runnerName,trainer,finishTime,margin,splitTime,inRunPosition,weight,sire,dam,startingPrice\n"
        ));
    }
}

//! File storage for harvested data
//!
//! Everything lives under one export root with a subdirectory per ISO date:
//! `schedule.csv`, `details-HH-MM.csv` snapshots and `results.csv`.
//! Diagnostic HTML dumps go to a separate directory next to the logs.

pub mod diagnostics;
pub mod export;

pub use diagnostics::DiagnosticDumps;
pub use export::ExportStore;

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{ScrapeError, ScrapeResult};

/// Write via a uniquely named temporary sibling and rename, so readers never
/// see a partial file and concurrent writers never share a temp file
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> ScrapeResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| ScrapeError::persistence(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ScrapeError::persistence(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| ScrapeError::persistence(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| ScrapeError::persistence(path, e.error))?;
    Ok(())
}

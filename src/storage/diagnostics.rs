//! HTML dumps captured when an extraction fails, for post-mortem.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

/// Best-effort writer of `debug-<label>-<millis>-<seq>.html` files
#[derive(Debug)]
pub struct DiagnosticDumps {
    dir: PathBuf,
    seq: AtomicU64,
}

impl DiagnosticDumps {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// Save `html`. Failures are logged and swallowed.
    pub fn dump(&self, label: &str, html: &str) -> Option<PathBuf> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "debug-{}-{}-{}.html",
            sanitize(label),
            Utc::now().timestamp_millis(),
            seq
        );
        let path = self.dir.join(name);

        let written = std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, html));
        match written {
            Ok(()) => {
                info!("Saved error page HTML to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to save diagnostic dump {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "page".to_string()
    } else {
        trimmed.chars().take(60).collect()
    }
}

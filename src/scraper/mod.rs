//! Scrapers for the greyhound listing, odds, and results sites
//!
//! Provides the Automation Port, its chromiumoxide adapter, HTML parsers,
//! and the three acquirers that drive them.

pub mod browser;
pub mod details;
#[cfg(test)]
pub(crate) mod fake;
pub mod parsers;
pub mod port;
pub mod race_list;
pub mod results;
#[cfg(test)]
pub(crate) mod test_support;

pub use browser::Browser;
pub use details::DetailScraper;
pub use port::{AutomationPort, Session};
pub use race_list::RaceListAcquirer;
pub use results::ResultsAcquirer;

use std::sync::Arc;
use tracing::warn;

use crate::config::TimeoutConfig;
use crate::error::ScrapeError;
use crate::storage::{DiagnosticDumps, ExportStore};

/// What every acquirer needs: a port to drive, somewhere to write, and bounds
pub struct ScrapeContext<P> {
    pub port: Arc<P>,
    pub store: Arc<ExportStore>,
    pub dumps: Arc<DiagnosticDumps>,
    pub timeouts: TimeoutConfig,
}

impl<P> Clone for ScrapeContext<P> {
    fn clone(&self) -> Self {
        Self {
            port: Arc::clone(&self.port),
            store: Arc::clone(&self.store),
            dumps: Arc::clone(&self.dumps),
            timeouts: self.timeouts.clone(),
        }
    }
}

/// A page that never renders its anchor element is an unavailable source
pub(crate) fn as_unavailable(what: &'static str) -> impl Fn(ScrapeError) -> ScrapeError {
    move |err| match err {
        ScrapeError::SelectorTimeout { selector, timeout } => ScrapeError::SourceUnavailable(
            format!("{} not rendered ({} after {:?})", what, selector, timeout),
        ),
        other => other,
    }
}

pub(crate) async fn close_session<S: Session>(session: &mut S) {
    if let Err(e) = session.close().await {
        warn!("Failed to close session: {}", e);
    }
}

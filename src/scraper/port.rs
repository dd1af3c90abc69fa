//! Automation Port: the narrow browser capability the acquirers drive.
//!
//! The acquirers only ever navigate, wait, extract, and click. Everything
//! site-specific lives in [`Extractor`] implementations under `parsers`, and
//! everything browser-specific lives behind [`AutomationPort`].

use async_trait::async_trait;
use std::time::Duration;

use super::parsers::count_matches;
use crate::error::ScrapeResult;

/// When a navigation counts as finished.
#[derive(Debug, Clone)]
pub struct ReadyCondition {
    /// Bound on the navigation itself
    pub navigation_timeout: Duration,
    /// Optional selector that must be present before `goto` returns
    pub wait_for: Option<(String, Duration)>,
}

impl ReadyCondition {
    pub fn navigate(navigation_timeout: Duration) -> Self {
        Self {
            navigation_timeout,
            wait_for: None,
        }
    }

    pub fn wait_for(mut self, selector: &str, timeout: Duration) -> Self {
        self.wait_for = Some((selector.to_string(), timeout));
        self
    }
}

/// Element a click is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    /// Zero-based `n`-th element matching the selector
    Nth(&'a str, usize),
    /// First element matching the selector whose trimmed text equals `text`
    /// (ASCII case-insensitive)
    Text { selector: &'a str, text: &'a str },
}

/// Site-specific field extraction over a rendered page.
pub trait Extractor {
    type Output;

    fn extract(&self, html: &str) -> Self::Output;
}

/// One open page.
#[async_trait]
pub trait Session: Send {
    /// Navigate and block until `ready` is satisfied.
    async fn goto(&mut self, url: &str, ready: &ReadyCondition) -> ScrapeResult<()>;

    /// Block until `selector` matches, or fail with `SelectorTimeout`.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> ScrapeResult<()>;

    /// Click the target. `Ok(false)` when nothing matched.
    async fn click(&mut self, target: Target<'_>) -> ScrapeResult<bool>;

    /// Current rendered HTML.
    async fn content(&mut self) -> ScrapeResult<String>;

    async fn close(&mut self) -> ScrapeResult<()>;

    /// Run an extractor over the current page.
    async fn extract<E>(&mut self, extractor: &E) -> ScrapeResult<E::Output>
    where
        E: Extractor + Sync,
        E::Output: Send,
    {
        let html = self.content().await?;
        Ok(extractor.extract(&html))
    }

    /// Number of elements matching `selector` on the current page.
    async fn count(&mut self, selector: &str) -> ScrapeResult<usize> {
        let html = self.content().await?;
        Ok(count_matches(&html, selector))
    }
}

/// Opens sessions. Shared by every concurrent acquirer task.
#[async_trait]
pub trait AutomationPort: Send + Sync + 'static {
    type Session: Session + 'static;

    async fn open(&self) -> ScrapeResult<Self::Session>;
}

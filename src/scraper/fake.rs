//! In-memory Automation Port for tests.
//!
//! Pages are static HTML keyed by URL. A click switches the page to another
//! registered view; a click with no registered view reports "not found".
//! Selector waits succeed or time out immediately against the current HTML.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::parsers::count_matches;
use super::port::{AutomationPort, ReadyCondition, Session, Target};
use crate::error::{ScrapeError, ScrapeResult};

#[derive(Default)]
struct FakePage {
    initial: String,
    views: HashMap<String, String>,
}

#[derive(Default)]
struct Counters {
    open: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Default)]
pub struct FakePort {
    pages: HashMap<String, FakePage>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    counters: Arc<Counters>,
    visits: Arc<Mutex<Vec<String>>>,
}

impl FakePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.entry(url.to_string()).or_default().initial = html.to_string();
        self
    }

    /// HTML shown after clicking `target` on `url`
    pub fn on_click(mut self, url: &str, target: Target<'_>, html: &str) -> Self {
        self.pages
            .entry(url.to_string())
            .or_default()
            .views
            .insert(click_key(target), html.to_string());
        self
    }

    /// Navigation to `url` fails as a browser error
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Navigation to `url` takes `delay`
    pub fn delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Most sessions open at the same time
    pub fn peak_sessions(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn opened_sessions(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// URLs navigated to, in order of arrival
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

fn click_key(target: Target<'_>) -> String {
    match target {
        Target::Nth(selector, n) => format!("{}#{}", selector, n),
        Target::Text { selector, text } => format!("{}={}", selector, text.to_ascii_lowercase()),
    }
}

#[async_trait]
impl AutomationPort for FakePort {
    type Session = FakeSession;

    async fn open(&self) -> ScrapeResult<FakeSession> {
        let now_open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now_open, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(FakeSession {
            pages: self
                .pages
                .iter()
                .map(|(url, page)| (url.clone(), (page.initial.clone(), page.views.clone())))
                .collect(),
            failing: self.failing.clone(),
            delays: self.delays.clone(),
            counters: Arc::clone(&self.counters),
            visits: Arc::clone(&self.visits),
            url: None,
            html: String::new(),
            closed: false,
        })
    }
}

pub struct FakeSession {
    pages: HashMap<String, (String, HashMap<String, String>)>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    counters: Arc<Counters>,
    visits: Arc<Mutex<Vec<String>>>,
    url: Option<String>,
    html: String,
    closed: bool,
}

#[async_trait]
impl Session for FakeSession {
    async fn goto(&mut self, url: &str, ready: &ReadyCondition) -> ScrapeResult<()> {
        if let Ok(mut visits) = self.visits.lock() {
            visits.push(url.to_string());
        }
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(url) {
            return Err(ScrapeError::browser(format!("net::ERR_CONNECTION_RESET at {}", url)));
        }

        let (initial, _) = self
            .pages
            .get(url)
            .ok_or_else(|| ScrapeError::SourceUnavailable(format!("404 {}", url)))?;
        self.html = initial.clone();
        self.url = Some(url.to_string());

        if let Some((selector, timeout)) = &ready.wait_for {
            self.wait_for(selector, *timeout).await?;
        }
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> ScrapeResult<()> {
        if count_matches(&self.html, selector) > 0 {
            Ok(())
        } else {
            Err(ScrapeError::SelectorTimeout {
                selector: selector.to_string(),
                timeout,
            })
        }
    }

    async fn click(&mut self, target: Target<'_>) -> ScrapeResult<bool> {
        let Some(url) = &self.url else {
            return Ok(false);
        };
        let view = self
            .pages
            .get(url)
            .and_then(|(_, views)| views.get(&click_key(target)))
            .cloned();
        match view {
            Some(html) => {
                self.html = html;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn content(&mut self) -> ScrapeResult<String> {
        Ok(self.html.clone())
    }

    async fn close(&mut self) -> ScrapeResult<()> {
        if !self.closed {
            self.closed = true;
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

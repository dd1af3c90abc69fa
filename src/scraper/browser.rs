//! Browser automation using chromiumoxide.

use anyhow::Result;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as ChromeBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use super::port::{AutomationPort, ReadyCondition, Session, Target};
use crate::config::BrowserSettings;
use crate::error::{ScrapeError, ScrapeResult};

/// Interval between selector checks while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Headless Chrome instance; each session is one tab
pub struct Browser {
    browser: ChromeBrowser,
    handle: tokio::task::JoinHandle<()>,
    user_agent: String,
}

impl Browser {
    /// Launch a new browser instance
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        // Find Chrome executable
        let chrome_path = settings.chrome_path.clone().unwrap_or_else(|| {
            if cfg!(target_os = "macos") {
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome".to_string()
            } else if cfg!(target_os = "windows") {
                "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe".to_string()
            } else {
                "google-chrome".to_string()
            }
        });

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .no_sandbox()
            .disable_default_args()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-sync")
            .arg("--mute-audio")
            .window_size(settings.window_width, settings.window_height);

        builder = if settings.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = ChromeBrowser::launch(config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to launch browser: {}", e))?;

        // Spawn handler task - must keep running for browser to work
        let handle = tokio::spawn(async move {
            loop {
                match handler.next().await {
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => continue, // Don't break on errors
                    None => break,
                }
            }
        });

        Ok(Self {
            browser,
            handle,
            user_agent: settings.user_agent.clone(),
        })
    }

    /// Close the browser
    pub async fn close(mut self) -> Result<()> {
        let _ = self.browser.close().await;
        self.handle.abort();
        Ok(())
    }
}

#[async_trait]
impl AutomationPort for Browser {
    type Session = BrowserSession;

    async fn open(&self) -> ScrapeResult<BrowserSession> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(ScrapeError::browser)?;

        page.set_user_agent(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(ScrapeError::browser)?;

        Ok(BrowserSession { page })
    }
}

/// A single browser tab
pub struct BrowserSession {
    page: Page,
}

impl BrowserSession {
    async fn pick(&self, target: Target<'_>) -> ScrapeResult<Option<Element>> {
        let selector = match target {
            Target::Nth(s, _) | Target::Text { selector: s, .. } => s,
        };

        // find_elements errors when nothing matches
        let elements = match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            Err(_) => return Ok(None),
        };

        match target {
            Target::Nth(_, n) => Ok(elements.into_iter().nth(n)),
            Target::Text { text, .. } => {
                for element in elements {
                    let inner = element
                        .inner_text()
                        .await
                        .map_err(ScrapeError::browser)?
                        .unwrap_or_default();
                    if inner.trim().eq_ignore_ascii_case(text) {
                        return Ok(Some(element));
                    }
                }
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Session for BrowserSession {
    async fn goto(&mut self, url: &str, ready: &ReadyCondition) -> ScrapeResult<()> {
        debug!("Navigating to {}", url);
        match timeout(ready.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ScrapeError::browser(e)),
            Err(_) => {
                return Err(ScrapeError::SourceUnavailable(format!(
                    "navigation to {} timed out after {:?}",
                    url, ready.navigation_timeout
                )))
            }
        }

        if let Some((selector, wait)) = &ready.wait_for {
            self.wait_for(selector, *wait).await?;
        }
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, wait: Duration) -> ScrapeResult<()> {
        let deadline = Instant::now() + wait;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::SelectorTimeout {
                    selector: selector.to_string(),
                    timeout: wait,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&mut self, target: Target<'_>) -> ScrapeResult<bool> {
        match self.pick(target).await? {
            Some(element) => {
                element.click().await.map_err(ScrapeError::browser)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn content(&mut self) -> ScrapeResult<String> {
        self.page.content().await.map_err(ScrapeError::browser)
    }

    async fn close(&mut self) -> ScrapeResult<()> {
        self.page.clone().close().await.map_err(ScrapeError::browser)
    }
}

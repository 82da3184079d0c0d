//! Browser-driven fetch path via chromiumoxide
//!
//! One headless browser is shared by the whole process and can drive a single
//! page at a time. [`EmulatedFetcher`] serializes access to it: the backend is
//! only reachable through a [`BrowserGuard`], and the guard holds the lock until
//! it is dropped.

use crate::error::FetchError;
use crate::transport::{cookie_pairs, DEFAULT_USER_AGENT};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetUserAgentOverrideParams};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Page titles shown while a bot challenge is running
const CHALLENGE_TITLES: &[&str] = &[
    "just a moment",
    "checking your browser",
    "attention required",
    "please wait",
    "ddos-guard",
];

/// A browser engine able to open a page and get past bot challenges
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    /// Whether a browser is installed and running
    fn is_available(&self) -> bool;

    /// Open `url` with the given cookie and user agent
    async fn visit(&self, url: &str, user_agent: Option<&str>, cookie: &str) -> Result<()>;

    /// Wait for any challenge on the current page to clear
    async fn pass_challenge(&self) -> bool;

    /// Rendered HTML of the current page
    async fn get_html(&self) -> Result<String>;
}

/// Exclusive handle to the shared browser
#[derive(Clone)]
pub struct EmulatedFetcher {
    backend: Arc<dyn BrowserBackend>,
    slot: Arc<Mutex<()>>,
}

impl EmulatedFetcher {
    pub fn new(backend: impl BrowserBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Wait for exclusive use of the browser
    pub async fn acquire(&self) -> BrowserGuard<'_> {
        let permit = self.slot.lock().await;
        BrowserGuard {
            backend: self.backend.as_ref(),
            _permit: permit,
        }
    }

    /// Navigate, pass the challenge and return the rendered page.
    ///
    /// The lock is held for the whole sequence and released on every return
    /// path, including a panic inside the backend.
    pub async fn fetch(
        &self,
        url: &str,
        cookie: &str,
        user_agent: Option<&str>,
    ) -> Result<String, FetchError> {
        let browser = self.acquire().await;

        debug!(url, "browser visit");
        browser
            .visit(url, user_agent, cookie)
            .await
            .map_err(|e| FetchError::BrowserNavigationFailed {
                url: url.to_string(),
                reason: format!("{:#}", e),
            })?;

        if !browser.pass_challenge().await {
            return Err(FetchError::ChallengeNotPassed {
                url: url.to_string(),
            });
        }

        browser
            .get_html()
            .await
            .map_err(|e| FetchError::BrowserNavigationFailed {
                url: url.to_string(),
                reason: format!("{:#}", e),
            })
    }
}

/// Scoped access to the shared browser
pub struct BrowserGuard<'a> {
    backend: &'a dyn BrowserBackend,
    _permit: MutexGuard<'a, ()>,
}

impl BrowserGuard<'_> {
    pub async fn visit(&self, url: &str, user_agent: Option<&str>, cookie: &str) -> Result<()> {
        self.backend.visit(url, user_agent, cookie).await
    }

    pub async fn pass_challenge(&self) -> bool {
        self.backend.pass_challenge().await
    }

    pub async fn get_html(&self) -> Result<String> {
        self.backend.get_html().await
    }
}

/// Headless Chrome backend
pub struct ChromiumBackend {
    browser: Option<Browser>,
    page: Mutex<Option<Page>>,
    nav_timeout: Duration,
    challenge_timeout: Duration,
}

impl ChromiumBackend {
    /// Launch headless Chrome, optionally from an explicit executable
    pub async fn launch(chrome: Option<PathBuf>, nav_timeout_ms: u64) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--headless=new");
        if let Some(path) = chrome {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("Browser config error: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chrome. Is Chrome/Chromium installed?")?;

        // Spawn handler in background
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser: Some(browser),
            page: Mutex::new(None),
            nav_timeout: Duration::from_millis(nav_timeout_ms),
            challenge_timeout: Duration::from_secs(20),
        })
    }

    /// Launch, or fall back to a backend that reports itself unavailable
    pub async fn launch_or_unavailable(chrome: Option<PathBuf>, nav_timeout_ms: u64) -> Self {
        match Self::launch(chrome, nav_timeout_ms).await {
            Ok(backend) => backend,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "browser emulation disabled");
                Self::unavailable()
            }
        }
    }

    pub fn unavailable() -> Self {
        Self {
            browser: None,
            page: Mutex::new(None),
            nav_timeout: Duration::from_secs(30),
            challenge_timeout: Duration::from_secs(20),
        }
    }

    /// Close the browser
    pub async fn close(mut self) -> Result<()> {
        if let Some(mut browser) = self.browser.take() {
            browser.close().await?;
        }
        Ok(())
    }

    async fn prepare(
        &self,
        page: &Page,
        url: &str,
        user_agent: Option<&str>,
        cookie: &str,
    ) -> Result<()> {
        page.execute(SetUserAgentOverrideParams::new(
            user_agent.unwrap_or(DEFAULT_USER_AGENT),
        ))
        .await?;

        let cookies = cookie_pairs(cookie)
            .into_iter()
            .map(|(name, value)| {
                CookieParam::builder()
                    .name(name)
                    .value(value)
                    .url(url)
                    .build()
                    .map_err(|e| anyhow!("Invalid cookie: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;
        if !cookies.is_empty() {
            page.set_cookies(cookies).await?;
        }

        tokio::time::timeout(self.nav_timeout, page.goto(url))
            .await
            .map_err(|_| anyhow!("Navigation timeout"))??;
        Ok(())
    }
}

async fn close_page(page: Page) {
    if let Err(e) = page.close().await {
        debug!(error = %e, "failed to close page");
    }
}

/// Make `page` the current page if it was prepared, closing the one it
/// replaces; otherwise close `page` and leave the slot alone.
async fn settle<T, C, F>(
    slot: &Mutex<Option<T>>,
    page: T,
    prepared: Result<()>,
    close: C,
) -> Result<()>
where
    C: Fn(T) -> F,
    F: Future<Output = ()>,
{
    match prepared {
        Ok(()) => {
            let previous = slot.lock().await.replace(page);
            if let Some(previous) = previous {
                close(previous).await;
            }
            Ok(())
        }
        Err(e) => {
            close(page).await;
            Err(e)
        }
    }
}

#[async_trait]
impl BrowserBackend for ChromiumBackend {
    fn is_available(&self) -> bool {
        self.browser.is_some()
    }

    async fn visit(&self, url: &str, user_agent: Option<&str>, cookie: &str) -> Result<()> {
        let browser = self.browser.as_ref().context("Browser not running")?;
        let page = browser.new_page("about:blank").await?;
        let prepared = self.prepare(&page, url, user_agent, cookie).await;
        settle(&self.page, page, prepared, close_page).await
    }

    async fn pass_challenge(&self) -> bool {
        let guard = self.page.lock().await;
        let Some(page) = guard.as_ref() else {
            return false;
        };

        let deadline = tokio::time::Instant::now() + self.challenge_timeout;
        loop {
            if challenge_cleared(page.get_title().await) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                debug!("challenge not cleared at deadline");
                return false;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn get_html(&self) -> Result<String> {
        let guard = self.page.lock().await;
        let page = guard.as_ref().context("No page open")?;
        page.content().await.context("Failed to get page content")
    }
}

fn is_challenge_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    CHALLENGE_TITLES.iter().any(|marker| lower.contains(marker))
}

/// An unreadable title counts as still challenged
fn challenge_cleared<E: Display>(title: Result<Option<String>, E>) -> bool {
    match title {
        Ok(title) => !is_challenge_title(title.as_deref().unwrap_or_default()),
        Err(e) => {
            debug!(error = %e, "page title unreadable");
            false
        }
    }
}

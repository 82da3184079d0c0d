//! Plain-HTTP fetch path
//!
//! Up to three requests against the same logical page:
//! 1. primary GET of the site URL
//! 2. recovery from a `window.location` redirect stub
//! 3. `/index.php` fallback when the page looks like a decoy homepage
//!
//! All requests share one session so login state carries across them.

use crate::encoding;
use crate::error::{FetchError, TransportError};
use crate::redirect;
use crate::transport::HttpSession;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Why a single GET did not yield a page
#[derive(Debug)]
enum PageError {
    Transport(TransportError),
    Status(u16),
    Empty,
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::Transport(e) => write!(f, "{}", e),
            PageError::Status(code) => write!(f, "status {}", code),
            PageError::Empty => write!(f, "empty body"),
        }
    }
}

/// Markers present on the real authenticated page but not on decoy homepages
pub fn looks_like_decoy_homepage(html: &str) -> bool {
    !html.contains("\"search\"") && !html.contains("\"csrf-token\"")
}

/// Runs the staged fetch over one session
pub struct ContentFetcher {
    session: Arc<dyn HttpSession>,
}

impl ContentFetcher {
    pub fn new(session: Arc<dyn HttpSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<dyn HttpSession> {
        &self.session
    }

    /// Fetch and decode the authenticated page at `url`
    pub async fn fetch(
        &self,
        url: &str,
        cookie: &str,
        user_agent: Option<&str>,
    ) -> Result<String, FetchError> {
        debug!(url, "primary fetch");
        let mut html = match self.get_page(url, cookie, user_agent).await {
            Ok(html) => html,
            Err(PageError::Transport(source)) => {
                return Err(FetchError::ConnectionFailed {
                    url: url.to_string(),
                    source,
                })
            }
            Err(PageError::Status(status)) => {
                return Err(FetchError::BadStatus {
                    url: url.to_string(),
                    status,
                })
            }
            Err(PageError::Empty) => String::new(),
        };

        if redirect::is_redirect_stub(&html) {
            let target =
                redirect::redirect_target(&html).ok_or_else(|| FetchError::DecoyPageUnresolvable {
                    url: url.to_string(),
                })?;
            let derived = redirect::derive_url(url, &target);
            debug!(url, target = %derived, "following anti-scrape redirect");
            html = self
                .get_page(&derived, cookie, user_agent)
                .await
                .map_err(|e| FetchError::AntiScrapeRedirectFailed {
                    target: derived.clone(),
                    reason: e.to_string(),
                })?;
        }

        if looks_like_decoy_homepage(&html) {
            let fallback = format!("{}/index.php", url);
            debug!(url, target = %fallback, "decoy homepage, trying index fallback");
            html = self
                .get_page(&fallback, cookie, user_agent)
                .await
                .map_err(|e| FetchError::DecoyHomepageFallbackFailed {
                    target: fallback.clone(),
                    reason: e.to_string(),
                })?;
        }

        Ok(html)
    }

    /// GET + status check + decode
    async fn get_page(
        &self,
        url: &str,
        cookie: &str,
        user_agent: Option<&str>,
    ) -> Result<String, PageError> {
        let resp = self
            .session
            .get(url, cookie, user_agent)
            .await
            .map_err(PageError::Transport)?;
        if resp.status != 200 {
            return Err(PageError::Status(resp.status));
        }
        let html = encoding::decode(&resp);
        if html.is_empty() {
            return Err(PageError::Empty);
        }
        Ok(html)
    }
}

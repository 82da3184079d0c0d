//! HTTP transport used by the plain fetch path
//!
//! A [`Transport`] hands out sessions. A session is reused for every
//! sub-request of one dispatch and is passed on to the parser afterwards,
//! together with the cookies the server set along the way.

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Transport configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 20000,
            max_redirects: 5,
        }
    }
}

/// Proxy to route a session through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub url: String,
}

/// Where proxy settings come from
pub trait ProxySource: Send + Sync {
    fn get_proxies(&self) -> Option<ProxyConfig>;
}

/// Never proxies
pub struct NoProxy;

impl ProxySource for NoProxy {
    fn get_proxies(&self) -> Option<ProxyConfig> {
        None
    }
}

/// A fixed proxy, usually read from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticProxy(Option<ProxyConfig>);

impl StaticProxy {
    pub fn new(url: Option<String>) -> Self {
        Self(url.filter(|u| !u.trim().is_empty()).map(|url| ProxyConfig { url }))
    }
}

impl ProxySource for StaticProxy {
    fn get_proxies(&self) -> Option<ProxyConfig> {
        self.0.clone()
    }
}

/// Undecoded response of a single GET
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Charset label from the Content-Type header, if any
    pub fn charset_hint(&self) -> Option<&str> {
        let content_type = self.content_type.as_deref()?;
        content_type.split(';').find_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            key.eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"'))
                .filter(|v| !v.is_empty())
        })
    }
}

/// One logical client session (connection state, proxy, redirects)
#[async_trait]
pub trait HttpSession: Send + Sync {
    async fn get(
        &self,
        url: &str,
        cookie: &str,
        user_agent: Option<&str>,
    ) -> Result<RawResponse, TransportError>;
}

/// Factory for sessions
pub trait Transport: Send + Sync {
    fn session(&self, proxy: Option<&ProxyConfig>) -> Result<Arc<dyn HttpSession>, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    config: FetchConfig,
}

impl ReqwestTransport {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }
}

impl Transport for ReqwestTransport {
    fn session(&self, proxy: Option<&ProxyConfig>) -> Result<Arc<dyn HttpSession>, TransportError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(self.config.max_redirects))
            .user_agent(DEFAULT_USER_AGENT);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(&proxy.url).map_err(|e| {
                TransportError::Client(format!("invalid proxy {}: {}", proxy.url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let jar = Arc::new(Jar::default());
        let client = builder
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Arc::new(ReqwestSession { client, jar }))
    }
}

/// A reqwest client plus the cookie jar it fills from `Set-Cookie`
struct ReqwestSession {
    client: reqwest::Client,
    jar: Arc<Jar>,
}

impl ReqwestSession {
    /// Cookie header for `url`.
    ///
    /// The caller's cookies keep their order; a value the server has since set
    /// for the same name wins, and server-only cookies follow. Caller cookies
    /// the jar does not know yet are seeded into it so that HTTP redirects,
    /// which reqwest fills from the jar alone, still carry them.
    fn cookie_header(&self, url: &Url, cookie: &str) -> String {
        let stored = self
            .jar
            .cookies(url)
            .and_then(|v| v.to_str().ok().map(cookie_pairs))
            .unwrap_or_default();

        let mut pairs = Vec::new();
        for (name, value) in cookie_pairs(cookie) {
            match stored.iter().find(|(n, _)| *n == name) {
                Some((_, current)) => pairs.push((name, current.clone())),
                None => {
                    self.jar
                        .add_cookie_str(&format!("{}={}; Path=/", name, value), url);
                    pairs.push((name, value));
                }
            }
        }
        for (name, value) in stored {
            if !pairs.iter().any(|(n, _)| *n == name) {
                pairs.push((name, value));
            }
        }

        pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[async_trait]
impl HttpSession for ReqwestSession {
    async fn get(
        &self,
        url: &str,
        cookie: &str,
        user_agent: Option<&str>,
    ) -> Result<RawResponse, TransportError> {
        let parsed = Url::parse(url)
            .map_err(|e| TransportError::Connect(format!("invalid url {}: {}", url, e)))?;
        let mut request = self
            .client
            .get(parsed.clone())
            .header(COOKIE, self.cookie_header(&parsed, cookie));
        if let Some(ua) = user_agent {
            request = request.header(USER_AGENT, ua);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Body(e.to_string())
            }
        })?;

        Ok(RawResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Split a `name=value; name2=value2` cookie header into pairs
pub(crate) fn cookie_pairs(cookie: &str) -> Vec<(String, String)> {
    cookie
        .split(';')
        .filter_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

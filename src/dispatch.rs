//! Fetch a tracker page and bind it to the right parser
//!
//! [`Dispatcher::build`] is the single entry point: pick the browser or the
//! plain-HTTP path, obtain the authenticated HTML, classify it and construct
//! the parser registered for its schema.

use crate::browser::EmulatedFetcher;
use crate::classify::{MarkerClassifier, SchemaClassifier};
use crate::error::{FetchError, RegistryError};
use crate::fetch::ContentFetcher;
use crate::registry::{RegistryBuilder, SchemaRegistry};
use crate::schema::{BoundPage, SiteUserInfo};
use crate::transport::{HttpSession, NoProxy, ProxySource, Transport};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// One dispatch request
#[derive(Clone, Default)]
pub struct FetchRequest {
    pub url: String,
    pub site_name: String,
    /// Cookie header of an authenticated session; required
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    /// Prefer the browser path when a browser is available
    pub emulate: bool,
    /// Route plain-HTTP requests through the configured proxy
    pub proxy: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, site_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            site_name: site_name.into(),
            ..Default::default()
        }
    }

    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn emulate(mut self, emulate: bool) -> Self {
        self.emulate = emulate;
        self
    }

    pub fn proxy(mut self, proxy: bool) -> Self {
        self.proxy = proxy;
        self
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("url", &self.url)
            .field("site_name", &self.site_name)
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("emulate", &self.emulate)
            .field("proxy", &self.proxy)
            .finish()
    }
}

/// Successful fetch: decoded HTML plus the session it came from
pub struct FetchOutcome {
    pub html: String,
    pub session: Arc<dyn HttpSession>,
}

pub struct Dispatcher {
    registry: SchemaRegistry,
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn SchemaClassifier>,
    proxies: Arc<dyn ProxySource>,
    browser: Option<EmulatedFetcher>,
}

impl Dispatcher {
    /// Freeze `parsers` into the registry. Fails if no default parser was registered.
    pub fn new(
        parsers: RegistryBuilder,
        transport: impl Transport + 'static,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            registry: parsers.build()?,
            transport: Arc::new(transport),
            classifier: Arc::new(MarkerClassifier),
            proxies: Arc::new(NoProxy),
            browser: None,
        })
    }

    pub fn with_classifier(mut self, classifier: impl SchemaClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_proxy_source(mut self, proxies: impl ProxySource + 'static) -> Self {
        self.proxies = Arc::new(proxies);
        self
    }

    /// Share a browser handle; clones of one handle serialize on the same lock
    pub fn with_browser(mut self, browser: EmulatedFetcher) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Fetch the page and construct its parser.
    ///
    /// Every failure is logged and turned into `None`.
    pub async fn build(&self, request: &FetchRequest) -> Option<Box<dyn SiteUserInfo>> {
        match self.try_build(request).await {
            Ok(parser) => Some(parser),
            Err(FetchError::MissingCredentials) => {
                debug!(site = %request.site_name, url = %request.url, "no cookie, skipping");
                None
            }
            Err(e) => {
                error!(
                    site = %request.site_name,
                    url = %request.url,
                    stage = e.stage(),
                    error = %e,
                    "failed to fetch site page"
                );
                None
            }
        }
    }

    /// Like [`build`](Self::build) but returns the failure reason
    pub async fn try_build(
        &self,
        request: &FetchRequest,
    ) -> Result<Box<dyn SiteUserInfo>, FetchError> {
        let cookie = request
            .cookie
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(FetchError::MissingCredentials)?;

        debug!(
            site = %request.site_name,
            url = %request.url,
            emulate = request.emulate,
            proxy = request.proxy,
            "dispatching"
        );

        let outcome = self.fetch(request, cookie).await?;
        let classified = self.classifier.classify(&outcome.html);
        let entry = self.registry.resolve(classified);
        debug!(
            site = %request.site_name,
            schema = %entry.schema(),
            parser = entry.name(),
            "resolved parser"
        );

        Ok(entry.construct(BoundPage {
            site_name: request.site_name.clone(),
            url: request.url.clone(),
            cookie: cookie.to_string(),
            html: outcome.html,
            session: outcome.session,
            user_agent: request.user_agent.clone(),
        }))
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        cookie: &str,
    ) -> Result<FetchOutcome, FetchError> {
        let proxy = if request.proxy {
            self.proxies.get_proxies()
        } else {
            None
        };
        let session = self
            .transport
            .session(proxy.as_ref())
            .map_err(|source| FetchError::ConnectionFailed {
                url: request.url.clone(),
                source,
            })?;
        let user_agent = request.user_agent.as_deref();

        let browser = self
            .browser
            .as_ref()
            .filter(|b| request.emulate && b.is_available());
        if request.emulate && browser.is_none() {
            debug!(site = %request.site_name, "browser unavailable, using plain HTTP");
        }

        let html = match browser {
            Some(browser) => browser.fetch(&request.url, cookie, user_agent).await?,
            None => {
                ContentFetcher::new(session.clone())
                    .fetch(&request.url, cookie, user_agent)
                    .await?
            }
        };

        Ok(FetchOutcome { html, session })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::tests::FakeBrowser;
    use crate::registry::tests::{GazelleParser, NexusParser};
    use crate::schema::SiteSchema;
    use crate::transport::tests::{ok, status, ScriptedTransport};
    use crate::transport::{ProxyConfig, StaticProxy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const PAGE: &str = r#"<html><title>x</title>"search"...</html>"#;

    fn parsers() -> RegistryBuilder {
        SchemaRegistry::builder()
            .register::<NexusParser>()
            .register::<GazelleParser>()
    }

    /// Wraps a scripted transport so the test keeps a handle on it
    struct Shared(Arc<ScriptedTransport>);

    impl Transport for Shared {
        fn session(
            &self,
            proxy: Option<&ProxyConfig>,
        ) -> Result<Arc<dyn HttpSession>, crate::error::TransportError> {
            self.0.session(proxy)
        }
    }

    fn dispatcher(transport: &Arc<ScriptedTransport>) -> Dispatcher {
        Dispatcher::new(parsers(), Shared(transport.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_missing_cookie_does_no_io() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok(PAGE)]));
        let d = dispatcher(&transport);

        let request = FetchRequest::new("https://example.test", "Example");
        assert!(d.build(&request).await.is_none());
        assert_eq!(
            d.try_build(&request.clone().cookie("")).await.err(),
            Some(FetchError::MissingCredentials)
        );
        assert_eq!(transport.opened(), 0);
        assert!(transport.session.requested().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_single_fetch() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok(PAGE)]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_classifier = seen.clone();
        let d = dispatcher(&transport).with_classifier(move |html: &str| {
            seen_by_classifier.lock().unwrap().push(html.to_string());
            None
        });

        let request = FetchRequest::new("https://example.test", "Example").cookie("sid=1");
        let parser = d.build(&request).await.unwrap();

        assert_eq!(transport.session.requested(), vec!["https://example.test"]);
        assert_eq!(*seen.lock().unwrap(), vec![PAGE.to_string()]);
        assert_eq!(parser.html(), PAGE);
        assert_eq!(parser.schema(), SiteSchema::NexusPhp);
        assert_eq!(parser.site_name(), "Example");
        assert_eq!(parser.page().cookie, "sid=1");
        assert_eq!(parser.page().url, "https://example.test");
    }

    #[tokio::test]
    async fn test_classified_schema_selects_parser() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok(PAGE)]));
        let d = dispatcher(&transport).with_classifier(|_: &str| Some(SiteSchema::Gazelle));

        let request = FetchRequest::new("https://example.test", "Example").cookie("sid=1");
        let parser = d.build(&request).await.unwrap();
        assert_eq!(parser.schema(), SiteSchema::Gazelle);
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_none() {
        let transport = Arc::new(ScriptedTransport::new(vec![status(502)]));
        let d = dispatcher(&transport);

        let request = FetchRequest::new("https://example.test", "Example").cookie("sid=1");
        assert!(d.build(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_proxy_only_when_requested() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok(PAGE), ok(PAGE)]));
        let d = dispatcher(&transport)
            .with_proxy_source(StaticProxy::new(Some("http://127.0.0.1:7890".into())));

        let request = FetchRequest::new("https://example.test", "Example").cookie("sid=1");
        d.build(&request).await.unwrap();
        d.build(&request.clone().proxy(true)).await.unwrap();

        let seen = transport.proxies_seen.lock().unwrap().clone();
        assert_eq!(seen[0], None);
        assert_eq!(seen[1].as_ref().map(|p| p.url.as_str()), Some("http://127.0.0.1:7890"));
    }

    #[tokio::test]
    async fn test_emulation_uses_browser() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let d = dispatcher(&transport)
            .with_browser(EmulatedFetcher::new(FakeBrowser::new("<html>rendered</html>")));

        let request = FetchRequest::new("https://example.test", "Example")
            .cookie("sid=1")
            .emulate(true);
        let parser = d.build(&request).await.unwrap();

        assert_eq!(parser.html(), "<html>rendered</html>");
        assert!(transport.session.requested().is_empty());
        // parser still gets a reusable session
        assert_eq!(transport.opened(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_browser_falls_back_to_http() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok(PAGE)]));
        let mut backend = FakeBrowser::new("<html>rendered</html>");
        backend.available = false;
        let d = dispatcher(&transport).with_browser(EmulatedFetcher::new(backend));

        let request = FetchRequest::new("https://example.test", "Example")
            .cookie("sid=1")
            .emulate(true);
        let parser = d.build(&request).await.unwrap();
        assert_eq!(parser.html(), PAGE);
        assert_eq!(transport.session.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_without_emulate_flag_browser_is_unused() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok(PAGE)]));
        let d = dispatcher(&transport)
            .with_browser(EmulatedFetcher::new(FakeBrowser::new("<html>rendered</html>")));

        let request = FetchRequest::new("https://example.test", "Example").cookie("sid=1");
        assert_eq!(d.build(&request).await.unwrap().html(), PAGE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_emulation_does_not_overlap() {
        let mut backend = FakeBrowser::new("<html>rendered</html>");
        backend.hold = Duration::from_millis(50);
        let windows = Arc::clone(&backend.windows);
        let browser = EmulatedFetcher::new(backend);

        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let d = Arc::new(dispatcher(&transport).with_browser(browser));
        let done = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..3)
            .map(|i| {
                let d = Arc::clone(&d);
                let done = Arc::clone(&done);
                tokio::spawn(async move {
                    let request = FetchRequest::new("https://example.test", format!("Site{}", i))
                        .cookie("sid=1")
                        .emulate(true);
                    if d.build(&request).await.is_some() {
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 3);

        let mut sorted = windows.lock().unwrap().clone();
        assert_eq!(sorted.len(), 3);
        sorted.sort_by_key(|(start, _)| *start);
        for pair in sorted.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "browser sessions overlapped");
        }
    }
}

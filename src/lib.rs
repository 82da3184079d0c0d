//! sitefetch: authenticated tracker page fetching
//!
//! Turns a site URL plus session cookie into the real authenticated HTML and
//! hands it to the parser registered for the page's schema.
//!
//! - plain HTTP with anti-scrape redirect and decoy homepage recovery
//! - headless Chrome for bot challenges, one page at a time
//! - schema registry with a default fallback

pub mod browser;
pub mod classify;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod fetch;
pub mod redirect;
pub mod registry;
pub mod schema;
pub mod transport;

pub use browser::{BrowserBackend, ChromiumBackend, EmulatedFetcher};
pub use classify::{MarkerClassifier, SchemaClassifier};
pub use dispatch::{Dispatcher, FetchOutcome, FetchRequest};
pub use error::{FetchError, RegistryError, TransportError};
pub use fetch::ContentFetcher;
pub use registry::{ParserEntry, RegistryBuilder, SchemaRegistry};
pub use schema::{BoundPage, PageSnapshot, SiteParser, SiteSchema, SiteUserInfo};
pub use transport::{
    FetchConfig, HttpSession, NoProxy, ProxyConfig, ProxySource, RawResponse, ReqwestTransport,
    StaticProxy, Transport,
};

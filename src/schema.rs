//! Site schemas and the parser contract.
//!
//! A schema names the markup family a tracker belongs to. Parsers for each
//! family implement [`SiteParser`] and are collected into a
//! [`SchemaRegistry`](crate::registry::SchemaRegistry) at startup.

use crate::transport::HttpSession;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Markup family of a tracker site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteSchema {
    /// Stock NexusPHP, also the fallback
    NexusPhp,
    NexusProject,
    NexusRabbit,
    NexusHhanclub,
    NexusAudiences,
    SmallHorse,
    FileList,
    Gazelle,
    Ipt,
    DiscuzX,
    Unit3d,
    TorrentLeech,
    TNode,
    MTorrent,
}

impl SiteSchema {
    /// Schema used when classification yields nothing or an unregistered tag
    pub const DEFAULT: SiteSchema = SiteSchema::NexusPhp;

    pub const ALL: [SiteSchema; 14] = [
        SiteSchema::NexusPhp,
        SiteSchema::NexusProject,
        SiteSchema::NexusRabbit,
        SiteSchema::NexusHhanclub,
        SiteSchema::NexusAudiences,
        SiteSchema::SmallHorse,
        SiteSchema::FileList,
        SiteSchema::Gazelle,
        SiteSchema::Ipt,
        SiteSchema::DiscuzX,
        SiteSchema::Unit3d,
        SiteSchema::TorrentLeech,
        SiteSchema::TNode,
        SiteSchema::MTorrent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SiteSchema::NexusPhp => "nexusphp",
            SiteSchema::NexusProject => "nexusproject",
            SiteSchema::NexusRabbit => "nexusrabbit",
            SiteSchema::NexusHhanclub => "nexushhanclub",
            SiteSchema::NexusAudiences => "nexusaudiences",
            SiteSchema::SmallHorse => "smallhorse",
            SiteSchema::FileList => "filelist",
            SiteSchema::Gazelle => "gazelle",
            SiteSchema::Ipt => "ipt",
            SiteSchema::DiscuzX => "discuzx",
            SiteSchema::Unit3d => "unit3d",
            SiteSchema::TorrentLeech => "torrentleech",
            SiteSchema::TNode => "tnode",
            SiteSchema::MTorrent => "mtorrent",
        }
    }
}

impl std::fmt::Display for SiteSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a parser is bound to when it is constructed
#[derive(Clone)]
pub struct BoundPage {
    pub site_name: String,
    pub url: String,
    pub cookie: String,
    /// Decoded HTML of the authenticated page
    pub html: String,
    /// Transport session used for the fetch, reusable for follow-up requests
    pub session: Arc<dyn HttpSession>,
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for BoundPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundPage")
            .field("site_name", &self.site_name)
            .field("url", &self.url)
            .field("html_len", &self.html.len())
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

/// A parser instance handed back to the caller.
///
/// What it extracts from the page is up to the implementation; the dispatcher
/// only needs to know which page it was bound to.
pub trait SiteUserInfo: Send + Sync {
    /// Schema this parser was registered under
    fn schema(&self) -> SiteSchema;

    /// The page this parser was constructed with
    fn page(&self) -> &BoundPage;

    fn site_name(&self) -> &str {
        &self.page().site_name
    }

    fn html(&self) -> &str {
        &self.page().html
    }
}

/// A parser type that can be registered for a schema
pub trait SiteParser: SiteUserInfo + Sized + 'static {
    const SCHEMA: SiteSchema;

    fn from_page(page: BoundPage) -> Self;
}

/// Parser that only holds its bound page.
///
/// Useful as a placeholder registration when no markup rules are needed,
/// e.g. for diagnostics.
#[derive(Debug)]
pub struct PageSnapshot {
    schema: SiteSchema,
    page: BoundPage,
}

impl PageSnapshot {
    pub fn new(schema: SiteSchema, page: BoundPage) -> Self {
        Self { schema, page }
    }
}

impl SiteUserInfo for PageSnapshot {
    fn schema(&self) -> SiteSchema {
        self.schema
    }

    fn page(&self) -> &BoundPage {
        &self.page
    }
}

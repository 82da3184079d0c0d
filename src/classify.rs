//! HTML -> schema classification

use crate::schema::SiteSchema;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

/// Decides which markup family a page belongs to
pub trait SchemaClassifier: Send + Sync {
    fn classify(&self, html: &str) -> Option<SiteSchema>;
}

impl<F> SchemaClassifier for F
where
    F: Fn(&str) -> Option<SiteSchema> + Send + Sync,
{
    fn classify(&self, html: &str) -> Option<SiteSchema> {
        self(html)
    }
}

/// Recognises tracker families by footer credits, generator tags and
/// characteristic asset paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerClassifier;

// Most specific first: NexusPHP forks also carry the NexusPHP credit.
const RULES: &[(SiteSchema, &str)] = &[
    (SiteSchema::DiscuzX, r"(?i)Powered by\s*(<[^>]+>\s*)*Discuz!"),
    (SiteSchema::Gazelle, r#"(?i)<link[^>]+href="[^"]*static/styles/|Powered by\s*(<[^>]+>\s*)*Gazelle"#),
    (SiteSchema::Unit3d, r"(?i)unit3d\.js|Powered by\s*(<[^>]+>\s*)*UNIT3D"),
    (SiteSchema::TNode, r"(?i)Powered by\s*(<[^>]+>\s*)*TNode"),
    (SiteSchema::Ipt, r"(?i)IPTorrents"),
    (SiteSchema::FileList, r"(?i)Filelist\.io|<title>\s*FileList"),
    (SiteSchema::TorrentLeech, r"(?i)TorrentLeech"),
    (SiteSchema::SmallHorse, r"(?i)Small Horse"),
    (SiteSchema::MTorrent, r#"(?i)m-team\.(cc|io)|id="mt-"#),
    (SiteSchema::NexusHhanclub, r"(?i)hhanclub"),
    (SiteSchema::NexusAudiences, r"(?i)audiences\.me"),
    (SiteSchema::NexusRabbit, r"(?i)Style by Rabbit"),
    (SiteSchema::NexusProject, r"(?i)Nexus Project"),
    (SiteSchema::NexusPhp, r"(?i)NexusPHP|Powered by\s*(<[^>]+>\s*)*Nexus"),
];

fn compiled_rules() -> &'static [(SiteSchema, Regex)] {
    static COMPILED: OnceLock<Vec<(SiteSchema, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|(schema, pattern)| Regex::new(pattern).ok().map(|re| (*schema, re)))
            .collect()
    })
}

impl MarkerClassifier {
    fn from_generator(html: &str) -> Option<SiteSchema> {
        let doc = Html::parse_document(html);
        let selector = Selector::parse("meta[name='generator']").ok()?;
        let generator = doc
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .next()?
            .to_lowercase();
        if generator.contains("discuz") {
            Some(SiteSchema::DiscuzX)
        } else if generator.contains("nexusphp") {
            Some(SiteSchema::NexusPhp)
        } else {
            None
        }
    }
}

impl SchemaClassifier for MarkerClassifier {
    fn classify(&self, html: &str) -> Option<SiteSchema> {
        compiled_rules()
            .iter()
            .find(|(_, re)| re.is_match(html))
            .map(|(schema, _)| *schema)
            .or_else(|| Self::from_generator(html))
    }
}

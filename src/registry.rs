//! Schema -> parser dispatch table
//!
//! Built once from an explicit list of parser types, immutable afterwards.

use crate::error::RegistryError;
use crate::schema::{BoundPage, PageSnapshot, SiteParser, SiteSchema, SiteUserInfo};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Constructor = Arc<dyn Fn(BoundPage) -> Box<dyn SiteUserInfo> + Send + Sync>;

/// A registered parser type
#[derive(Clone)]
pub struct ParserEntry {
    schema: SiteSchema,
    name: &'static str,
    construct: Constructor,
}

impl ParserEntry {
    fn of<P: SiteParser>() -> Self {
        Self {
            schema: P::SCHEMA,
            name: std::any::type_name::<P>(),
            construct: Arc::new(|page: BoundPage| {
                Box::new(P::from_page(page)) as Box<dyn SiteUserInfo>
            }),
        }
    }

    pub fn schema(&self) -> SiteSchema {
        self.schema
    }

    /// Type name of the parser, for logs and diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Construct a parser instance bound to `page`
    pub fn construct(&self, page: BoundPage) -> Box<dyn SiteUserInfo> {
        (self.construct)(page)
    }
}

impl fmt::Debug for ParserEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserEntry")
            .field("schema", &self.schema)
            .field("name", &self.name)
            .finish()
    }
}

/// Collects parser registrations before the registry is frozen
#[derive(Default)]
pub struct RegistryBuilder {
    map: HashMap<SiteSchema, ParserEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parser type under its own schema.
    ///
    /// A later registration for the same schema replaces the earlier one.
    pub fn register<P: SiteParser>(mut self) -> Self {
        self.insert(ParserEntry::of::<P>());
        self
    }

    /// Register a constructor closure under an explicit schema
    pub fn register_with<F>(mut self, schema: SiteSchema, name: &'static str, construct: F) -> Self
    where
        F: Fn(BoundPage) -> Box<dyn SiteUserInfo> + Send + Sync + 'static,
    {
        self.insert(ParserEntry {
            schema,
            name,
            construct: Arc::new(construct),
        });
        self
    }

    /// Register [`PageSnapshot`] for every known schema
    pub fn register_snapshots(mut self) -> Self {
        for schema in SiteSchema::ALL {
            self = self.register_with(schema, "PageSnapshot", move |page| {
                Box::new(PageSnapshot::new(schema, page)) as Box<dyn SiteUserInfo>
            });
        }
        self
    }

    fn insert(&mut self, entry: ParserEntry) {
        if let Some(prev) = self.map.insert(entry.schema, entry.clone()) {
            tracing::debug!(
                schema = %entry.schema,
                replaced = prev.name,
                by = entry.name,
                "parser registration replaced"
            );
        }
    }

    /// Freeze the registry. Fails if nothing handles the default schema.
    pub fn build(self) -> Result<SchemaRegistry, RegistryError> {
        if !self.map.contains_key(&SiteSchema::DEFAULT) {
            return Err(RegistryError::Empty(SiteSchema::DEFAULT));
        }
        Ok(SchemaRegistry { map: self.map })
    }
}

/// Immutable schema -> parser table
#[derive(Debug)]
pub struct SchemaRegistry {
    map: HashMap<SiteSchema, ParserEntry>,
}

impl SchemaRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Exact lookup, no fallback
    pub fn get(&self, schema: SiteSchema) -> Option<&ParserEntry> {
        self.map.get(&schema)
    }

    /// Look up the parser for `schema`, falling back to the default schema
    /// when the tag is absent or unregistered.
    pub fn resolve(&self, schema: Option<SiteSchema>) -> &ParserEntry {
        if let Some(entry) = schema.and_then(|s| self.map.get(&s)) {
            return entry;
        }
        tracing::warn!(
            classified = ?schema.map(|s| s.as_str()),
            fallback = %SiteSchema::DEFAULT,
            "no parser for classified schema, using default"
        );
        // build() guarantees the default entry
        &self.map[&SiteSchema::DEFAULT]
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// List all registered schemas
    pub fn schemas(&self) -> Vec<SiteSchema> {
        self.map.keys().copied().collect()
    }
}

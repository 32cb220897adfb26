//! Syntax registry
//!
//! Entries are kept per category, ordered by priority (highest first) and
//! then by registration order. That order is what the parser tries them in
//! and how it breaks ties.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use sk_patterns::{CompiledPattern, PatternCache};
use tracing::{debug, instrument, warn};

use crate::category::Category;
use crate::error::{SyntaxError, SyntaxResult};
use crate::function::FunctionRegistry;
use crate::node::Node;
use crate::parser::{ParseContext, ParseResult};
use crate::types::TypeRegistry;

/// Builds a node from a successful match, or refuses it with a message
pub type Factory = Arc<dyn Fn(ParseResult, &ParseContext) -> Result<Node, String> + Send + Sync>;

/// A registered pattern and the factory that turns its matches into nodes
pub struct SyntaxEntry {
    /// Registration sequence number, unique per registry
    pub id: usize,
    pub category: Category,
    pub pattern: Arc<CompiledPattern>,
    pub priority: i32,
    factory: Factory,
}

impl SyntaxEntry {
    pub fn build(&self, result: ParseResult, ctx: &ParseContext) -> Result<Node, String> {
        (self.factory)(result, ctx)
    }
}

impl fmt::Debug for SyntaxEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxEntry")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("pattern", &self.pattern.source())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Vocabulary known to the parser
#[derive(Debug)]
pub struct SyntaxRegistry {
    entries: DashMap<Category, Vec<Arc<SyntaxEntry>>>,
    patterns: PatternCache,
    types: Arc<TypeRegistry>,
    functions: Arc<FunctionRegistry>,
    next_id: AtomicUsize,
}

impl SyntaxRegistry {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            entries: DashMap::new(),
            patterns: PatternCache::new(),
            types,
            functions: Arc::new(FunctionRegistry::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Functions declared by loaded scripts
    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    /// Register a pattern for a category
    ///
    /// Fails when the pattern does not compile or names an unknown type.
    /// Duplicate patterns are allowed; the parser picks between them.
    #[instrument(skip(self, factory))]
    pub fn register<F, N>(
        &self,
        category: Category,
        pattern: &str,
        priority: i32,
        factory: F,
    ) -> SyntaxResult<Arc<SyntaxEntry>>
    where
        F: Fn(ParseResult, &ParseContext) -> Result<N, String> + Send + Sync + 'static,
        N: Into<Node>,
    {
        let compiled = self.patterns.get_or_compile(pattern)?;
        for placeholder in compiled.placeholders() {
            for type_name in placeholder.type_names() {
                if self.types.lookup(type_name).is_none() {
                    return Err(SyntaxError::UnknownType {
                        pattern: pattern.to_string(),
                        type_name: type_name.to_string(),
                    });
                }
            }
        }

        let factory: Factory =
            Arc::new(move |result: ParseResult, ctx: &ParseContext| -> Result<Node, String> {
                factory(result, ctx).map(Into::into)
            });
        let entry = Arc::new(SyntaxEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            category,
            pattern: compiled,
            priority,
            factory,
        });

        let mut entries = self.entries.entry(category).or_default();
        let position = entries.partition_point(|e| e.priority >= priority);
        entries.insert(position, Arc::clone(&entry));
        debug!(id = entry.id, position, "Registered syntax");
        Ok(entry)
    }

    /// Entries of a category in match order
    pub fn lookup(&self, category: Category) -> Vec<Arc<SyntaxEntry>> {
        self.entries
            .get(&category)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self, category: Category) -> usize {
        self.entries.get(&category).map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|entries| entries.is_empty())
    }

    /// Renderings produced by more than one entry of a category
    ///
    /// Each conflict lists the patterns that share the rendering, in match
    /// order.
    pub fn conflicts(&self, category: Category) -> IndexMap<String, Vec<String>> {
        let mut renderings: IndexMap<String, Vec<String>> = IndexMap::new();
        for entry in self.lookup(category) {
            for rendering in entry.pattern.combinations() {
                renderings
                    .entry(rendering.to_lowercase())
                    .or_default()
                    .push(entry.pattern.source().to_string());
            }
        }
        renderings.retain(|_, sources| sources.len() > 1);
        for (rendering, sources) in &renderings {
            warn!(%category, rendering, ?sources, "Conflicting syntax");
        }
        renderings
    }
}

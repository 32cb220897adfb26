//! Compiled pattern cache

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::compiler::{compile, CompiledPattern};
use crate::error::PatternResult;

/// Compiled patterns keyed by source text
///
/// Identical sources compile to equivalent patterns, so entries are shared.
#[derive(Debug, Default)]
pub struct PatternCache {
    patterns: DashMap<String, Arc<CompiledPattern>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&self, source: &str) -> PatternResult<Arc<CompiledPattern>> {
        if let Some(pattern) = self.patterns.get(source) {
            return Ok(Arc::clone(pattern.value()));
        }
        let compiled = Arc::new(compile(source)?);
        trace!(pattern = source, "Caching compiled pattern");
        let entry = self
            .patterns
            .entry(source.to_string())
            .or_insert(compiled);
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&self) {
        self.patterns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_shares_compiled_patterns() {
        let cache = PatternCache::new();
        let a = cache.get_or_compile("set %objects% to %objects%").unwrap();
        let b = cache.get_or_compile("set %objects% to %objects%").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_does_not_store_errors() {
        let cache = PatternCache::new();
        assert!(cache.get_or_compile("set [%objects%").is_err());
        assert!(cache.is_empty());
    }
}

//! Holder of the one *current* compiled mapping rules value.
//!
//! Single writer (the reload controller), many readers (record workers).
//! Readers take a snapshot once per record and use it throughout, so a swap
//! mid-record can never mix two documents.

use crate::engine::error::Result;
use crate::engine::validation::CompiledRules;
use std::sync::{Arc, RwLock};

pub struct MappingStore {
    current: RwLock<Arc<CompiledRules>>,
}

impl MappingStore {
    pub fn new(initial: CompiledRules) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Build a store directly from mapping document text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self::new(CompiledRules::parse(text)?))
    }

    /// The current rules. Call once per record and keep the Arc.
    pub fn snapshot(&self) -> Arc<CompiledRules> {
        Arc::clone(&self.current.read().unwrap())
    }

    /// Parse, validate and atomically swap in a new document. On any failure
    /// the current rules are unchanged.
    pub fn try_adopt(&self, text: &str) -> Result<()> {
        let compiled = Arc::new(CompiledRules::parse(text)?);
        *self.current.write().unwrap() = compiled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INITIAL: &str =
        r#"{"topics": {"a": {"root": "ra", "output": {"id": {"paths": ["$.id"]}}}}}"#;
    const UPDATED: &str =
        r#"{"topics": {"b": {"root": "rb", "output": {"id": {"paths": ["$.id"]}}}}}"#;

    #[test]
    fn test_adopt_swaps_current() {
        let store = MappingStore::from_json(INITIAL).unwrap();
        assert!(store.snapshot().lookup("", "a").is_some());

        store.try_adopt(UPDATED).unwrap();
        let rules = store.snapshot();
        assert!(rules.lookup("", "a").is_none());
        assert!(rules.lookup("", "b").is_some());
    }

    #[test]
    fn test_failed_adopt_keeps_current() {
        let store = MappingStore::from_json(INITIAL).unwrap();
        let before = store.snapshot();

        assert!(store.try_adopt("{not json").is_err());
        assert!(store.try_adopt(r#"{"version": 3}"#).is_err());
        assert!(store
            .try_adopt(r#"{"topics": {"x": {"root": "r", "output": {"f": {"paths": ["$.a[0]"]}}}}}"#)
            .is_err());

        // still the exact same rules value, not a re-parse
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn test_snapshot_survives_swap() {
        let store = MappingStore::from_json(INITIAL).unwrap();
        let held = store.snapshot();
        store.try_adopt(UPDATED).unwrap();
        // a reader holding the old snapshot keeps a consistent view
        assert!(held.lookup("", "a").is_some());
        assert!(store.snapshot().lookup("", "b").is_some());
    }
}

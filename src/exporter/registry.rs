//! Scrape path to definition set bindings.

use crate::collector::{DefinitionSet, PassReport};
use crate::metrics::RegistrationError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Independent definition sets, each exposed at its own scrape path.
///
/// Sets share nothing: a failing source only affects its own path.
#[derive(Debug, Default, Clone)]
pub struct SourceRegistry {
    sets: BTreeMap<String, Arc<DefinitionSet>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `set` at `path`; a path can be bound only once.
    pub fn bind(&mut self, path: impl Into<String>, set: DefinitionSet) -> Result<(), RegistrationError> {
        let path = path.into();
        if self.sets.contains_key(&path) {
            return Err(RegistrationError::DuplicatePath(path));
        }
        tracing::info!(path = %path, set = %set.name(), metrics = set.len(), "Bound scrape path");
        self.sets.insert(path, Arc::new(set));
        Ok(())
    }

    /// Set bound at `path`, if any.
    pub fn get(&self, path: &str) -> Option<&Arc<DefinitionSet>> {
        self.sets.get(path)
    }

    /// Bound paths in lexical order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Runs one pass on the set bound at `path`.
    pub async fn scrape(&self, path: &str) -> Option<PassReport> {
        let set = self.get(path)?;
        Some(set.scrape().await)
    }
}

pub mod dispatch;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::ModelsConfig;

/// A model the client asked for, resolved against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedModel<'a> {
    /// Name echoed back to the client.
    pub visible: &'a str,
    /// Name sent to the search service.
    pub upstream: &'a str,
}

/// Client-visible model names and the upstream model each one maps to.
///
/// Entries are `alias:upstream_model` or a bare name used for both.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    index: FxHashMap<Arc<str>, usize>,
    entries: Vec<(Arc<str>, Arc<str>)>,
    default_index: usize,
}

fn split_entry(entry: &str) -> (&str, &str) {
    match entry.split_once(':') {
        Some((alias, real_model)) => (alias.trim(), real_model.trim()),
        None => (entry.trim(), entry.trim()),
    }
}

impl ModelCatalog {
    /// Build the catalog. An unlisted default is added as a bare entry so
    /// normalisation always has a target.
    #[must_use]
    pub fn new(config: &ModelsConfig) -> Self {
        let mut index: FxHashMap<Arc<str>, usize> = FxHashMap::default();
        let mut entries: Vec<(Arc<str>, Arc<str>)> = Vec::with_capacity(config.available.len());

        for entry in &config.available {
            let (alias, real_model) = split_entry(entry);
            if alias.is_empty() || real_model.is_empty() || index.contains_key(alias) {
                continue;
            }
            let alias: Arc<str> = Arc::from(alias);
            index.insert(Arc::clone(&alias), entries.len());
            entries.push((alias, Arc::from(real_model)));
        }

        let default_index = if let Some(&idx) = index.get(config.default.as_str()) {
            idx
        } else {
            let name: Arc<str> = Arc::from(config.default.as_str());
            index.insert(Arc::clone(&name), entries.len());
            entries.push((Arc::clone(&name), name));
            entries.len() - 1
        };

        Self {
            index,
            entries,
            default_index,
        }
    }

    /// Map a requested model to a catalog entry. Missing or unknown names
    /// fall back to the default entry.
    #[must_use]
    pub fn normalize(&self, requested: Option<&str>) -> ResolvedModel<'_> {
        let idx = requested
            .map(str::trim)
            .and_then(|name| self.index.get(name).copied())
            .unwrap_or(self.default_index);
        let (visible, upstream) = &self.entries[idx];
        ResolvedModel {
            visible: visible.as_ref(),
            upstream: upstream.as_ref(),
        }
    }

    /// Visible model names in configuration order.
    pub fn visible_models(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(visible, _)| visible.as_ref())
    }
}

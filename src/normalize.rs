//! Location normalisation — alias folding and exclusion of vague tokens.

use crate::registry::GeoRegistry;

/// Maps raw place tokens to canonical names.
#[derive(Debug, Clone, Copy)]
pub struct LocationNormalizer<'a> {
    registry: &'a GeoRegistry,
}

impl<'a> LocationNormalizer<'a> {
    pub fn new(registry: &'a GeoRegistry) -> Self {
        Self { registry }
    }

    /// Canonical name for `raw`, or `None` when the token is excluded.
    ///
    /// Tokens without an alias pass through unchanged; callers only hand in
    /// tokens they already believe to be geographic.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        if self.registry.is_excluded(raw) {
            return None;
        }
        match self.registry.alias(raw) {
            Some(target) => Some(target.to_string()),
            None => Some(raw.to_string()),
        }
    }

    /// Scan `text` for every recognised keyword and return the distinct
    /// canonical names in keyword-table order.
    pub fn scan(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for keyword in keyword_hits(self.registry, text) {
            if let Some(name) = self.normalize(keyword) {
                if !found.contains(&name) {
                    found.push(name);
                }
            }
        }
        found
    }
}

/// Recognised keywords present in `text`, in keyword-table order.
///
/// Plain substring test: 印度尼西亚 also yields 印度.
pub fn keyword_hits<'r>(registry: &'r GeoRegistry, text: &str) -> Vec<&'r str> {
    registry
        .keywords()
        .iter()
        .filter(|kw| text.contains(kw.as_str()))
        .map(String::as_str)
        .collect()
}

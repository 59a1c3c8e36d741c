//! Hierarchy resolution and redundancy filtering for one risk item.
//!
//! Merges the document's dynamic links with the manual region links and the
//! static region → country table, then drops locations already covered by a
//! related location in the same set.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::registry::GeoRegistry;
use crate::relations::RelationMap;

/// Where a merged link came from. Earlier variants take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    Dynamic,
    Manual,
    Static,
}

/// Merged child → parent map used by one filter call. Acyclic.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct EffectiveHierarchy {
    links: BTreeMap<String, (String, LinkSource)>,
}

impl EffectiveHierarchy {
    /// Dynamic links first, then manual, then static. A lower-priority link
    /// is skipped when its child is taken or when it would close a cycle.
    pub fn build(registry: &GeoRegistry, dynamic: &RelationMap) -> Self {
        let mut merged = Self::default();
        for (child, parent) in dynamic.iter() {
            merged.link(child, parent, LinkSource::Dynamic);
        }
        for (child, parent) in registry.region_links() {
            merged.link(child, parent, LinkSource::Manual);
        }
        for (child, parent) in registry.hierarchy() {
            merged.link(child, parent, LinkSource::Static);
        }
        merged
    }

    fn link(&mut self, child: &str, parent: &str, source: LinkSource) -> bool {
        if child == parent || self.links.contains_key(child) || self.reaches(parent, child) {
            return false;
        }
        self.links
            .insert(child.to_string(), (parent.to_string(), source));
        true
    }

    pub fn parent_of(&self, child: &str) -> Option<(&str, LinkSource)> {
        self.links
            .get(child)
            .map(|(parent, source)| (parent.as_str(), *source))
    }

    pub fn reaches(&self, from: &str, to: &str) -> bool {
        let mut current = from;
        for _ in 0..=self.links.len() {
            if current == to {
                return true;
            }
            match self.links.get(current) {
                Some((next, _)) => current = next,
                None => return false,
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

pub struct HierarchyResolver<'a> {
    registry: &'a GeoRegistry,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(registry: &'a GeoRegistry) -> Self {
        Self { registry }
    }

    /// Drop redundant locations, keeping input order and the first copy of
    /// each name.
    ///
    /// - a region linked to a parent region (manual or dynamic) is dropped
    ///   when that parent is in the set;
    /// - a region from the static country table is kept;
    /// - a country is dropped when one of its static regions is in the set.
    ///
    /// Only direct links are consulted. If everything would be dropped the
    /// input comes back unfiltered.
    pub fn filter(&self, locations: &[String], dynamic: &RelationMap) -> Vec<String> {
        if locations.is_empty() {
            return Vec::new();
        }

        let hierarchy = EffectiveHierarchy::build(self.registry, dynamic);
        let present: HashSet<&str> = locations.iter().map(String::as_str).collect();

        let mut kept: Vec<String> = Vec::new();
        for loc in locations {
            if kept.contains(loc) {
                continue;
            }
            let keep = match hierarchy.parent_of(loc) {
                Some((parent, LinkSource::Dynamic | LinkSource::Manual)) => !present.contains(parent),
                Some((_, LinkSource::Static)) => true,
                None => !self
                    .registry
                    .regions_of(loc)
                    .iter()
                    .any(|region| present.contains(region.as_str())),
            };
            if keep {
                kept.push(loc.clone());
            } else {
                tracing::debug!(location = %loc, "redundant location dropped");
            }
        }

        if kept.is_empty() {
            tracing::warn!(?locations, "every location was redundant, keeping input");
            return locations.to_vec();
        }
        kept
    }
}

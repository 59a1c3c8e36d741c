//! Relationship extraction — child → parent links discovered in one report.
//!
//! Two sources feed one map: an ordered list of textual containment patterns
//! ("X位于Y省", "Y省的X", ...) and a coordinate-proximity fallback for
//! co-mentioned places. The first link recorded for a child wins.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::normalize::LocationNormalizer;
use crate::registry::GeoRegistry;

// ── Relation map ────────────────────────────────────────────────────

/// Per-document child → parent map. Never holds a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RelationMap {
    parents: BTreeMap<String, String>,
}

impl RelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `child → parent` unless the child already has a parent or the
    /// link would close a cycle (which covers the plain reverse link).
    /// Returns whether the link was recorded.
    pub fn insert_if_absent(&mut self, child: &str, parent: &str) -> bool {
        if child == parent || self.parents.contains_key(child) {
            return false;
        }
        if self.reaches(parent, child) {
            tracing::trace!(child, parent, "relation would close a cycle, skipped");
            return false;
        }
        self.parents.insert(child.to_string(), parent.to_string());
        true
    }

    pub fn parent_of(&self, child: &str) -> Option<&str> {
        self.parents.get(child).map(String::as_str)
    }

    /// Whether `name` takes part in any link, as child or parent.
    pub fn is_involved(&self, name: &str) -> bool {
        self.parents.contains_key(name) || self.parents.values().any(|p| p == name)
    }

    /// True when one of the two is the other's recorded parent. Renderers use
    /// this to collapse two markers into one region.
    pub fn same_region(&self, a: &str, b: &str) -> bool {
        self.parent_of(a) == Some(b) || self.parent_of(b) == Some(a)
    }

    /// Whether following parents from `from` arrives at `to`.
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        let mut current = from;
        // Bounded by map size; the map is acyclic so the walk ends anyway.
        for _ in 0..=self.parents.len() {
            if current == to {
                return true;
            }
            match self.parents.get(current) {
                Some(next) => current = next,
                None => return false,
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parents.iter().map(|(c, p)| (c.as_str(), p.as_str()))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.parents
    }
}

// ── Textual patterns ────────────────────────────────────────────────

/// One containment phrasing. Captures are (child, parent) unless `reversed`.
pub struct RelationPattern {
    pub name: &'static str,
    regex: Regex,
    reversed: bool,
}

impl RelationPattern {
    fn new(name: &'static str, pattern: &str, reversed: bool) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).unwrap(),
            reversed,
        }
    }

    /// Raw (child, parent) spans for every non-overlapping match in `text`.
    pub fn candidates<'t>(&'t self, text: &'t str) -> impl Iterator<Item = (&'t str, &'t str)> + 't {
        self.regex.captures_iter(text).filter_map(move |cap| {
            let first = cap.get(1)?.as_str().trim();
            let second = cap.get(2)?.as_str().trim();
            if self.reversed {
                Some((second, first))
            } else {
                Some((first, second))
            }
        })
    }
}

// Applied in this order; an earlier pattern's link for a child is final.
static RELATION_PATTERNS: Lazy<Vec<RelationPattern>> = Lazy::new(|| {
    vec![
        // "塞梅鲁火山位于东爪哇省"
        RelationPattern::new(
            "located_in_admin",
            r"(?i)([^\s，,。；;、]+?)(?:火山|山|地区|市|省|县|区|镇|村)?(?:位于|属于|在|处于|地处|坐落于)([^\s，,。；;、]+?)(?:省|市|县|区|地区|州)",
            false,
        ),
        // "塞梅鲁位于东爪哇"
        RelationPattern::new(
            "located_in",
            r"(?i)([^\s，,。；;、]+?)(?:位于|属于|在|处于|地处|坐落于)([^\s，,。；;、]+)",
            false,
        ),
        // "塞梅鲁的东爪哇省"
        RelationPattern::new(
            "possessive",
            r"(?i)([^\s，,。；;、]+?)(?:的|地)([^\s，,。；;、]+?)(?:省|市|县|区|地区|州)",
            false,
        ),
        // "东爪哇省的塞梅鲁火山"
        RelationPattern::new(
            "admin_possessive",
            r"(?i)([^\s，,。；;、]+?)(?:省|市|县|区|地区|州)(?:的|地)([^\s，,。；;、]+)",
            true,
        ),
    ]
});

pub fn relation_patterns() -> &'static [RelationPattern] {
    &RELATION_PATTERNS
}

// ── Extractor ───────────────────────────────────────────────────────

pub struct RelationshipExtractor<'a> {
    registry: &'a GeoRegistry,
    normalizer: LocationNormalizer<'a>,
}

impl<'a> RelationshipExtractor<'a> {
    pub fn new(registry: &'a GeoRegistry) -> Self {
        Self {
            registry,
            normalizer: LocationNormalizer::new(registry),
        }
    }

    /// Build the child → parent map for one document.
    pub fn extract(&self, document: &str) -> RelationMap {
        let mut relations = RelationMap::new();
        for pattern in relation_patterns() {
            self.apply_pattern(pattern, document, &mut relations);
        }
        self.infer_by_proximity(document, &mut relations);
        tracing::debug!(relations = relations.len(), "location relations extracted");
        relations
    }

    /// Record every usable match of one pattern.
    pub fn apply_pattern(&self, pattern: &RelationPattern, text: &str, relations: &mut RelationMap) {
        for (raw_child, raw_parent) in pattern.candidates(text) {
            let Some((child, parent)) = self.resolve_pair(raw_child, raw_parent) else {
                continue;
            };
            if relations.insert_if_absent(&child, &parent) {
                tracing::debug!(pattern = pattern.name, %child, %parent, "relation recorded");
            }
        }
    }

    fn resolve_pair(&self, raw_child: &str, raw_parent: &str) -> Option<(String, String)> {
        let child = self.normalize_span(raw_child)?;
        let parent = self.normalize_span(raw_parent)?;
        if child == parent {
            return None;
        }
        Some((child, parent))
    }

    fn normalize_span(&self, span: &str) -> Option<String> {
        let stripped = self.strip_suffix(span);
        if stripped.is_empty() {
            return None;
        }
        let name = self.normalizer.normalize(stripped)?;
        if name == self.registry.unspecified() {
            return None;
        }
        Some(name)
    }

    /// Drop one trailing administrative or landform suffix, longest first.
    pub fn strip_suffix<'s>(&self, span: &'s str) -> &'s str {
        let longest = self
            .registry
            .strip_suffixes()
            .iter()
            .filter(|suffix| span.ends_with(suffix.as_str()))
            .max_by_key(|suffix| suffix.len());
        match longest {
            Some(suffix) => span[..span.len() - suffix.len()].trim(),
            None => span.trim(),
        }
    }

    /// Pair up co-mentioned places closer than the proximity threshold.
    ///
    /// Heuristic: unrelated neighbouring places can be paired too.
    pub fn infer_by_proximity(&self, document: &str, relations: &mut RelationMap) {
        let mentioned = self.normalizer.scan(document);

        for (i, a) in mentioned.iter().enumerate() {
            for b in &mentioned[i + 1..] {
                if relations.is_involved(a) || relations.is_involved(b) {
                    continue;
                }
                let (Some(ca), Some(cb)) = (self.registry.coordinates(a), self.registry.coordinates(b)) else {
                    continue;
                };
                let distance = ca.distance_km(&cb);
                if !self.within_proximity(distance) {
                    continue;
                }

                let a_specific = self.is_more_specific(a, b);
                let b_specific = self.is_more_specific(b, a);
                let (child, parent) = match (a_specific, b_specific) {
                    (true, false) => (a, b),
                    (false, true) => (b, a),
                    _ => {
                        tracing::trace!(%a, %b, distance, "proximity pair ambiguous, skipped");
                        continue;
                    }
                };
                if relations.insert_if_absent(child, parent) {
                    tracing::debug!(%child, %parent, distance, "relation inferred from proximity");
                }
            }
        }
    }

    /// Strictly below the configured threshold.
    pub fn within_proximity(&self, distance_km: f64) -> bool {
        distance_km < self.registry.proximity_threshold_km()
    }

    /// `name` reads as more specific than `other`: a longer name, or one
    /// containing an administrative-level marker anywhere (广州港 counts).
    pub fn is_more_specific(&self, name: &str, other: &str) -> bool {
        name.chars().count() > other.chars().count()
            || self
                .registry
                .admin_suffixes()
                .iter()
                .any(|suffix| name.contains(suffix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::GeoTableConfig;

    fn builtin() -> RelationshipExtractor<'static> {
        RelationshipExtractor::new(GeoRegistry::builtin())
    }

    fn pattern(name: &str) -> &'static RelationPattern {
        relation_patterns().iter().find(|p| p.name == name).unwrap()
    }

    fn pairs(name: &str, text: &str) -> Vec<(String, String)> {
        pattern(name)
            .candidates(text)
            .map(|(c, p)| (c.to_string(), p.to_string()))
            .collect()
    }

    /// Kilometres per degree of latitude along a meridian.
    fn km_per_degree() -> f64 {
        crate::registry::EARTH_RADIUS_KM * std::f64::consts::PI / 180.0
    }

    fn proximity_registry(places: &[(&str, f64, f64)]) -> GeoRegistry {
        let config = GeoTableConfig {
            version: 1,
            unspecified: "unspecified".into(),
            proximity_threshold_km: 100.0,
            default_marker: [0.0, 0.0],
            keywords: places.iter().map(|(n, _, _)| n.to_string()).collect(),
            excluded: vec![],
            strip_suffixes: vec!["市".into(), "县".into()],
            admin_suffixes: vec!["省".into(), "市".into(), "县".into(), "区".into(), "州".into()],
            aliases: Default::default(),
            coordinates: places
                .iter()
                .map(|(n, lat, lon)| (n.to_string(), [*lat, *lon]))
                .collect(),
            hierarchy: Default::default(),
            region_links: Default::default(),
        };
        GeoRegistry::from_config(config).unwrap()
    }

    #[test]
    fn test_insert_if_absent_first_writer_wins() {
        let mut map = RelationMap::new();
        assert!(map.insert_if_absent("福岛", "日本"));
        assert!(!map.insert_if_absent("福岛", "东北"));
        assert_eq!(map.parent_of("福岛"), Some("日本"));
    }

    #[test]
    fn test_insert_rejects_reverse_and_longer_cycles() {
        let mut map = RelationMap::new();
        assert!(map.insert_if_absent("a", "b"));
        assert!(!map.insert_if_absent("b", "a"));
        assert!(map.insert_if_absent("b", "c"));
        assert!(!map.insert_if_absent("c", "a"));
        assert!(!map.insert_if_absent("x", "x"));
        assert_eq!(map.len(), 2);
        assert!(map.reaches("a", "c"));
    }

    #[test]
    fn test_same_region_and_involvement() {
        let mut map = RelationMap::new();
        map.insert_if_absent("塞梅鲁", "东爪哇");
        assert!(map.same_region("东爪哇", "塞梅鲁"));
        assert!(!map.same_region("东爪哇", "日本"));
        assert!(map.is_involved("东爪哇"));
        assert!(!map.is_involved("日本"));
    }

    #[test]
    fn test_pattern_located_in_admin() {
        assert_eq!(
            pairs("located_in_admin", "塞梅鲁火山位于东爪哇省，近期喷发。"),
            vec![("塞梅鲁".to_string(), "东爪哇".to_string())]
        );
    }

    #[test]
    fn test_pattern_located_in_takes_whole_parent_span() {
        assert_eq!(
            pairs("located_in", "塞梅鲁位于东爪哇。"),
            vec![("塞梅鲁".to_string(), "东爪哇".to_string())]
        );
    }

    #[test]
    fn test_pattern_possessive() {
        assert_eq!(
            pairs("possessive", "塞梅鲁的东爪哇省"),
            vec![("塞梅鲁".to_string(), "东爪哇".to_string())]
        );
    }

    #[test]
    fn test_pattern_admin_possessive_is_reversed() {
        assert_eq!(
            pairs("admin_possessive", "东爪哇省的塞梅鲁火山"),
            vec![("塞梅鲁火山".to_string(), "东爪哇".to_string())]
        );
    }

    #[test]
    fn test_strip_suffix_prefers_longest() {
        let ex = builtin();
        assert_eq!(ex.strip_suffix("塞梅鲁火山"), "塞梅鲁");
        assert_eq!(ex.strip_suffix("东爪哇地区"), "东爪哇");
        assert_eq!(ex.strip_suffix("东莞"), "东莞");
    }

    #[test]
    fn test_extract_from_sentence() {
        let map = builtin().extract("塞梅鲁火山位于东爪哇省，火山灰影响航班。");
        assert_eq!(map.parent_of("塞梅鲁"), Some("东爪哇"));
    }

    #[test]
    fn test_earlier_pattern_wins_over_earlier_text() {
        // The possessive phrase comes first in the text but the located-in
        // pattern runs first.
        let map = builtin().extract("福岛的东北地区。福岛位于日本。");
        assert_eq!(map.parent_of("福岛"), Some("日本"));
    }

    #[test]
    fn test_reverse_relation_discarded() {
        let map = builtin().extract("东爪哇属于印度尼西亚。印度尼西亚在东爪哇。");
        assert_eq!(map.parent_of("东爪哇"), Some("印度尼西亚"));
        assert_eq!(map.parent_of("印度尼西亚"), None);
    }

    #[test]
    fn test_excluded_spans_discarded() {
        let map = builtin().extract("安世位于东莞市");
        assert_eq!(map.parent_of("安世"), None);
        assert!(!map.is_involved("东莞"));
    }

    #[test]
    fn test_proximity_strict_threshold() {
        let ex = builtin();
        assert!(!ex.within_proximity(100.0));
        assert!(ex.within_proximity(99.9));
    }

    #[test]
    fn test_proximity_merges_specific_child_under_general_parent() {
        let reg = proximity_registry(&[("甲", 30.0, 120.0), ("甲市", 30.3, 120.0)]);
        let map = RelationshipExtractor::new(&reg).extract("甲市与甲");
        assert_eq!(map.parent_of("甲市"), Some("甲"));
    }

    #[test]
    fn test_proximity_boundary_on_meridian() {
        let near = 99.9 / km_per_degree();
        let far = 100.1 / km_per_degree();

        let reg = proximity_registry(&[("乙", 10.0, 50.0), ("乙州", 10.0 + near, 50.0)]);
        let map = RelationshipExtractor::new(&reg).extract("乙州与乙");
        assert_eq!(map.parent_of("乙州"), Some("乙"));

        let reg = proximity_registry(&[("乙", 10.0, 50.0), ("乙州", 10.0 + far, 50.0)]);
        let map = RelationshipExtractor::new(&reg).extract("乙州与乙");
        assert!(map.is_empty());
    }

    #[test]
    fn test_proximity_skips_ambiguous_pairs() {
        // Same length, both carry a suffix
        let reg = proximity_registry(&[("丙市", 30.0, 120.0), ("丁县", 30.1, 120.0)]);
        assert!(RelationshipExtractor::new(&reg).extract("丙市与丁县").is_empty());
        // Same length, neither carries a suffix
        let reg = proximity_registry(&[("戊", 30.0, 120.0), ("己", 30.1, 120.0)]);
        assert!(RelationshipExtractor::new(&reg).extract("戊与己").is_empty());
    }

    #[test]
    fn test_proximity_skips_missing_coordinates() {
        let reg = GeoRegistry::from_toml_str(
            r#"
            version = 1
            keywords = ["甲", "甲市"]
            admin_suffixes = ["市"]
            [coordinates]
            "甲" = [30.0, 120.0]
            "#,
        )
        .unwrap();
        let mut map = RelationMap::new();
        RelationshipExtractor::new(&reg).infer_by_proximity("甲市与甲", &mut map);
        assert!(map.is_empty());
    }

    #[test]
    fn test_proximity_skips_places_already_related() {
        let reg = proximity_registry(&[("甲", 30.0, 120.0), ("甲市", 30.3, 120.0), ("庚", 0.0, 0.0)]);
        let ex = RelationshipExtractor::new(&reg);
        let mut map = RelationMap::new();
        map.insert_if_absent("庚", "甲");
        ex.infer_by_proximity("甲市与甲，庚", &mut map);
        assert_eq!(map.parent_of("甲市"), None);
    }

    #[test]
    fn test_admin_marker_counts_anywhere_in_name() {
        let ex = builtin();
        assert!(ex.is_more_specific("广州港", "深圳港"));
        assert!(!ex.is_more_specific("深圳港", "广州港"));
        assert!(ex.is_more_specific("东爪哇", "日本"));
    }

    #[test]
    fn test_builtin_semeru_east_java_same_length_not_merged() {
        // ~99km apart but neither name reads as more specific
        let map = builtin().extract("塞梅鲁与东爪哇");
        assert!(map.is_empty());
    }
}

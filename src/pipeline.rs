//! Location extraction pipeline — keyword scan, summary fallback, relation
//! extraction and redundancy filtering for the risk items of one report.

use once_cell::unsync::OnceCell;

use crate::hierarchy::HierarchyResolver;
use crate::normalize::LocationNormalizer;
use crate::registry::GeoRegistry;
use crate::relations::{RelationMap, RelationshipExtractor};

/// Extracts risk-item locations against one document. The document's
/// relation map is built on first use and shared by every item.
pub struct LocationExtractionPipeline<'a> {
    registry: &'a GeoRegistry,
    document: &'a str,
    summary: Option<&'a str>,
    relations: OnceCell<RelationMap>,
}

impl<'a> LocationExtractionPipeline<'a> {
    pub fn new(registry: &'a GeoRegistry, document: &'a str) -> Self {
        Self {
            registry,
            document,
            summary: None,
            relations: OnceCell::new(),
        }
    }

    /// Fallback excerpt scanned when an item names no location.
    pub fn with_summary(mut self, summary: Option<&'a str>) -> Self {
        self.summary = summary;
        self
    }

    /// Dynamic child → parent relations of the whole document.
    pub fn relations(&self) -> &RelationMap {
        self.relations
            .get_or_init(|| RelationshipExtractor::new(self.registry).extract(self.document))
    }

    /// Unfiltered candidates for one item, falling back to the summary.
    pub fn candidates(&self, item_text: &str) -> Vec<String> {
        let normalizer = LocationNormalizer::new(self.registry);
        let found = normalizer.scan(item_text);
        if !found.is_empty() {
            return found;
        }
        match self.summary {
            Some(summary) => {
                let fallback = normalizer.scan(summary);
                if !fallback.is_empty() {
                    tracing::debug!(found = fallback.len(), "item locations taken from summary");
                }
                fallback
            }
            None => found,
        }
    }

    /// Final location list for one item: never empty, the unspecified
    /// sentinel standing in when nothing was found.
    pub fn extract(&self, item_text: &str) -> Vec<String> {
        let candidates = self.candidates(item_text);
        self.finish(candidates)
    }

    /// Locations for an item described by several excerpts (a description
    /// and a trigger condition, say), merged and filtered together.
    ///
    /// The leading excerpt is always scanned, blank or not, so an item
    /// without a description still gets the summary fallback. Later empty
    /// excerpts are skipped.
    pub fn extract_merged(&self, excerpts: &[&str]) -> Vec<String> {
        let mut merged: Vec<String> = Vec::new();
        for (i, excerpt) in excerpts.iter().enumerate() {
            if i > 0 && excerpt.is_empty() {
                continue;
            }
            for loc in self.extract(excerpt) {
                if loc != self.registry.unspecified() && !merged.contains(&loc) {
                    merged.push(loc);
                }
            }
        }
        self.finish(merged)
    }

    pub fn is_unspecified(&self, locations: &[String]) -> bool {
        matches!(locations, [only] if only == self.registry.unspecified())
    }

    fn finish(&self, candidates: Vec<String>) -> Vec<String> {
        if candidates.is_empty() {
            tracing::debug!("no location recognised, reporting unspecified");
            return vec![self.registry.unspecified().to_string()];
        }
        HierarchyResolver::new(self.registry).filter(&candidates, self.relations())
    }
}

/// One-shot form of [`LocationExtractionPipeline::extract`].
pub fn extract_locations(
    registry: &GeoRegistry,
    item_text: &str,
    document_text: &str,
    summary_text: Option<&str>,
) -> Vec<String> {
    LocationExtractionPipeline::new(registry, document_text)
        .with_summary(summary_text)
        .extract(item_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(item: &str, document: &str, summary: Option<&str>) -> Vec<String> {
        extract_locations(GeoRegistry::builtin(), item, document, summary)
    }

    #[test]
    fn test_lone_region_not_collapsed_into_country() {
        let item = "福岛核废水排放引发出口管制";
        assert_eq!(run(item, item, None), vec!["福岛"]);
    }

    #[test]
    fn test_country_dropped_for_its_region() {
        let item = "中国东莞工厂停工，影响交付";
        assert_eq!(run(item, item, None), vec!["东莞"]);
    }

    #[test]
    fn test_alias_normalised_before_hierarchy() {
        let item = "印尼镍矿出口政策收紧";
        assert_eq!(run(item, item, None), vec!["印度尼西亚"]);
    }

    #[test]
    fn test_nothing_found_is_unspecified() {
        let item = "原材料价格持续上涨";
        assert_eq!(run(item, item, Some("")), vec!["未明确"]);
        assert_eq!(run(item, item, None), vec!["未明确"]);
    }

    #[test]
    fn test_excluded_only_is_unspecified() {
        let item = "安世与本田在海外的合作受阻";
        assert_eq!(run(item, item, None), vec!["未明确"]);
    }

    #[test]
    fn test_summary_fallback() {
        let summary = "- **地缘政治风险**：荷兰政府接管安世";
        assert_eq!(run("供应链中断", "全文", Some(summary)), vec!["荷兰"]);
    }

    #[test]
    fn test_document_relations_apply_to_items() {
        // The report says 塞梅鲁 lies in 印度尼西亚, overriding the manual
        // 东爪哇 link for this document only.
        let document = "塞梅鲁属于印度尼西亚。塞梅鲁火山灰影响东爪哇航班。";
        let pipeline = LocationExtractionPipeline::new(GeoRegistry::builtin(), document);
        assert_eq!(pipeline.relations().parent_of("塞梅鲁"), Some("印度尼西亚"));
        assert_eq!(pipeline.extract("塞梅鲁与东爪哇"), vec!["塞梅鲁", "东爪哇"]);

        let neutral = LocationExtractionPipeline::new(GeoRegistry::builtin(), "无相关描述");
        assert_eq!(neutral.extract("塞梅鲁与东爪哇"), vec!["东爪哇"]);
    }

    #[test]
    fn test_relations_computed_once_per_document() {
        let pipeline = LocationExtractionPipeline::new(GeoRegistry::builtin(), "东爪哇属于印度尼西亚");
        let first: *const RelationMap = pipeline.relations();
        pipeline.extract("东爪哇");
        pipeline.extract("印度尼西亚");
        assert!(std::ptr::eq(first, pipeline.relations()));
    }

    #[test]
    fn test_merged_excerpts_drop_sentinel_and_refilter() {
        let pipeline = LocationExtractionPipeline::new(GeoRegistry::builtin(), "报告");
        let merged = pipeline.extract_merged(&["日本出口管制收紧", "福岛周边港口停运", ""]);
        assert_eq!(merged, vec!["福岛"]);

        let merged = pipeline.extract_merged(&["价格波动", "东莞工厂停工"]);
        assert_eq!(merged, vec!["东莞"]);

        let merged = pipeline.extract_merged(&["价格波动", "  "]);
        assert!(pipeline.is_unspecified(&merged));
    }

    #[test]
    fn test_blank_description_falls_back_to_summary() {
        let pipeline = LocationExtractionPipeline::new(GeoRegistry::builtin(), "报告")
            .with_summary(Some("- **政策风险**：荷兰政府介入"));
        assert_eq!(pipeline.extract_merged(&["", ""]), vec!["荷兰"]);
        assert_eq!(pipeline.extract_merged(&["  ", "福岛港口停运"]), vec!["荷兰", "福岛"]);
    }
}

//! Risk report parsing — fixed-pattern field extraction from the markdown
//! assessment reports, plus per-risk location assembly.
//!
//! Expected layout: a `## 标题：` line (or `###`/`#` heading), a
//! `#### n. 风险速览` overview, a `| 序号 | 风险名称 | 风险类别 | 风险等级 | 风险描述 |`
//! table, `##### （n）name` detail blocks with `- **字段：**` bullets, and a
//! `#### 作者署名` signature followed by a timestamp line.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{GeoError, Result};
use crate::pipeline::LocationExtractionPipeline;
use crate::registry::{Coordinates, GeoRegistry};
use crate::relations::RelationMap;

// ── Patterns ────────────────────────────────────────────────────────

static TITLE_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"##\s*标题[：:]\s*(.+)").unwrap());

static TITLE_H3: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^###\s+(.+?)$").unwrap());

static TITLE_H1: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#\s+(.+)$").unwrap());

static RISK_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\|\s*(\d+)\s*\|\s*([^|]+)\s*\|\s*([^|]+)\s*\|\s*([^|]+)\s*\|\s*([^|]+)\s*\|").unwrap()
});

static DETAIL_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#####\s*（(\d+)）\s*([^\n]+)\n").unwrap());

static TRIGGER_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"- \*\*触发条件[：:]\*\*\s*").unwrap());

static MANIFESTATION_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"- \*\*风险表现[：:]\*\*\s*").unwrap());

static LEVEL_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"- \*\*风险等级[：:]\*\*\s*").unwrap());

static COUNTERMEASURES_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"- \*\*风险应对[：:]\*\*\s*").unwrap());

// Where a bullet value ends: the next top-level bullet or detail heading.
// Indented sub-bullets stay part of the value.
static FIELD_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n-|\n#####").unwrap());

// The level value also stops at an indented bullet (`  - 判断依据`).
static LEVEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*-|\n#####").unwrap());

static JUDGMENT_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"- \*\*风险等级[：:]\*\*\s*[^\n]+\s*\n\s*- 判断依据[：:]\s*").unwrap()
});

static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\s*([^\n]+)").unwrap());

static SUMMARY_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"####\s*\d+\.\s*风险速览\s*\n").unwrap());

static SUMMARY_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n---|\n####").unwrap());

static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static AUTHOR_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"作者署名[：:]\s*(.+)").unwrap());

static AUTHOR_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"####\s*作者署名\s*\n").unwrap());

static DATE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\d{4}-\d{2}-\d{2}").unwrap());

static DATE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"日期[：:]\s*(\d{4}-\d{2}-\d{2})").unwrap());

static SIGNED_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)####\s*作者署名\s*\n.*?\n(\d{4}-\d{2}-\d{2})[_\s]\d{2}-\d{2}-\d{2}").unwrap()
});

static ANY_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})[_\s]\d{2}-\d{2}-\d{2}").unwrap());

/// Text after `start` up to the first `boundary` match, or to the end.
/// At least one character is taken before a boundary can end the value.
fn take_until<'t>(text: &'t str, start: usize, boundary: &Regex, min_one: bool) -> Option<&'t str> {
    let rest = &text[start..];
    let skip = if min_one {
        rest.chars().next()?.len_utf8()
    } else {
        0
    };
    let end = boundary
        .find(&rest[skip..])
        .map(|m| skip + m.start())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ── Records ─────────────────────────────────────────────────────────

/// One row of the risk table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskItem {
    pub seq: u32,
    pub name: String,
    pub category: String,
    pub level: String,
    pub description: String,
    pub locations: Vec<String>,
}

/// One `##### （n）` detail block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDetail {
    pub seq: u32,
    pub name: String,
    pub trigger: Option<String>,
    pub manifestation: Option<String>,
    pub level: Option<String>,
    pub judgment_basis: Option<String>,
    pub countermeasures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub name: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedReport {
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub summary: Option<String>,
    pub risks: Vec<RiskItem>,
    pub details: Vec<RiskDetail>,
    pub location_relations: RelationMap,
}

impl ParsedReport {
    /// One marker per distinct location across all risks, first-seen order.
    pub fn markers(&self, registry: &GeoRegistry) -> Vec<MapMarker> {
        let mut markers: Vec<MapMarker> = Vec::new();
        for loc in self.risks.iter().flat_map(|r| r.locations.iter()) {
            if loc == registry.unspecified() || markers.iter().any(|m| &m.name == loc) {
                continue;
            }
            markers.push(MapMarker {
                name: loc.clone(),
                coordinates: registry.marker_coordinates(loc),
            });
        }
        markers
    }

    /// Risk count per level, most frequent first.
    pub fn level_counts(&self) -> Vec<(String, usize)> {
        tally(self.risks.iter().map(|r| r.level.as_str()))
    }

    /// Risk count per category, most frequent first.
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        tally(self.risks.iter().map(|r| r.category.as_str()))
    }

    /// Parsed fields plus markers and statistics, as handed to a renderer.
    pub fn render<'r>(&'r self, registry: &GeoRegistry) -> RenderedReport<'r> {
        RenderedReport {
            report: self,
            table_version: registry.version(),
            markers: self.markers(registry),
            level_counts: self.level_counts(),
            category_counts: self.category_counts(),
        }
    }

    pub fn to_json(&self, registry: &GeoRegistry) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.render(registry))?)
    }
}

/// Renderer input: the parsed report with its map markers and counts.
#[derive(Debug, Serialize)]
pub struct RenderedReport<'r> {
    #[serde(flatten)]
    pub report: &'r ParsedReport,
    pub table_version: u32,
    pub markers: Vec<MapMarker>,
    pub level_counts: Vec<(String, usize)>,
    pub category_counts: Vec<(String, usize)>,
}

fn tally<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value.to_string(), 1)),
        }
    }
    // Stable: ties keep first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

// ── Parser ──────────────────────────────────────────────────────────

pub struct RiskReport {
    content: String,
}

impl RiskReport {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| GeoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(content))
    }

    /// `## 标题：` field, else the first `###` heading that names a risk,
    /// else the first `#` heading.
    pub fn title(&self) -> Option<String> {
        if let Some(cap) = TITLE_FIELD.captures(&self.content) {
            return non_empty(&cap[1]);
        }
        if let Some(cap) = TITLE_H3.captures(&self.content) {
            let heading = cap[1].trim();
            if !heading.contains("作者署名") && heading.contains("风险") {
                return non_empty(heading);
            }
        }
        TITLE_H1
            .captures(&self.content)
            .and_then(|cap| non_empty(&cap[1]))
    }

    /// Risk table rows. Locations are left empty; see [`RiskReport::parse`].
    pub fn risk_rows(&self) -> Vec<RiskItem> {
        RISK_ROW
            .captures_iter(&self.content)
            .filter_map(|cap| {
                Some(RiskItem {
                    seq: cap[1].parse().ok()?,
                    name: cap[2].trim().to_string(),
                    category: cap[3].trim().to_string(),
                    level: cap[4].trim().to_string(),
                    description: cap[5].trim().to_string(),
                    locations: Vec::new(),
                })
            })
            .collect()
    }

    pub fn details(&self) -> Vec<RiskDetail> {
        let mut details = Vec::new();
        for cap in DETAIL_HEADER.captures_iter(&self.content) {
            let Ok(seq) = cap[1].parse::<u32>() else {
                continue;
            };
            let Some(header) = cap.get(0) else {
                continue;
            };
            // A block runs to the next heading of level three or deeper.
            let rest = &self.content[header.end()..];
            let body = &rest[..rest.find("###").unwrap_or(rest.len())];

            details.push(RiskDetail {
                seq,
                name: cap[2].trim().to_string(),
                trigger: field(body, &TRIGGER_FIELD, &FIELD_BOUNDARY),
                manifestation: field(body, &MANIFESTATION_FIELD, &FIELD_BOUNDARY),
                level: field(body, &LEVEL_FIELD, &LEVEL_BOUNDARY),
                judgment_basis: judgment_basis(body),
                countermeasures: countermeasures(body),
            });
        }
        details
    }

    /// The `风险速览` overview, used as the location fallback excerpt.
    pub fn summary(&self) -> Option<String> {
        let start = SUMMARY_START.find(&self.content)?;
        let raw = take_until(&self.content, start.end(), &SUMMARY_BOUNDARY, true)?;
        let collapsed = BLANK_RUN.replace_all(raw.trim(), "\n\n");
        non_empty(&collapsed.replace("- **", "\n- **"))
    }

    pub fn author(&self) -> Option<String> {
        if let Some(cap) = AUTHOR_FIELD.captures(&self.content) {
            return non_empty(&cap[1]);
        }
        let start = AUTHOR_HEADING.find(&self.content)?;
        let block = take_until(&self.content, start.end(), &DATE_LINE, true)?;
        block.trim().lines().next().and_then(non_empty)
    }

    /// `YYYY-MM-DD` from a `日期：` field, the signature timestamp, or any
    /// `YYYY-MM-DD_HH-MM-SS` stamp in the text.
    pub fn date(&self) -> Option<String> {
        [&*DATE_FIELD, &*SIGNED_TIMESTAMP, &*ANY_TIMESTAMP]
            .iter()
            .find_map(|re| re.captures(&self.content))
            .map(|cap| cap[1].to_string())
    }

    /// Parse every field and resolve each risk's locations against this
    /// report's relation map.
    pub fn parse(&self, registry: &GeoRegistry) -> ParsedReport {
        let summary = self.summary();
        let details = self.details();
        let pipeline =
            LocationExtractionPipeline::new(registry, &self.content).with_summary(summary.as_deref());

        let risks: Vec<RiskItem> = self
            .risk_rows()
            .into_iter()
            .map(|mut risk| {
                let trigger = details
                    .iter()
                    .find(|d| d.seq == risk.seq)
                    .and_then(|d| d.trigger.as_deref())
                    .unwrap_or("");
                risk.locations = pipeline.extract_merged(&[risk.description.as_str(), trigger]);
                risk
            })
            .collect();
        let location_relations = pipeline.relations().clone();
        let unresolved = risks
            .iter()
            .filter(|r| pipeline.is_unspecified(&r.locations))
            .count();
        if unresolved > 0 {
            tracing::debug!(unresolved, "risks without a recognised location");
        }

        tracing::debug!(risks = risks.len(), details = details.len(), "risk report parsed");

        ParsedReport {
            title: self.title(),
            author: self.author(),
            date: self.date(),
            summary,
            risks,
            details,
            location_relations,
        }
    }
}

fn field(body: &str, label: &Regex, boundary: &Regex) -> Option<String> {
    let start = label.find(body)?;
    take_until(body, start.end(), boundary, true).and_then(non_empty)
}

fn judgment_basis(body: &str) -> Option<String> {
    let start = JUDGMENT_START.find(body)?;
    take_until(body, start.end(), &FIELD_BOUNDARY, true).and_then(non_empty)
}

fn countermeasures(body: &str) -> Vec<String> {
    let Some(start) = COUNTERMEASURES_FIELD.find(body) else {
        return Vec::new();
    };
    let block = take_until(body, start.end(), &FIELD_BOUNDARY, false).unwrap_or("");
    NUMBERED_ITEM
        .captures_iter(block)
        .map(|cap| cap[1].trim().to_string())
        .collect()
}

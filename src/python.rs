//! Python bindings — the report tooling calls into the engine through these.
//!
//! Every function works against the built-in keyword table.

use std::collections::BTreeMap;
use std::path::Path;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::error::GeoError;
use crate::hierarchy::HierarchyResolver;
use crate::normalize::LocationNormalizer;
use crate::pipeline;
use crate::registry::{self, GeoRegistry};
use crate::relations::RelationshipExtractor;
use crate::report::RiskReport;

impl From<GeoError> for PyErr {
    fn from(err: GeoError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// Canonical name for a place token, or None for vague/non-geographic ones.
#[pyfunction]
pub fn normalize_location(raw: &str) -> Option<String> {
    LocationNormalizer::new(GeoRegistry::builtin()).normalize(raw)
}

/// Locations for one risk item.
///
/// Parameters
/// ----------
/// item_text : str
///     Risk description or trigger condition to scan.
/// document_text : str
///     Full report, used for relation extraction.
/// summary_text : str | None
///     Fallback excerpt when the item names no place.
///
/// Returns
/// -------
/// list[str]
///     Canonical names, or ["未明确"] when nothing was found.
#[pyfunction]
#[pyo3(signature = (item_text, document_text, summary_text=None))]
pub fn extract_locations(item_text: &str, document_text: &str, summary_text: Option<&str>) -> Vec<String> {
    pipeline::extract_locations(GeoRegistry::builtin(), item_text, document_text, summary_text)
}

/// Child -> parent place relations found in a report.
#[pyfunction]
pub fn extract_location_relationships(document_text: &str) -> BTreeMap<String, String> {
    RelationshipExtractor::new(GeoRegistry::builtin())
        .extract(document_text)
        .as_map()
        .clone()
}

/// Drop locations covered by a related location in the same list.
#[pyfunction]
pub fn filter_redundant_locations(locations: Vec<String>, document_text: &str) -> Vec<String> {
    let reg = GeoRegistry::builtin();
    let relations = RelationshipExtractor::new(reg).extract(document_text);
    HierarchyResolver::new(reg).filter(&locations, &relations)
}

/// Whether one place is the other's parent in the report's relations, so a
/// renderer can skip drawing a link between them.
#[pyfunction]
pub fn same_region(a: &str, b: &str, document_text: &str) -> bool {
    RelationshipExtractor::new(GeoRegistry::builtin())
        .extract(document_text)
        .same_region(a, b)
}

/// Great-circle distance in kilometres.
#[pyfunction]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    registry::haversine_km(lat1, lon1, lat2, lon2)
}

/// Parse a markdown risk report and return it as JSON.
#[pyfunction]
pub fn parse_report(markdown: &str) -> PyResult<String> {
    let parsed = RiskReport::new(markdown).parse(GeoRegistry::builtin());
    Ok(parsed.to_json(GeoRegistry::builtin())?)
}

/// Read and parse a markdown risk report file, returning JSON.
#[pyfunction]
pub fn parse_report_file(path: &str) -> PyResult<String> {
    let parsed = RiskReport::from_file(Path::new(path))?.parse(GeoRegistry::builtin());
    Ok(parsed.to_json(GeoRegistry::builtin())?)
}

/// Risk Geo Core — native location engine for risk report visualisation.
#[pymodule]
fn risk_geo_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Location engine
    m.add_function(wrap_pyfunction!(normalize_location, m)?)?;
    m.add_function(wrap_pyfunction!(extract_locations, m)?)?;
    m.add_function(wrap_pyfunction!(extract_location_relationships, m)?)?;
    m.add_function(wrap_pyfunction!(filter_redundant_locations, m)?)?;
    m.add_function(wrap_pyfunction!(same_region, m)?)?;
    m.add_function(wrap_pyfunction!(haversine_km, m)?)?;

    // Report parsing
    m.add_function(wrap_pyfunction!(parse_report, m)?)?;
    m.add_function(wrap_pyfunction!(parse_report_file, m)?)?;

    Ok(())
}

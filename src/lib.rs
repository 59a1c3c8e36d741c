//! Location engine for markdown risk assessment reports.
//!
//! Turns place names scattered through report text into a deduplicated,
//! hierarchy-consistent location list per risk item:
//! 1. Registry (keyword table, aliases, exclusions, coordinates, hierarchy)
//! 2. Normalisation (alias folding, vague-token exclusion, keyword scan)
//! 3. Relation extraction (textual patterns + coordinate proximity)
//! 4. Redundancy filtering (static, manual and per-document links)
//!
//! Report field extraction sits on top, and with the `python` feature the
//! whole thing is exposed as a Python extension module.

pub mod error;
pub mod hierarchy;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod relations;
pub mod report;

#[cfg(feature = "python")]
mod python;

pub use error::{GeoError, Result};
pub use hierarchy::{EffectiveHierarchy, HierarchyResolver, LinkSource};
pub use normalize::LocationNormalizer;
pub use pipeline::{extract_locations, LocationExtractionPipeline};
pub use registry::{haversine_km, Coordinates, GeoRegistry, GeoTableConfig};
pub use relations::{RelationMap, RelationPattern, RelationshipExtractor};
pub use report::{MapMarker, ParsedReport, RenderedReport, RiskDetail, RiskItem, RiskReport};

//! Location registry — the immutable keyword table every component reads.
//!
//! Holds the recognised keywords (in scan order), alias and exclusion sets,
//! coordinates, the static region → country table and the manual
//! region → region links. Built once from TOML and shared by reference.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{GeoError, Result};

const BUILTIN_TABLE: &str = include_str!("../config/geo_keywords.toml");

static BUILTIN: Lazy<GeoRegistry> = Lazy::new(|| {
    GeoRegistry::from_toml_str(BUILTIN_TABLE).expect("embedded geo_keywords.toml is valid")
});

/// Mean Earth radius used for every distance in this crate.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two lat/lng points.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        haversine_km(self.lat, self.lon, other.lat, other.lon)
    }

    fn from_pair(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

fn default_unspecified() -> String {
    "unspecified".to_string()
}

fn default_threshold() -> f64 {
    100.0
}

fn default_marker() -> [f64; 2] {
    [30.0, 120.0]
}

/// On-disk shape of the keyword table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoTableConfig {
    pub version: u32,
    #[serde(default = "default_unspecified")]
    pub unspecified: String,
    #[serde(default = "default_threshold")]
    pub proximity_threshold_km: f64,
    #[serde(default = "default_marker")]
    pub default_marker: [f64; 2],
    pub keywords: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub strip_suffixes: Vec<String>,
    #[serde(default)]
    pub admin_suffixes: Vec<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub coordinates: BTreeMap<String, [f64; 2]>,
    #[serde(default)]
    pub hierarchy: BTreeMap<String, String>,
    #[serde(default)]
    pub region_links: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct GeoRegistry {
    version: u32,
    unspecified: String,
    proximity_threshold_km: f64,
    default_marker: Coordinates,
    keywords: Vec<String>,
    excluded: HashSet<String>,
    strip_suffixes: Vec<String>,
    admin_suffixes: Vec<String>,
    aliases: HashMap<String, String>,
    coordinates: HashMap<String, Coordinates>,
    hierarchy: BTreeMap<String, String>,
    regions_by_country: HashMap<String, Vec<String>>,
    region_links: BTreeMap<String, String>,
}

impl GeoRegistry {
    /// The table shipped in `config/geo_keywords.toml`.
    pub fn builtin() -> &'static GeoRegistry {
        &BUILTIN
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| GeoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GeoTableConfig = toml::from_str(content)?;
        Self::from_config(config)
    }

    pub fn from_config(config: GeoTableConfig) -> Result<Self> {
        validate(&config)?;

        let mut regions_by_country: HashMap<String, Vec<String>> = HashMap::new();
        for (region, country) in &config.hierarchy {
            regions_by_country
                .entry(country.clone())
                .or_default()
                .push(region.clone());
        }

        let registry = Self {
            version: config.version,
            unspecified: config.unspecified,
            proximity_threshold_km: config.proximity_threshold_km,
            default_marker: Coordinates::from_pair(config.default_marker),
            keywords: config.keywords,
            excluded: config.excluded.into_iter().collect(),
            strip_suffixes: config.strip_suffixes,
            admin_suffixes: config.admin_suffixes,
            aliases: config.aliases.into_iter().collect(),
            coordinates: config
                .coordinates
                .into_iter()
                .map(|(name, pair)| (name, Coordinates::from_pair(pair)))
                .collect(),
            hierarchy: config.hierarchy,
            regions_by_country,
            region_links: config.region_links,
        };

        tracing::debug!(
            version = registry.version,
            keywords = registry.keywords.len(),
            "location registry loaded"
        );
        Ok(registry)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Sentinel reported for a risk item with no recognised location.
    pub fn unspecified(&self) -> &str {
        &self.unspecified
    }

    pub fn proximity_threshold_km(&self) -> f64 {
        self.proximity_threshold_km
    }

    /// Recognised keywords in scan order, excluded tokens included.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_excluded(&self, token: &str) -> bool {
        self.excluded.contains(token)
    }

    pub fn alias(&self, token: &str) -> Option<&str> {
        self.aliases.get(token).map(String::as_str)
    }

    pub fn strip_suffixes(&self) -> &[String] {
        &self.strip_suffixes
    }

    pub fn admin_suffixes(&self) -> &[String] {
        &self.admin_suffixes
    }

    pub fn coordinates(&self, name: &str) -> Option<Coordinates> {
        self.coordinates.get(name).copied()
    }

    /// Coordinates for a map marker, falling back to the table default.
    pub fn marker_coordinates(&self, name: &str) -> Coordinates {
        self.coordinates(name).unwrap_or(self.default_marker)
    }

    /// Static region → country table.
    pub fn hierarchy(&self) -> &BTreeMap<String, String> {
        &self.hierarchy
    }

    /// Regions the static table places under `country`.
    pub fn regions_of(&self, country: &str) -> &[String] {
        self.regions_by_country
            .get(country)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Manual region → region links.
    pub fn region_links(&self) -> &BTreeMap<String, String> {
        &self.region_links
    }
}

fn validate(config: &GeoTableConfig) -> Result<()> {
    if config.keywords.is_empty() {
        return Err(GeoError::InvalidTable("keyword list is empty".into()));
    }
    if !(config.proximity_threshold_km.is_finite() && config.proximity_threshold_km > 0.0) {
        return Err(GeoError::InvalidTable(format!(
            "proximity threshold must be positive, got {}",
            config.proximity_threshold_km
        )));
    }

    let excluded: HashSet<&str> = config.excluded.iter().map(String::as_str).collect();
    for (alias, target) in &config.aliases {
        if config.aliases.contains_key(target) {
            return Err(GeoError::InvalidTable(format!(
                "alias {alias} points at another alias {target}"
            )));
        }
        if excluded.contains(target.as_str()) {
            return Err(GeoError::InvalidTable(format!(
                "alias {alias} points at excluded token {target}"
            )));
        }
    }

    for (name, [lat, lon]) in &config.coordinates {
        if !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lon) {
            return Err(GeoError::InvalidTable(format!(
                "coordinates for {name} out of range: ({lat}, {lon})"
            )));
        }
    }

    for (region, country) in &config.hierarchy {
        if region == country {
            return Err(GeoError::InvalidTable(format!("{region} is its own country")));
        }
        if config.hierarchy.contains_key(country) {
            return Err(GeoError::InvalidTable(format!(
                "country {country} (parent of {region}) has a parent itself"
            )));
        }
    }

    for start in config.region_links.keys() {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = start.as_str();
        while let Some(parent) = config.region_links.get(current) {
            if !seen.insert(current) {
                return Err(GeoError::InvalidTable(format!(
                    "region links form a cycle through {start}"
                )));
            }
            current = parent;
        }
    }

    Ok(())
}

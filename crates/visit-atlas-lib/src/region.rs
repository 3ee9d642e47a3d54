//! Selectable map regions and their geometry
//!
//! Region geometry comes from a GeoJSON FeatureCollection whose features carry an
//! ISO 3166-1 alpha-2 code and a display name. Feature ids are assigned per load and
//! must never be persisted; the region code is the durable identity.

use crate::engine::FeatureId;
use crate::style::{REGION_CODE_PROPERTY, REGION_NAME_PROPERTY};
use crate::{AtlasError, Coordinate, Result};
use geo::{BoundingRect, Contains, Coord, LineString, MultiPolygon, Point, Polygon, Rect};
use serde_json::Value;

/// Administrative level recorded for regions of the countries source
pub const COUNTRY_ADMIN_LEVEL: &str = "Country";

/// Record handed to the store when a visit is confirmed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlaceInfo {
    pub unique_id: String,
    pub place_name: String,
    pub admin_level: String,
    pub country_code_iso: String,
}

/// A selectable region as seen by the interaction core
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionFeature {
    pub feature_id: FeatureId,
    /// Stable region code (ISO 3166-1 alpha-2)
    pub region_id: String,
    pub display_name: String,
}

impl RegionFeature {
    pub fn place_info(&self) -> PlaceInfo {
        PlaceInfo {
            unique_id: self.region_id.clone(),
            place_name: self.display_name.clone(),
            admin_level: COUNTRY_ADMIN_LEVEL.to_string(),
            country_code_iso: self.region_id.clone(),
        }
    }
}

/// A region together with its polygons
#[derive(Debug, Clone)]
pub struct RegionGeometry {
    pub feature: RegionFeature,
    pub shape: MultiPolygon<f64>,
    bounds: Option<Rect<f64>>,
}

impl RegionGeometry {
    pub fn new(feature: RegionFeature, shape: MultiPolygon<f64>) -> Self {
        let bounds = shape.bounding_rect();
        Self {
            feature,
            shape,
            bounds,
        }
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }

    pub fn contains(&self, at: &Coordinate) -> bool {
        let point: Point<f64> = (*at).into();
        match self.bounds {
            Some(bounds) if within_bounds(&bounds, &point) => self.shape.contains(&point),
            _ => false,
        }
    }
}

/// Inclusive bounding box check
#[inline]
fn within_bounds(bounds: &Rect<f64>, point: &Point<f64>) -> bool {
    let (min, max) = (bounds.min(), bounds.max());
    point.x() >= min.x && point.x() <= max.x && point.y() >= min.y && point.y() <= max.y
}

/// All regions of one loaded geometry source
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: Vec<RegionGeometry>,
}

impl RegionCatalog {
    pub fn new(regions: Vec<RegionGeometry>) -> Self {
        Self { regions }
    }

    /// Parse a GeoJSON FeatureCollection.
    ///
    /// With `generate_id` every feature gets its index as id; otherwise the numeric
    /// `id` member of each feature is used and features without one are skipped.
    /// Features without a region code or without polygon geometry are skipped too.
    pub fn from_geojson(text: &str, generate_id: bool) -> Result<Self> {
        profiling::scope!("RegionCatalog::from_geojson");

        let document: Value =
            serde_json::from_str(text).map_err(|e| AtlasError::InvalidGeometry(e.to_string()))?;
        let features = document["features"]
            .as_array()
            .ok_or_else(|| AtlasError::InvalidGeometry("no features array".to_string()))?;

        let mut regions = Vec::with_capacity(features.len());
        for (index, feature) in features.iter().enumerate() {
            let feature_id = if generate_id {
                FeatureId(index as u64)
            } else {
                match feature["id"].as_u64() {
                    Some(id) => FeatureId(id),
                    None => {
                        tracing::debug!("Skipping feature {index} without numeric id");
                        continue;
                    }
                }
            };

            let properties = &feature["properties"];
            let Some(region_id) = properties[REGION_CODE_PROPERTY].as_str() else {
                tracing::debug!("Skipping feature {index} without {REGION_CODE_PROPERTY}");
                continue;
            };
            let display_name = properties[REGION_NAME_PROPERTY]
                .as_str()
                .unwrap_or(region_id)
                .to_string();

            let Some(shape) = parse_shape(&feature["geometry"]) else {
                tracing::debug!("Skipping feature {index} ({region_id}) without polygons");
                continue;
            };

            regions.push(RegionGeometry::new(
                RegionFeature {
                    feature_id,
                    region_id: region_id.to_string(),
                    display_name,
                },
                shape,
            ));
        }

        tracing::info!("Loaded {} regions", regions.len());
        Ok(Self { regions })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionGeometry> {
        self.regions.iter()
    }

    pub fn get(&self, id: FeatureId) -> Option<&RegionGeometry> {
        self.regions.iter().find(|r| r.feature.feature_id == id)
    }

    /// Regions containing the coordinate, last-drawn first
    pub fn hit_test(&self, at: &Coordinate) -> Vec<&RegionGeometry> {
        self.regions.iter().rev().filter(|r| r.contains(at)).collect()
    }
}

fn parse_shape(geometry: &Value) -> Option<MultiPolygon<f64>> {
    let coordinates = &geometry["coordinates"];
    let polygons: Vec<Polygon<f64>> = match geometry["type"].as_str()? {
        "Polygon" => vec![parse_polygon(coordinates)?],
        "MultiPolygon" => coordinates
            .as_array()?
            .iter()
            .filter_map(parse_polygon)
            .collect(),
        _ => return None,
    };
    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(polygons))
    }
}

fn parse_polygon(rings: &Value) -> Option<Polygon<f64>> {
    let mut rings = rings.as_array()?.iter().filter_map(parse_ring);
    let exterior = rings.next()?;
    Some(Polygon::new(exterior, rings.collect()))
}

fn parse_ring(ring: &Value) -> Option<LineString<f64>> {
    let coords: Vec<Coord<f64>> = ring
        .as_array()?
        .iter()
        .filter_map(|p| {
            let p = p.as_array()?;
            Some(Coord {
                x: p.first()?.as_f64()?,
                y: p.get(1)?.as_f64()?,
            })
        })
        .collect();
    if coords.len() < 3 {
        None
    } else {
        Some(LineString::new(coords))
    }
}

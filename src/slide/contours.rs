//! Tissue contours stored next to a slide.
//!
//! Contours are a GeoJSON FeatureCollection of Polygon and MultiPolygon
//! features in level-0 pixel coordinates. Each polygon becomes one
//! [`TissueContour`]; a MultiPolygon contributes one contour per member and
//! every member keeps the feature's properties.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::SlideError;

/// A point in level-0 pixel coordinates.
pub type Point = (f64, f64);

/// One tissue region: an outer ring and its holes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TissueContour {
    pub exterior: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
    pub properties: Map<String, Value>,
}

impl TissueContour {
    /// Axis-aligned bounds of the exterior as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let (&(x, y), rest) = self.exterior.split_first()?;
        Some(rest.iter().fold((x, y, x, y), |(x0, y0, x1, y1), &(x, y)| {
            (x0.min(x), y0.min(y), x1.max(x), y1.max(y))
        }))
    }
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

/// Positions keep any third coordinate; only x and y are read.
type Ring = Vec<Vec<f64>>;

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Unsupported,
}

fn ring_points(ring: Ring) -> Vec<Point> {
    ring.into_iter()
        .filter_map(|position| match position.as_slice() {
            [x, y, ..] => Some((*x, *y)),
            _ => None,
        })
        .collect()
}

fn polygon(rings: Vec<Ring>, properties: &Map<String, Value>) -> Option<TissueContour> {
    let mut rings = rings.into_iter().map(ring_points);
    let exterior = rings.next().filter(|ring| !ring.is_empty())?;
    Some(TissueContour {
        exterior,
        holes: rings.filter(|ring| !ring.is_empty()).collect(),
        properties: properties.clone(),
    })
}

/// Parse a GeoJSON FeatureCollection into contours.
///
/// Features without geometry or with geometry other than polygons are
/// skipped.
pub fn parse_contours(text: &str) -> Result<Vec<TissueContour>, serde_json::Error> {
    let collection: FeatureCollection = serde_json::from_str(text)?;

    let mut contours = Vec::new();
    for feature in collection.features {
        let properties = feature.properties.unwrap_or_default();
        match feature.geometry {
            Some(Geometry::Polygon { coordinates }) => {
                contours.extend(polygon(coordinates, &properties));
            }
            Some(Geometry::MultiPolygon { coordinates }) => {
                contours.extend(
                    coordinates
                        .into_iter()
                        .filter_map(|rings| polygon(rings, &properties)),
                );
            }
            Some(Geometry::Unsupported) => warn!("Skipping non-polygon contour feature"),
            None => {}
        }
    }

    Ok(contours)
}

/// Load the contour file at `path`.
pub async fn load_contours(path: &Path) -> Result<Vec<TissueContour>, SlideError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            SlideError::NotFound(path.to_path_buf())
        } else {
            SlideError::initialization(path, e)
        }
    })?;

    let contours = parse_contours(&text).map_err(|e| SlideError::initialization(path, e))?;
    debug!(path = %path.display(), count = contours.len(), "Loaded tissue contours");
    Ok(contours)
}

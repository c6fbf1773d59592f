//! WKT decoding and `GeoJSON` encoding for segment geometries.

use geojson::{Feature, FeatureCollection, JsonObject, feature::Id};
use wkt::TryFromWkt;

use crate::AreaGeometry;

/// Errors from decoding a persisted geometry value.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid WKT.
    #[error("Malformed WKT: {0}")]
    Malformed(String),

    /// The WKT parsed but is not a polygon or multipolygon.
    #[error("Unsupported geometry type: {0}")]
    UnsupportedType(&'static str),

    /// The geometry has no coordinates.
    #[error("Empty geometry")]
    Empty,
}

/// Parses a WKT string into an [`AreaGeometry`].
///
/// # Errors
///
/// Returns [`CodecError`] if the text does not parse, is not areal, or is
/// empty.
pub fn decode_wkt(text: &str) -> Result<AreaGeometry, CodecError> {
    let geometry = geo::Geometry::<f64>::try_from_wkt_str(text.trim())
        .map_err(|e| CodecError::Malformed(e.to_string()))?;

    let area = match geometry {
        geo::Geometry::Polygon(p) => AreaGeometry::Polygon(p),
        geo::Geometry::MultiPolygon(mp) => AreaGeometry::MultiPolygon(mp),
        geo::Geometry::Point(_) => return Err(CodecError::UnsupportedType("Point")),
        geo::Geometry::Line(_) => return Err(CodecError::UnsupportedType("Line")),
        geo::Geometry::LineString(_) => return Err(CodecError::UnsupportedType("LineString")),
        geo::Geometry::MultiPoint(_) => return Err(CodecError::UnsupportedType("MultiPoint")),
        geo::Geometry::MultiLineString(_) => {
            return Err(CodecError::UnsupportedType("MultiLineString"));
        }
        geo::Geometry::GeometryCollection(_) => {
            return Err(CodecError::UnsupportedType("GeometryCollection"));
        }
        geo::Geometry::Rect(_) => return Err(CodecError::UnsupportedType("Rect")),
        geo::Geometry::Triangle(_) => return Err(CodecError::UnsupportedType("Triangle")),
    };

    if area.bounding_rect().is_none() {
        return Err(CodecError::Empty);
    }

    Ok(area)
}

/// One feature to encode: an id, a geometry, and its flat attributes.
#[derive(Debug, Clone)]
pub struct FeatureParts<'a> {
    /// Feature id.
    pub id: String,
    /// Geometry to emit.
    pub geometry: &'a AreaGeometry,
    /// Non-geometry attributes.
    pub properties: JsonObject,
}

/// Encodes features as a `GeoJSON` `FeatureCollection`.
///
/// Coordinates are emitted as `[lng, lat]`. The transform is pure; an empty
/// input yields a collection with an empty `features` array.
#[must_use]
pub fn encode_feature_collection<'a>(
    features: impl IntoIterator<Item = FeatureParts<'a>>,
) -> FeatureCollection {
    let features = features
        .into_iter()
        .map(|parts| {
            let geometry = geo::Geometry::from(parts.geometry);
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
                id: Some(Id::String(parts.id)),
                properties: Some(parts.properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

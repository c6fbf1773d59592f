#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geometry handling for the hotspot pipeline.
//!
//! Segment polygons are decoded from WKT once per materialization, indexed
//! in an R-tree by envelope, filtered against map viewports, simplified for
//! the requested zoom, and encoded as `GeoJSON`.

pub mod codec;
pub mod simplify;

use accident_risk_models::BoundingBox;
use geo::{BoundingRect, Intersects, MultiPolygon, Polygon, Rect};
use rstar::{AABB, RTree, RTreeObject};

/// An areal segment geometry in lon/lat (EPSG:4326).
#[derive(Debug, Clone, PartialEq)]
pub enum AreaGeometry {
    /// A single polygon.
    Polygon(Polygon<f64>),
    /// A collection of polygons.
    MultiPolygon(MultiPolygon<f64>),
}

impl AreaGeometry {
    /// Bounding rectangle, or `None` for an empty geometry.
    #[must_use]
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Self::Polygon(p) => p.bounding_rect(),
            Self::MultiPolygon(mp) => mp.bounding_rect(),
        }
    }

    /// Whether the geometry intersects `rect`. Touching the boundary counts.
    #[must_use]
    pub fn intersects_rect(&self, rect: &Rect<f64>) -> bool {
        match self {
            Self::Polygon(p) => p.intersects(rect),
            Self::MultiPolygon(mp) => mp.intersects(rect),
        }
    }

    /// Total number of coordinates across all rings.
    #[must_use]
    pub fn coord_count(&self) -> usize {
        let polygon_coords = |p: &Polygon<f64>| {
            p.exterior().0.len() + p.interiors().iter().map(|r| r.0.len()).sum::<usize>()
        };
        match self {
            Self::Polygon(p) => polygon_coords(p),
            Self::MultiPolygon(mp) => mp.0.iter().map(polygon_coords).sum(),
        }
    }
}

impl From<&AreaGeometry> for geo::Geometry<f64> {
    fn from(value: &AreaGeometry) -> Self {
        match value {
            AreaGeometry::Polygon(p) => Self::Polygon(p.clone()),
            AreaGeometry::MultiPolygon(mp) => Self::MultiPolygon(mp.clone()),
        }
    }
}

/// Converts a bounding box to a rectangle, or `None` if it is inverted.
#[must_use]
pub fn bbox_rect(bbox: &BoundingBox) -> Option<Rect<f64>> {
    if bbox.west > bbox.east || bbox.south > bbox.north {
        return None;
    }
    Some(Rect::new(
        geo::coord! { x: bbox.west, y: bbox.south },
        geo::coord! { x: bbox.east, y: bbox.north },
    ))
}

/// A geometry envelope stored in the R-tree with its position in the
/// owning collection.
struct IndexEntry {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Envelope index over a fixed collection of geometries.
///
/// Built once per dataset and never mutated. Lookups return candidate
/// positions whose envelope overlaps the query; callers run the exact
/// intersection test.
pub struct SpatialIndex {
    tree: RTree<IndexEntry>,
}

impl SpatialIndex {
    /// Bulk-loads the envelopes of `geometries`, keyed by their position.
    ///
    /// Empty geometries have no envelope and are never returned.
    pub fn build<'a>(geometries: impl IntoIterator<Item = &'a AreaGeometry>) -> Self {
        let entries: Vec<IndexEntry> = geometries
            .into_iter()
            .enumerate()
            .filter_map(|(position, geometry)| {
                geometry.bounding_rect().map(|rect| IndexEntry {
                    position,
                    envelope: rect_envelope(&rect),
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed geometries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Positions whose envelope overlaps `rect`, in ascending order.
    #[must_use]
    pub fn candidates(&self, rect: &Rect<f64>) -> Vec<usize> {
        let mut positions: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&rect_envelope(rect))
            .map(|entry| entry.position)
            .collect();
        positions.sort_unstable();
        positions
    }
}

fn rect_envelope(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

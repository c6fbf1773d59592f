//! Topology-preserving polygon simplification.
//!
//! Each ring is reduced with Douglas-Peucker, then the result is checked
//! with OGC validity rules. An invalid result is retried at half the
//! tolerance; if no attempt is valid the input is returned unchanged, so
//! the output never has more vertices than the input and is valid whenever
//! the input is.

use geo::{LineString, MultiPolygon, Polygon, Simplify, Validation};

use crate::AreaGeometry;

/// Zoom levels below this use the coarse tolerance.
pub const DETAIL_ZOOM: i32 = 10;

/// Tolerance in degrees for zooms below [`DETAIL_ZOOM`].
pub const COARSE_TOLERANCE: f64 = 0.001;

/// Tolerance in degrees for zooms at or above [`DETAIL_ZOOM`].
pub const FINE_TOLERANCE: f64 = 0.0003;

/// Number of halvings tried before giving up and keeping the input.
const MAX_ATTEMPTS: usize = 4;

/// Picks the simplification tolerance for a map zoom level.
#[must_use]
pub const fn tolerance_for_zoom(zoom: i32) -> f64 {
    if zoom < DETAIL_ZOOM {
        COARSE_TOLERANCE
    } else {
        FINE_TOLERANCE
    }
}

/// Simplifies `geometry` at `tolerance` without breaking validity.
#[must_use]
pub fn simplify_preserving_topology(geometry: &AreaGeometry, tolerance: f64) -> AreaGeometry {
    match geometry {
        AreaGeometry::Polygon(p) => {
            let parts = MultiPolygon(vec![p.clone()]);
            let mut simplified = simplify_parts(&parts, tolerance);
            AreaGeometry::Polygon(simplified.0.swap_remove(0))
        }
        AreaGeometry::MultiPolygon(mp) => AreaGeometry::MultiPolygon(simplify_parts(mp, tolerance)),
    }
}

fn simplify_parts(parts: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    if tolerance.is_nan() || tolerance <= 0.0 {
        return parts.clone();
    }

    let mut epsilon = tolerance;
    for _ in 0..MAX_ATTEMPTS {
        let candidate = MultiPolygon(
            parts
                .0
                .iter()
                .map(|polygon| simplify_polygon(polygon, epsilon))
                .collect(),
        );
        if candidate.is_valid() {
            return candidate;
        }
        log::trace!("Simplification at {epsilon} broke topology, retrying");
        epsilon /= 2.0;
    }

    parts.clone()
}

fn simplify_polygon(polygon: &Polygon<f64>, epsilon: f64) -> Polygon<f64> {
    Polygon::new(
        simplify_ring(polygon.exterior(), epsilon),
        polygon
            .interiors()
            .iter()
            .map(|ring| simplify_ring(ring, epsilon))
            .collect(),
    )
}

/// Keeps the ring unchanged when reduction would leave fewer than four
/// coordinates (a closed triangle).
fn simplify_ring(ring: &LineString<f64>, epsilon: f64) -> LineString<f64> {
    let reduced = ring.simplify(epsilon);
    if reduced.0.len() < 4 {
        ring.clone()
    } else {
        reduced
    }
}

//! Viewport queries against the cached risk dataset.

use std::sync::Arc;

use accident_risk_models::Viewport;
use accident_risk_spatial::codec::{FeatureParts, encode_feature_collection};
use accident_risk_spatial::simplify::{simplify_preserving_topology, tolerance_for_zoom};
use accident_risk_spatial::{AreaGeometry, bbox_rect};
use geojson::FeatureCollection;

use crate::RiskDataset;
use crate::cache::{CacheError, RiskCache};

/// Renders the segments intersecting `viewport` as a `FeatureCollection`,
/// with geometry simplified for the viewport's zoom.
///
/// Features keep source order and use the source row position as id. An
/// inverted viewport yields an empty collection.
#[must_use]
pub fn render_viewport(dataset: &RiskDataset, viewport: &Viewport) -> FeatureCollection {
    let Some(rect) = bbox_rect(&viewport.bbox()) else {
        log::debug!("Inverted viewport {viewport:?}, returning no features");
        return encode_feature_collection(std::iter::empty());
    };
    let tolerance = tolerance_for_zoom(viewport.zoom);

    let hits: Vec<(&crate::SegmentRecord, AreaGeometry)> = dataset
        .intersecting(&rect)
        .map(|record| {
            let geometry = simplify_preserving_topology(&record.geometry, tolerance);
            (record, geometry)
        })
        .collect();

    log::debug!(
        "Viewport {viewport:?} matched {} of {} segments (tolerance {tolerance})",
        hits.len(),
        dataset.len()
    );

    encode_feature_collection(hits.iter().map(|(record, geometry)| FeatureParts {
        id: record.row.to_string(),
        geometry,
        properties: record.properties(),
    }))
}

/// Answers viewport queries from the shared [`RiskCache`].
#[derive(Debug, Clone)]
pub struct ViewportQueryEngine {
    cache: Arc<RiskCache>,
}

impl ViewportQueryEngine {
    /// Creates an engine that reads datasets from `cache`.
    #[must_use]
    pub const fn new(cache: Arc<RiskCache>) -> Self {
        Self { cache }
    }

    /// Underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<RiskCache> {
        &self.cache
    }

    /// Fetches the current dataset, recomputing it if stale, and renders
    /// `viewport` against it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if no dataset can be served.
    pub async fn query(&self, viewport: &Viewport) -> Result<FeatureCollection, CacheError> {
        let dataset = self.cache.get().await?;
        Ok(render_viewport(&dataset, viewport))
    }
}

#[cfg(test)]
mod tests {
    use accident_risk_models::TimeFeatures;
    use accident_risk_spatial::codec::decode_wkt;
    use chrono::{DateTime, FixedOffset};

    use crate::SegmentRecord;
    use crate::cache::{CacheConfig, Clock, DatasetLoader};
    use crate::materializer::MaterializeError;
    use crate::source::Cell;

    use super::*;

    const TIME: TimeFeatures = TimeFeatures {
        hour: 18,
        weekday: 4,
    };

    fn record(row: usize, grid_id: &str, wkt: &str, risk: f64) -> SegmentRecord {
        SegmentRecord {
            row,
            grid_id: grid_id.to_string(),
            attributes: vec![("speed_limit".to_string(), Cell::Number(60.0))],
            time: TIME,
            predicted_risk: risk,
            geometry: decode_wkt(wkt).unwrap(),
        }
    }

    fn dataset() -> RiskDataset {
        RiskDataset::new(
            vec![
                // Entirely inside the test viewport.
                record(0, "inside", "POLYGON ((0.2 0.2, 0.4 0.2, 0.4 0.4, 0.2 0.4, 0.2 0.2))", 0.5),
                // Far outside.
                record(1, "outside", "POLYGON ((5 5, 6 5, 6 6, 5 6, 5 5))", 0.9),
                // Shares only the viewport's east edge.
                record(2, "touching", "POLYGON ((1 0.5, 2 0.5, 2 0.8, 1 0.8, 1 0.5))", 0.7),
                // Bounding box overlaps the viewport corner, polygon does not.
                record(
                    3,
                    "near-miss",
                    "POLYGON ((1.5 0.5, 1.5 -0.5, 0.9 -0.5, 1.5 0.5))",
                    0.4,
                ),
            ],
            TIME,
        )
    }

    fn viewport(zoom: i32) -> Viewport {
        Viewport {
            min_lat: 0.0,
            min_lng: 0.0,
            max_lat: 1.0,
            max_lng: 1.0,
            zoom,
        }
    }

    fn ids(collection: &FeatureCollection) -> Vec<String> {
        collection
            .features
            .iter()
            .map(|f| match &f.id {
                Some(geojson::feature::Id::String(id)) => id.clone(),
                other => panic!("unexpected id {other:?}"),
            })
            .collect()
    }

    #[test]
    fn returns_intersecting_segments_in_source_order() {
        let collection = render_viewport(&dataset(), &viewport(12));
        assert_eq!(ids(&collection), vec!["0", "2"]);

        let properties = collection.features[1].properties.as_ref().unwrap();
        assert_eq!(properties["grid_id"], "touching");
        assert_eq!(properties["hour"], 18);
        assert_eq!(properties["weekday"], 4);
        assert_eq!(properties["predicted_risk"], 0.7);
        assert_eq!(properties["speed_limit"], 60.0);
    }

    #[test]
    fn disjoint_and_inverted_viewports_are_empty() {
        let far = Viewport {
            min_lat: -50.0,
            min_lng: -50.0,
            max_lat: -40.0,
            max_lng: -40.0,
            zoom: 5,
        };
        assert!(render_viewport(&dataset(), &far).features.is_empty());

        let inverted = Viewport {
            min_lat: 1.0,
            max_lat: 0.0,
            ..viewport(5)
        };
        assert!(render_viewport(&dataset(), &inverted).features.is_empty());
    }

    #[test]
    fn simplification_never_adds_vertices() {
        let data = dataset();
        for zoom in [3, 9, 10, 16] {
            let collection = render_viewport(&data, &viewport(zoom));
            for feature in &collection.features {
                let geometry = feature.geometry.as_ref().unwrap();
                let geojson::Value::Polygon(rings) = &geometry.value else {
                    panic!("expected polygon");
                };
                assert!(rings[0].len() <= 5);
                assert!(rings[0].len() >= 4);
            }
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<FixedOffset> {
            DateTime::parse_from_rfc3339("2024-03-08T18:30:00+00:00").unwrap()
        }
    }

    struct FixtureLoader;

    #[async_trait::async_trait]
    impl DatasetLoader for FixtureLoader {
        async fn load(&self, _now: DateTime<FixedOffset>) -> Result<RiskDataset, MaterializeError> {
            Ok(dataset())
        }
    }

    #[tokio::test]
    async fn engine_queries_through_cache() {
        let cache = Arc::new(RiskCache::new(
            Arc::new(FixtureLoader),
            Arc::new(FixedClock),
            CacheConfig::default(),
        ));
        let engine = ViewportQueryEngine::new(cache.clone());

        let first = engine.query(&viewport(12)).await.unwrap();
        let second = engine.query(&viewport(4)).await.unwrap();

        assert_eq!(ids(&first), ids(&second));
        assert_eq!(cache.recompute_count(), 1);

        let json = serde_json::to_value(&first).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"][0]["geometry"]["type"], "Polygon");
    }
}

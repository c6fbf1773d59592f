//! Sample road network used by the segment overview and scenario views.

use accident_risk_models::{
    ClimateConditions, ClimateRisk, DayType, PredictionInput, RoadSegment,
};
use serde::Serialize;

use crate::predict_risk;

/// `(road_id, lat, lng, curve_radius, slope, lanes, speed_limit, junctions)`
const SAMPLE_ROADS: &[(&str, f64, f64, f64, f64, u32, u32, u32)] = &[
    ("NH48_101", 12.9716, 77.5946, 35.0, 12.0, 2, 80, 4),
    ("NH48_102", 12.9656, 77.6046, 120.0, 3.0, 4, 60, 2),
    ("NH48_103", 12.9786, 77.5846, 25.0, 15.0, 2, 100, 5),
    ("MG_ROAD_01", 12.9756, 77.6106, 200.0, 2.0, 6, 50, 6),
    ("OUTER_RING_01", 12.9516, 77.6446, 80.0, 5.0, 4, 80, 3),
    ("OUTER_RING_02", 12.9616, 77.6346, 45.0, 8.0, 4, 70, 4),
    ("SARJAPUR_01", 12.9116, 77.6846, 60.0, 6.0, 2, 60, 5),
    ("WHITEFIELD_01", 12.9696, 77.7496, 100.0, 4.0, 4, 60, 3),
    ("ELECTRONIC_CITY_01", 12.8396, 77.6776, 150.0, 2.0, 6, 80, 2),
    ("HEBBAL_FLY_01", 13.0356, 77.5946, 40.0, 10.0, 4, 60, 4),
];

/// Returns the bundled sample road network.
#[must_use]
pub fn sample_road_segments() -> Vec<RoadSegment> {
    SAMPLE_ROADS
        .iter()
        .map(
            |&(road_id, latitude, longitude, curve_radius, road_slope, num_lanes, speed_limit, junction_density)| {
                RoadSegment {
                    road_id: road_id.to_string(),
                    latitude,
                    longitude,
                    curve_radius,
                    road_slope,
                    num_lanes,
                    speed_limit,
                    junction_density,
                }
            },
        )
        .collect()
}

/// A road segment annotated with its rule-based risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentWithRisk {
    /// The scored segment.
    pub segment: RoadSegment,
    /// Rounded risk score in `[0, 1]`.
    pub risk_score: f64,
    /// Bucketed risk level.
    pub climate_risk: ClimateRisk,
    /// Top contributing factors.
    pub top_factors: Vec<String>,
}

/// Scores every segment of `segments` under one set of conditions.
#[must_use]
pub fn segments_with_risk(
    segments: &[RoadSegment],
    climate: &ClimateConditions,
    hour: i32,
    day_type: DayType,
) -> Vec<SegmentWithRisk> {
    segments
        .iter()
        .map(|segment| {
            let prediction = predict_risk(&PredictionInput {
                segment: segment.clone(),
                climate: *climate,
                hour,
                day_type,
            });
            SegmentWithRisk {
                segment: segment.clone(),
                risk_score: prediction.risk_score,
                climate_risk: prediction.climate_risk,
                top_factors: prediction.top_factors,
            }
        })
        .collect()
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the accident risk server.
//!
//! These types are serialized to JSON for the REST API. They are kept apart
//! from the pipeline types so the API contract can evolve independently.

use accident_risk_models::{ClimateConditions, ClimateRisk, Viewport, WeatherType};
use serde::{Deserialize, Serialize};

/// A request parameter was missing or could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidQueryInput {
    /// A required parameter is absent.
    #[error("Missing required parameter: {0}")]
    Missing(&'static str),

    /// A parameter is present but not a finite number of the right kind.
    #[error("Invalid value for parameter {name}: '{value}'")]
    Invalid {
        /// Parameter name.
        name: &'static str,
        /// Raw value as received.
        value: String,
    },
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str, InvalidQueryInput> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(InvalidQueryInput::Missing(name))
}

fn parse_coordinate(name: &'static str, value: Option<&str>) -> Result<f64, InvalidQueryInput> {
    let raw = required(name, value)?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| InvalidQueryInput::Invalid {
            name,
            value: raw.to_string(),
        })
}

/// Query parameters for the hotspots endpoint.
///
/// Every field is kept as raw text so that missing and malformed values
/// can be reported with the parameter name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotQueryParams {
    /// Southern edge latitude.
    pub min_lat: Option<String>,
    /// Western edge longitude.
    pub min_lng: Option<String>,
    /// Northern edge latitude.
    pub max_lat: Option<String>,
    /// Eastern edge longitude.
    pub max_lng: Option<String>,
    /// Integer map zoom.
    pub zoom: Option<String>,
}

impl TryFrom<&HotspotQueryParams> for Viewport {
    type Error = InvalidQueryInput;

    fn try_from(params: &HotspotQueryParams) -> Result<Self, Self::Error> {
        let min_lat = parse_coordinate("minLat", params.min_lat.as_deref())?;
        let min_lng = parse_coordinate("minLng", params.min_lng.as_deref())?;
        let max_lat = parse_coordinate("maxLat", params.max_lat.as_deref())?;
        let max_lng = parse_coordinate("maxLng", params.max_lng.as_deref())?;

        let raw_zoom = required("zoom", params.zoom.as_deref())?;
        let zoom = raw_zoom
            .parse::<i32>()
            .map_err(|_| InvalidQueryInput::Invalid {
                name: "zoom",
                value: raw_zoom.to_string(),
            })?;

        Ok(Self {
            min_lat,
            min_lng,
            max_lat,
            max_lng,
            zoom,
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
}

impl ApiError {
    /// Wraps a human-readable error message.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Query parameters for the road segments endpoint. Unset fields fall back
/// to clear daytime conditions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoadSegmentsQueryParams {
    pub weather_type: Option<WeatherType>,
    pub rain_intensity: Option<f64>,
    pub visibility: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub hour: Option<i32>,
}

impl RoadSegmentsQueryParams {
    /// Hour used when none is given.
    pub const DEFAULT_HOUR: i32 = 12;

    /// Climate conditions with defaults applied.
    #[must_use]
    pub fn climate(&self) -> ClimateConditions {
        let defaults = ClimateConditions::default();
        ClimateConditions {
            weather_type: self.weather_type.unwrap_or(defaults.weather_type),
            rain_intensity: self.rain_intensity.unwrap_or(defaults.rain_intensity),
            visibility: self.visibility.unwrap_or(defaults.visibility),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            humidity: self.humidity.unwrap_or(defaults.humidity),
            wind_speed: self.wind_speed.unwrap_or(defaults.wind_speed),
        }
    }

    /// Hour with the default applied.
    #[must_use]
    pub fn hour(&self) -> i32 {
        self.hour.unwrap_or(Self::DEFAULT_HOUR)
    }
}

/// Point location of a sample road segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ApiLocation {
    pub lat: f64,
    pub lng: f64,
}

/// Static road attributes of a sample segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiRoadProperties {
    pub curve_radius: f64,
    pub road_slope: f64,
    pub num_lanes: u32,
    pub speed_limit: u32,
    pub junction_density: u32,
}

/// Rule-based assessment of a sample segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiRiskAssessment {
    pub risk_score: f64,
    pub climate_risk: ClimateRisk,
    pub top_factors: Vec<String>,
}

/// A scored sample road segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiRoadSegment {
    pub road_id: String,
    pub location: ApiLocation,
    pub road_properties: ApiRoadProperties,
    pub risk_assessment: ApiRiskAssessment,
}

/// Response from the road segments endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadSegmentsResponse {
    /// Number of segments returned.
    pub total: usize,
    /// Conditions the segments were scored under.
    pub climate_conditions: ClimateConditions,
    /// Hour the segments were scored at.
    pub hour: i32,
    pub segments: Vec<ApiRoadSegment>,
}

/// Body of the climate scenario endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioRequest {
    /// Conditions to compare against.
    pub base_climate: ClimateConditions,
    /// Conditions being simulated.
    pub scenario_climate: ClimateConditions,
    /// Hour of day for both runs.
    pub hour: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(min_lat: &str, min_lng: &str, max_lat: &str, max_lng: &str, zoom: &str) -> HotspotQueryParams {
        HotspotQueryParams {
            min_lat: Some(min_lat.to_string()),
            min_lng: Some(min_lng.to_string()),
            max_lat: Some(max_lat.to_string()),
            max_lng: Some(max_lng.to_string()),
            zoom: Some(zoom.to_string()),
        }
    }

    #[test]
    fn parses_viewport() {
        let viewport = Viewport::try_from(&params("12.9", "77.5", "13.1", "77.7", "11")).unwrap();
        assert_eq!(
            viewport,
            Viewport {
                min_lat: 12.9,
                min_lng: 77.5,
                max_lat: 13.1,
                max_lng: 77.7,
                zoom: 11,
            }
        );
    }

    #[test]
    fn reports_missing_and_invalid_parameters() {
        let mut missing = params("0", "0", "1", "1", "5");
        missing.max_lng = None;
        assert_eq!(
            Viewport::try_from(&missing),
            Err(InvalidQueryInput::Missing("maxLng"))
        );

        assert_eq!(
            Viewport::try_from(&params("abc", "0", "1", "1", "5")),
            Err(InvalidQueryInput::Invalid {
                name: "minLat",
                value: "abc".to_string()
            })
        );
        assert!(Viewport::try_from(&params("NaN", "0", "1", "1", "5")).is_err());
        assert!(Viewport::try_from(&params("0", "inf", "1", "1", "5")).is_err());
        assert!(Viewport::try_from(&params("0", "0", "1", "1", "5.5")).is_err());
    }

    #[test]
    fn inverted_viewport_is_accepted() {
        assert!(Viewport::try_from(&params("1", "0", "0", "1", "5")).is_ok());
    }

    #[test]
    fn road_segment_params_fall_back_to_defaults() {
        let params = RoadSegmentsQueryParams {
            weather_type: Some(WeatherType::Fog),
            ..RoadSegmentsQueryParams::default()
        };
        let climate = params.climate();
        assert_eq!(climate.weather_type, WeatherType::Fog);
        assert!((climate.visibility - 1000.0).abs() < f64::EPSILON);
        assert_eq!(params.hour(), 12);
    }

    #[test]
    fn deserializes_scenario_request() {
        let request: ScenarioRequest = serde_json::from_str(
            r#"{
                "base_climate": {"weather_type": "clear", "rain_intensity": 0, "visibility": 1000,
                                 "temperature": 25, "humidity": 60, "wind_speed": 10},
                "scenario_climate": {"weather_type": "storm", "rain_intensity": 8, "visibility": 150,
                                     "temperature": 22, "humidity": 95, "wind_speed": 45},
                "hour": 18
            }"#,
        )
        .unwrap();
        assert_eq!(request.scenario_climate.weather_type, WeatherType::Storm);
        assert_eq!(request.hour, 18);
    }
}

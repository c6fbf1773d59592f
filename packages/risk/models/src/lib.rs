#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Shared road segment, climate, and viewport types for the accident risk
//! map.
//!
//! These types are used by the rule-based scorer, the hotspot pipeline, and
//! the server's API layer. They carry no behavior beyond small constructors
//! and conversions.

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// A box covering the whole lon/lat plane.
    #[must_use]
    pub const fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }
}

/// A map viewport: the visible rectangle plus the map zoom level.
///
/// Inverted rectangles (`min > max`) are accepted as-is and simply match
/// nothing downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Minimum latitude.
    pub min_lat: f64,
    /// Minimum longitude.
    pub min_lng: f64,
    /// Maximum latitude.
    pub max_lat: f64,
    /// Maximum longitude.
    pub max_lng: f64,
    /// Map zoom level.
    pub zoom: i32,
}

impl Viewport {
    /// Returns the viewport's rectangle as a [`BoundingBox`].
    #[must_use]
    pub const fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.min_lng, self.min_lat, self.max_lng, self.max_lat)
    }
}

/// Time-of-day features shared by every segment in one materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFeatures {
    /// Hour of day, 0-23.
    pub hour: u32,
    /// Day of week, Monday = 0 through Sunday = 6.
    pub weekday: u32,
}

impl TimeFeatures {
    /// Derives the features from a clock reading in its own time zone.
    #[must_use]
    pub fn at<Tz: TimeZone>(time: &DateTime<Tz>) -> Self {
        Self {
            hour: time.hour(),
            weekday: time.weekday().num_days_from_monday(),
        }
    }
}

/// Prevailing weather.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WeatherType {
    /// No precipitation.
    #[default]
    Clear,
    /// Rainfall.
    Rain,
    /// Fog.
    Fog,
    /// Storm.
    Storm,
}

impl WeatherType {
    /// Base contribution of this weather to the climate risk index.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Clear => 0.0,
            Self::Rain => 0.3,
            Self::Fog => 0.4,
            Self::Storm => 0.5,
        }
    }
}

/// Whether the prediction is for a working day or a weekend.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DayType {
    /// Monday through Friday.
    #[default]
    Weekday,
    /// Saturday or Sunday.
    Weekend,
}

/// Coarse risk level bucket for a score in `[0, 1]`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum ClimateRisk {
    /// Score below 0.25.
    Low,
    /// Score in `[0.25, 0.5)`.
    Medium,
    /// Score in `[0.5, 0.75)`.
    High,
    /// Score of 0.75 or more.
    Critical,
}

impl ClimateRisk {
    /// Buckets a normalized risk score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            Self::Critical
        } else if score >= 0.5 {
            Self::High
        } else if score >= 0.25 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Live climate conditions used by the rule-based scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateConditions {
    /// Prevailing weather.
    pub weather_type: WeatherType,
    /// Rain intensity, 0-10.
    pub rain_intensity: f64,
    /// Visibility in metres.
    pub visibility: f64,
    /// Air temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
    /// Wind speed in km/h.
    pub wind_speed: f64,
}

impl Default for ClimateConditions {
    fn default() -> Self {
        Self {
            weather_type: WeatherType::Clear,
            rain_intensity: 0.0,
            visibility: 1000.0,
            temperature: 25.0,
            humidity: 60.0,
            wind_speed: 10.0,
        }
    }
}

/// Static geometry of a road segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadSegment {
    /// Stable road identifier.
    pub road_id: String,
    /// Segment latitude.
    #[serde(default)]
    pub latitude: f64,
    /// Segment longitude.
    #[serde(default)]
    pub longitude: f64,
    /// Curve radius in metres.
    pub curve_radius: f64,
    /// Road slope in percent.
    pub road_slope: f64,
    /// Number of lanes.
    pub num_lanes: u32,
    /// Posted speed limit in km/h.
    pub speed_limit: u32,
    /// Junctions per kilometre.
    pub junction_density: u32,
}

/// Full input to the rule-based scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    /// Road geometry.
    #[serde(flatten)]
    pub segment: RoadSegment,
    /// Climate conditions.
    #[serde(flatten)]
    pub climate: ClimateConditions,
    /// Hour of day. Out-of-range values are clamped by the scorer.
    pub hour: i32,
    /// Working day or weekend.
    #[serde(default)]
    pub day_type: DayType,
}

impl PredictionInput {
    /// Field names a JSON request body must carry.
    pub const REQUIRED_FIELDS: &[&str] = &[
        "road_id",
        "curve_radius",
        "road_slope",
        "num_lanes",
        "speed_limit",
        "junction_density",
        "hour",
        "weather_type",
        "rain_intensity",
        "visibility",
        "temperature",
        "humidity",
        "wind_speed",
    ];
}

/// Output of the rule-based scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPrediction {
    /// Road identifier echoed from the input.
    pub road_id: String,
    /// Risk score in `[0, 1]`, rounded to two decimals.
    pub risk_score: f64,
    /// Bucketed risk level.
    pub climate_risk: ClimateRisk,
    /// Up to five contributing factors, in evaluation order.
    pub top_factors: Vec<String>,
    /// Up to four driver recommendations.
    pub recommendations: Vec<String>,
}

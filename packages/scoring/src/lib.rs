#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Rule-based accident risk scoring for single road segments.
//!
//! [`predict_risk`] is a pure function of road geometry, time of day, and
//! live climate conditions. It does not use the trained hotspot model; it
//! is the fast path behind `POST /predict-risk` and the sample road network
//! views in [`roads`] and [`scenario`].

pub mod roads;
pub mod scenario;

use accident_risk_models::{ClimateConditions, ClimateRisk, PredictionInput, RiskPrediction};
use strum_macros::{AsRefStr, Display};

/// Maximum number of factors reported per prediction.
const MAX_FACTORS: usize = 5;

/// Maximum number of recommendations reported per prediction.
const MAX_RECOMMENDATIONS: usize = 4;

/// A condition that raised (or explains) a segment's risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum RiskFactor {
    #[strum(serialize = "Night Time")]
    NightTime,
    #[strum(serialize = "Peak Hour Traffic")]
    PeakHour,
    #[strum(serialize = "Sharp Curve")]
    SharpCurve,
    #[strum(serialize = "High Speed Zone")]
    HighSpeedZone,
    #[strum(serialize = "Steep Slope")]
    SteepSlope,
    #[strum(serialize = "Narrow Road")]
    NarrowRoad,
    #[strum(serialize = "High Junction Density")]
    HighJunctionDensity,
    #[strum(serialize = "Heavy Rain")]
    HeavyRain,
    #[strum(serialize = "Dense Fog")]
    DenseFog,
    #[strum(serialize = "Storm Conditions")]
    Storm,
    #[strum(serialize = "Low Visibility")]
    LowVisibility,
    #[strum(serialize = "Wet Road Surface")]
    WetRoad,
    #[strum(serialize = "Extreme Temperature")]
    ExtremeTemperature,
    #[strum(serialize = "High Wind Risk")]
    HighWind,
}

const fn is_night(hour: i32) -> bool {
    hour >= 20 || hour <= 6
}

const fn is_peak_hour(hour: i32) -> bool {
    matches!(hour, 7..=10 | 17..=20)
}

/// Clamps climate and time inputs into their physical ranges.
#[must_use]
pub fn sanitize(input: &PredictionInput) -> PredictionInput {
    let mut out = input.clone();
    let climate = &mut out.climate;
    climate.rain_intensity = climate.rain_intensity.clamp(0.0, 10.0);
    climate.visibility = climate.visibility.max(0.0);
    climate.humidity = climate.humidity.clamp(0.0, 100.0);
    climate.wind_speed = climate.wind_speed.max(0.0);
    climate.temperature = climate.temperature.clamp(-10.0, 55.0);
    out.hour = out.hour.clamp(0, 23);
    out
}

/// Computes the climate risk index in `[0, 1]`.
///
/// Weather type sets the base; rain intensity, reduced visibility, wind, and
/// very high humidity each add a bounded share.
#[must_use]
pub fn climate_risk_index(climate: &ClimateConditions) -> f64 {
    let mut index = climate.weather_type.weight();
    index += (climate.rain_intensity / 10.0) * 0.2;
    index += ((500.0 - climate.visibility) / 500.0).max(0.0) * 0.15;
    index += (climate.wind_speed / 50.0).min(1.0) * 0.1;
    if climate.humidity > 80.0 {
        index += 0.05;
    }
    index.min(1.0)
}

/// Scores a single road segment under the given conditions.
#[must_use]
pub fn predict_risk(raw: &PredictionInput) -> RiskPrediction {
    let input = sanitize(raw);
    let segment = &input.segment;
    let climate = &input.climate;

    let mut factors = Vec::new();
    let mut score = 0.0;

    if is_night(input.hour) {
        score += 0.15;
        factors.push(RiskFactor::NightTime);
    }
    if is_peak_hour(input.hour) {
        score += 0.1;
        factors.push(RiskFactor::PeakHour);
    }

    if segment.curve_radius < 50.0 {
        score += 0.2;
        factors.push(RiskFactor::SharpCurve);
    }
    if segment.speed_limit >= 80 {
        score += 0.1;
        factors.push(RiskFactor::HighSpeedZone);
    }
    if segment.road_slope > 8.0 {
        score += 0.1;
        factors.push(RiskFactor::SteepSlope);
    }
    if segment.num_lanes <= 2 {
        score += 0.05;
        factors.push(RiskFactor::NarrowRoad);
    }
    if segment.junction_density > 3 {
        score += 0.1;
        factors.push(RiskFactor::HighJunctionDensity);
    }

    score += climate_risk_index(climate) * 0.4;

    match climate.weather_type {
        accident_risk_models::WeatherType::Rain => factors.push(RiskFactor::HeavyRain),
        accident_risk_models::WeatherType::Fog => factors.push(RiskFactor::DenseFog),
        accident_risk_models::WeatherType::Storm => factors.push(RiskFactor::Storm),
        accident_risk_models::WeatherType::Clear => {}
    }
    if climate.visibility < 200.0 {
        factors.push(RiskFactor::LowVisibility);
    }
    if climate.rain_intensity > 2.0 {
        factors.push(RiskFactor::WetRoad);
    }
    if climate.temperature < 5.0 || climate.temperature > 40.0 {
        factors.push(RiskFactor::ExtremeTemperature);
    }
    if climate.wind_speed > 30.0 {
        factors.push(RiskFactor::HighWind);
    }

    let score = score.clamp(0.0, 1.0);
    let recommendations = recommendations(&factors, score);

    RiskPrediction {
        road_id: segment.road_id.clone(),
        risk_score: round2(score),
        climate_risk: ClimateRisk::from_score(score),
        top_factors: factors
            .iter()
            .take(MAX_FACTORS)
            .map(ToString::to_string)
            .collect(),
        recommendations,
    }
}

fn recommendations(factors: &[RiskFactor], score: f64) -> Vec<String> {
    let has = |f: RiskFactor| factors.contains(&f);
    let mut out = Vec::new();

    if has(RiskFactor::HeavyRain) || has(RiskFactor::WetRoad) {
        out.push("Reduce speed by 20% due to wet conditions");
    }
    if has(RiskFactor::LowVisibility) || has(RiskFactor::DenseFog) {
        out.push("Use fog lights and maintain safe distance");
    }
    if has(RiskFactor::SharpCurve) {
        out.push("Approach curves at reduced speed");
    }
    if has(RiskFactor::NightTime) {
        out.push("Ensure proper headlight usage");
    }
    if has(RiskFactor::HighWind) {
        out.push("Two-wheelers and high-profile vehicles use caution");
    }
    if score >= 0.75 {
        out.push("Consider alternate route if possible");
    }

    out.into_iter()
        .take(MAX_RECOMMENDATIONS)
        .map(str::to_string)
        .collect()
}

/// Rounds to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

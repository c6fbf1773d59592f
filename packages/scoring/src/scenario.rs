//! Climate scenario comparison over a road network.

use accident_risk_models::{ClimateConditions, ClimateRisk, DayType, RoadSegment};
use serde::Serialize;

use crate::roads::{SegmentWithRisk, segments_with_risk};
use crate::round2;

/// Percent risk increase above which escalation measures are recommended.
const ESCALATION_THRESHOLD_PERCENT: f64 = 20.0;

/// Network-wide summary for one set of climate conditions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSummary {
    /// The conditions that were scored.
    pub climate: ClimateConditions,
    /// Mean segment risk, rounded to two decimals.
    pub average_risk: f64,
    /// Segments in the critical bucket.
    pub critical_zones: usize,
    /// Segments in the high bucket.
    pub high_risk_zones: usize,
}

/// Difference between the base and scenario summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactAnalysis {
    /// Relative change in average risk, rounded to one decimal.
    pub risk_change_percent: f64,
    /// Change in the number of critical segments.
    pub additional_critical_zones: i64,
    /// Change in the number of high-risk segments.
    pub additional_high_risk_zones: i64,
    /// Estimated accident reduction if alerts are issued, e.g. `"12%"`.
    pub estimated_accident_reduction_with_alerts: String,
}

/// Full scenario comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioComparison {
    /// Summary under the base conditions.
    pub base_conditions: ConditionSummary,
    /// Summary under the scenario conditions.
    pub scenario_conditions: ConditionSummary,
    /// Computed impact.
    pub impact_analysis: ImpactAnalysis,
    /// Operational recommendations for the scenario.
    pub policy_recommendations: Vec<String>,
}

#[allow(clippy::cast_precision_loss)]
fn summarize(climate: ClimateConditions, scored: &[SegmentWithRisk]) -> (f64, ConditionSummary) {
    let count = |level: ClimateRisk| scored.iter().filter(|s| s.climate_risk == level).count();
    let average = if scored.is_empty() {
        0.0
    } else {
        scored.iter().map(|s| s.risk_score).sum::<f64>() / scored.len() as f64
    };

    (
        average,
        ConditionSummary {
            climate,
            average_risk: round2(average),
            critical_zones: count(ClimateRisk::Critical),
            high_risk_zones: count(ClimateRisk::High),
        },
    )
}

/// Compares network risk between two sets of climate conditions.
///
/// A zero base average yields a 0% change rather than an infinite one.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn compare(
    segments: &[RoadSegment],
    base: &ClimateConditions,
    scenario: &ClimateConditions,
    hour: i32,
) -> ScenarioComparison {
    let base_scored = segments_with_risk(segments, base, hour, DayType::Weekday);
    let scenario_scored = segments_with_risk(segments, scenario, hour, DayType::Weekday);

    let (base_avg, base_summary) = summarize(*base, &base_scored);
    let (scenario_avg, scenario_summary) = summarize(*scenario, &scenario_scored);

    let risk_change = if base_avg > 0.0 {
        (scenario_avg - base_avg) / base_avg * 100.0
    } else {
        0.0
    };
    let estimated_reduction = (risk_change.abs() * 0.5).min(30.0);

    let policy_recommendations = if risk_change > ESCALATION_THRESHOLD_PERCENT {
        vec![
            "Issue public weather advisory",
            "Increase traffic patrol in critical zones",
            "Activate variable message signs",
            "Consider speed limit reduction on high-risk segments",
        ]
    } else {
        vec!["Monitor conditions", "Standard patrol deployment"]
    };

    let impact_analysis = ImpactAnalysis {
        risk_change_percent: (risk_change * 10.0).round() / 10.0,
        additional_critical_zones: scenario_summary.critical_zones as i64
            - base_summary.critical_zones as i64,
        additional_high_risk_zones: scenario_summary.high_risk_zones as i64
            - base_summary.high_risk_zones as i64,
        estimated_accident_reduction_with_alerts: format!("{}%", estimated_reduction.round()),
    };

    ScenarioComparison {
        base_conditions: base_summary,
        scenario_conditions: scenario_summary,
        impact_analysis,
        policy_recommendations: policy_recommendations
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use accident_risk_models::WeatherType;

    use super::*;
    use crate::roads::sample_road_segments;

    #[test]
    fn identical_conditions_have_no_impact() {
        let roads = sample_road_segments();
        let climate = ClimateConditions::default();
        let result = compare(&roads, &climate, &climate, 12);

        assert!(result.impact_analysis.risk_change_percent.abs() < f64::EPSILON);
        assert_eq!(result.impact_analysis.additional_critical_zones, 0);
        assert_eq!(
            result.impact_analysis.estimated_accident_reduction_with_alerts,
            "0%"
        );
        assert_eq!(
            result.policy_recommendations,
            vec!["Monitor conditions", "Standard patrol deployment"]
        );
    }

    #[test]
    fn storm_scenario_escalates() {
        let roads = sample_road_segments();
        let storm = ClimateConditions {
            weather_type: WeatherType::Storm,
            rain_intensity: 9.0,
            visibility: 100.0,
            temperature: 22.0,
            humidity: 92.0,
            wind_speed: 55.0,
        };
        let result = compare(&roads, &ClimateConditions::default(), &storm, 12);

        assert!(result.impact_analysis.risk_change_percent > 20.0);
        assert!(result.scenario_conditions.average_risk > result.base_conditions.average_risk);
        assert_eq!(result.policy_recommendations.len(), 4);
        assert_eq!(
            result.impact_analysis.estimated_accident_reduction_with_alerts,
            "30%"
        );
    }

    #[test]
    fn empty_network_is_flat() {
        let climate = ClimateConditions::default();
        let result = compare(&[], &climate, &climate, 12);
        assert!(result.base_conditions.average_risk.abs() < f64::EPSILON);
        assert!(result.impact_analysis.risk_change_percent.abs() < f64::EPSILON);
    }
}

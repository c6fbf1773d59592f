//! HTTP handler functions for the accident risk API.

use accident_risk_hotspots::cache::CacheError;
use accident_risk_models::{DayType, PredictionInput, Viewport};
use accident_risk_scoring::roads::{sample_road_segments, segments_with_risk};
use accident_risk_scoring::scenario::compare;
use accident_risk_server_models::{
    ApiError, ApiHealth, ApiLocation, ApiRiskAssessment, ApiRoadProperties, ApiRoadSegment,
    HotspotQueryParams, RoadSegmentsQueryParams, RoadSegmentsResponse, ScenarioRequest,
};
use actix_web::{HttpResponse, web};

use crate::AppState;

/// `GET /health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /hotspots`
///
/// Returns the high-risk segments intersecting the viewport as a `GeoJSON`
/// `FeatureCollection`, simplified for the requested zoom.
pub async fn hotspots(
    state: web::Data<AppState>,
    params: web::Query<HotspotQueryParams>,
) -> HttpResponse {
    let viewport = match Viewport::try_from(&*params) {
        Ok(viewport) => viewport,
        Err(e) => {
            log::debug!("Rejected hotspots query: {e}");
            return HttpResponse::BadRequest().json(ApiError::new(e.to_string()));
        }
    };

    match state.hotspots.query(&viewport).await {
        Ok(collection) => HttpResponse::Ok().json(collection),
        Err(e) => {
            log::error!("Failed to query hotspots: {e}");
            let message = match e {
                CacheError::Timeout { .. } => "Hotspot data is still being computed",
                CacheError::Recompute(_) | CacheError::Backoff { .. } => {
                    "Failed to compute hotspot data"
                }
            };
            HttpResponse::InternalServerError().json(ApiError::new(message))
        }
    }
}

/// `POST /predict-risk`
///
/// Scores one road segment under the given conditions with the rule-based
/// scorer.
pub async fn predict_risk(body: web::Json<serde_json::Value>) -> HttpResponse {
    let body = body.into_inner();

    if let Some(field) = PredictionInput::REQUIRED_FIELDS
        .iter()
        .find(|field| body.get(**field).is_none())
    {
        return HttpResponse::BadRequest()
            .json(ApiError::new(format!("Missing required field: {field}")));
    }

    match serde_json::from_value::<PredictionInput>(body) {
        Ok(input) => HttpResponse::Ok().json(accident_risk_scoring::predict_risk(&input)),
        Err(e) => {
            log::debug!("Rejected prediction input: {e}");
            HttpResponse::BadRequest().json(ApiError::new(format!("Invalid prediction input: {e}")))
        }
    }
}

/// `GET /road-segments`
///
/// Scores the bundled sample road network under the query's conditions.
pub async fn road_segments(params: web::Query<RoadSegmentsQueryParams>) -> HttpResponse {
    let climate = params.climate();
    let hour = params.hour();

    let segments: Vec<ApiRoadSegment> = segments_with_risk(
        &sample_road_segments(),
        &climate,
        hour,
        DayType::Weekday,
    )
    .into_iter()
    .map(|scored| ApiRoadSegment {
        road_id: scored.segment.road_id,
        location: ApiLocation {
            lat: scored.segment.latitude,
            lng: scored.segment.longitude,
        },
        road_properties: ApiRoadProperties {
            curve_radius: scored.segment.curve_radius,
            road_slope: scored.segment.road_slope,
            num_lanes: scored.segment.num_lanes,
            speed_limit: scored.segment.speed_limit,
            junction_density: scored.segment.junction_density,
        },
        risk_assessment: ApiRiskAssessment {
            risk_score: scored.risk_score,
            climate_risk: scored.climate_risk,
            top_factors: scored.top_factors,
        },
    })
    .collect();

    HttpResponse::Ok().json(RoadSegmentsResponse {
        total: segments.len(),
        climate_conditions: climate,
        hour,
        segments,
    })
}

/// `POST /climate-scenario`
///
/// Compares network-wide risk between base and scenario conditions.
pub async fn climate_scenario(body: web::Json<ScenarioRequest>) -> HttpResponse {
    let request = body.into_inner();
    HttpResponse::Ok().json(compare(
        &sample_road_segments(),
        &request.base_climate,
        &request.scenario_climate,
        request.hour,
    ))
}

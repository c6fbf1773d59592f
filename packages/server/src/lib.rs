#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the accident risk map.
//!
//! Serves `GeoJSON` hotspots for map viewports from a periodically
//! recomputed, model-scored segment dataset, plus the rule-based segment
//! scoring endpoints.

pub mod config;
mod handlers;
pub mod interactive;

use std::sync::Arc;

use accident_risk_hotspots::cache::{RiskCache, SystemClock};
use accident_risk_hotspots::materializer::FeatureMaterializer;
use accident_risk_hotspots::model::{ArtifactError, LabelEncoder, LinearRiskModel};
use accident_risk_hotspots::query::ViewportQueryEngine;
use accident_risk_hotspots::source::CsvFeatureSource;
use accident_risk_server_models::ApiError;
use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, error, middleware, web};

use crate::config::{ConfigError, ServerConfig};

/// Shared application state.
pub struct AppState {
    /// Viewport queries over the cached hotspot dataset.
    pub hotspots: ViewportQueryEngine,
}

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Bad environment configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The model or encoder artifact could not be loaded.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl AppState {
    /// Loads the model and encoder and wires the hotspot pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if an artifact cannot be loaded.
    pub fn from_config(config: &ServerConfig) -> Result<Self, StartupError> {
        log::info!("Loading risk model from {}", config.model_path.display());
        let model = LinearRiskModel::load(&config.model_path)?;
        log::info!("Loading grid encoder from {}", config.encoder_path.display());
        let encoder = LabelEncoder::load(&config.encoder_path)?;

        let materializer = FeatureMaterializer::new(
            Arc::new(CsvFeatureSource::new(&config.feature_table_path)),
            Arc::new(model),
            Arc::new(encoder),
        )
        .with_min_risk(config.min_risk);

        let cache = RiskCache::new(Arc::new(materializer), Arc::new(SystemClock), config.cache);

        Ok(Self {
            hotspots: ViewportQueryEngine::new(Arc::new(cache)),
        })
    }
}

/// Registers the API routes and the JSON error handlers for malformed
/// request bodies and query strings.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let body = ApiError::new(err.to_string());
        error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let body = ApiError::new(err.to_string());
        error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    }))
    .route("/health", web::get().to(handlers::health))
    .route("/hotspots", web::get().to(handlers::hotspots))
    .route("/predict-risk", web::post().to(handlers::predict_risk))
    .route("/road-segments", web::get().to(handlers::road_segments))
    .route("/climate-scenario", web::post().to(handlers::climate_scenario));
}

/// Starts the accident risk API server.
///
/// Reads [`ServerConfig`] from the environment, loads the model and
/// encoder artifacts, optionally warms the hotspot cache in the background,
/// and starts the Actix-Web HTTP server. The caller provides the async
/// runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the configuration or artifacts are
/// invalid, or if the HTTP server fails to bind or encounters a runtime
/// error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env().map_err(std::io::Error::other)?;
    log::debug!("Server configuration: {config:?}");

    let state = AppState::from_config(&config).map_err(|e| {
        log::error!("Failed to start: {e}");
        std::io::Error::other(e)
    })?;

    if config.warm_cache {
        let cache = state.hotspots.cache().clone();
        actix_web::rt::spawn(async move {
            log::info!("Warming hotspot cache...");
            if let Err(e) = cache.get().await {
                log::error!("Failed to warm hotspot cache: {e}");
            }
        });
    }

    let state = web::Data::new(state);
    let ServerConfig {
        bind_addr, port, ..
    } = config;

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use traffic_signal_backend::config::{load_engine_params, ServerConfig};
use traffic_signal_backend::engine::DecisionEngine;
use traffic_signal_backend::fallback::fallback_decision;
use traffic_signal_backend::maps::MapsAdapter;
use traffic_signal_backend::models::{
    ControlMode, DecisionRequest, DecisionResponse, LaneDirection,
};
use traffic_signal_backend::unix_now;

// ---------- Server state ----------

#[derive(Clone)]
struct AppState {
    engine: Arc<DecisionEngine>,
    maps: Arc<MapsAdapter>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn bad_request(message: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.to_string() })),
    )
}

// ---------- Handlers ----------

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "Traffic Signal Optimizer",
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "decision_engine": "ready",
        "endpoints": {
            "decision": "/api/decision",
            "health": "/health",
        },
    }))
}

/// Main decision endpoint: validate the snapshot, enrich it with downstream
/// data, run the engine and answer with the decision plus its reason trace.
/// Engine failures degrade to the fixed-time fallback rather than a 5xx.
async fn make_decision(
    State(state): State<AppState>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    tracing::info!("decision request, mode {:?}", request.control_mode);

    if request.control_mode != ControlMode::Ai {
        return Err(bad_request("Backend only processes AI mode requests"));
    }

    let mut intersection = request.intersection_state;
    if intersection.lanes.is_empty() {
        return Err(bad_request("No lane data provided"));
    }
    intersection.validate().map_err(|e| bad_request(e))?;

    for (direction, lane) in &intersection.lanes {
        tracing::info!(
            "lane {}: cars={}, speed={:.1} km/h, wait={:.1}s",
            direction,
            lane.vision.vehicle_count_by_type.car,
            lane.vision.avg_speed,
            lane.wait_time
        );
    }

    // TODO: take the live condition from the frontend payload once it sends one.
    let weather = "Clear Sky";
    for (direction, lane) in intersection.lanes.iter_mut() {
        let downstream = state.maps.downstream_traffic(*direction, Some(weather));
        tracing::info!(
            "downstream {}: speed={:.1} km/h, congestion={:.2}",
            direction,
            downstream.avg_speed,
            downstream.congestion_index
        );
        lane.downstream = Some(downstream);
    }

    let mut rng = StdRng::from_entropy();
    let response = match state.engine.decide(&intersection.lanes, &mut rng) {
        Ok(decision) => {
            tracing::info!(
                "decision: {} for {:.1}s (confidence {:.2})",
                decision.selected_lane,
                decision.green_duration,
                decision.decision_confidence
            );
            tracing::info!("reason: {:?}", decision.reason_trace);
            DecisionResponse {
                decision,
                fallback_mode: false,
                error_message: None,
            }
        }
        Err(e) => {
            tracing::error!("decision engine error: {e}");
            DecisionResponse {
                decision: fallback_decision(&intersection, unix_now()),
                fallback_mode: true,
                error_message: Some(format!("Error: {e}. Using fallback logic.")),
            }
        }
    };

    Ok(Json(response))
}

async fn traffic_summary(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "timestamp": unix_now(),
        "traffic": state.maps.traffic_summary(),
    }))
}

#[derive(Deserialize)]
struct AccidentParams {
    lane: String,
    #[serde(default = "default_accident_minutes")]
    duration_minutes: u32,
}

fn default_accident_minutes() -> u32 {
    30
}

async fn trigger_accident(
    State(state): State<AppState>,
    Query(params): Query<AccidentParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lane: LaneDirection = params.lane.parse().map_err(|e| bad_request(e))?;
    state.maps.trigger_accident(lane, params.duration_minutes);
    tracing::info!(
        "accident triggered on {} for {} minutes",
        lane,
        params.duration_minutes
    );

    Ok(Json(json!({
        "status": "success",
        "message": format!("Accident triggered on downstream of {lane} lane"),
        "duration_minutes": params.duration_minutes,
    })))
}

async fn clear_accidents(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.maps.clear_accidents();
    tracing::info!("all accidents cleared");
    Json(json!({
        "status": "success",
        "message": "All accidents cleared",
    }))
}

// ---------- Entry point ----------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();
    let params = load_engine_params()?;
    tracing::info!("engine params: {params:?}");

    let state = AppState {
        engine: Arc::new(DecisionEngine::new(params)),
        maps: Arc::new(MapsAdapter::new()),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/decision", post(make_decision))
        .route("/api/traffic/summary", get(traffic_summary))
        .route("/api/traffic/accident", post(trigger_accident))
        .route("/api/traffic/clear-accidents", post(clear_accidents))
        .with_state(state);

    tracing::info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

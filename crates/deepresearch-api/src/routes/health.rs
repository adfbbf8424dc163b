use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::{AppState, ResearchStatus};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    available_run_slots: usize,
}

#[derive(Serialize)]
pub(super) struct ServiceInfo {
    name: &'static str,
    version: &'static str,
    api: &'static str,
}

pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/research/status", get(research_status))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        available_run_slots: state.available_permits(),
    })
}

async fn research_status(State(state): State<AppState>) -> Json<ResearchStatus> {
    Json(state.status().clone())
}

pub(super) async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "DeepResearch API",
        version: env!("CARGO_PKG_VERSION"),
        api: super::API_PREFIX,
    })
}

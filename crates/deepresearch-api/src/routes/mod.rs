mod health;
mod research;

use axum::{Router, http::HeaderValue, routing::get};
use health::{health_router, service_info};
use research::research_router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use research::{ResearchRequest, SseStream};

/// Prefix shared by every versioned endpoint.
pub const API_PREFIX: &str = "/api/v1";

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.cors_origins());
    let api = Router::new().merge(health_router()).merge(research_router());
    Router::new()
        .route("/", get(service_info))
        .nest(API_PREFIX, api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

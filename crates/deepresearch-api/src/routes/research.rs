use std::convert::Infallible;
use std::pin::Pin;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderName, header},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::post,
};
use deepresearch_core::{EventSink, ResearchEvent, validate_task};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::state::AppState;

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
}

pub fn research_router() -> Router<AppState> {
    Router::new().route("/research", post(start_research))
}

/// Validate the task, reserve a run slot, and stream the run's events as SSE.
///
/// The run owns the slot; if the client disconnects the run stops at the next
/// stage boundary and the slot is released.
#[instrument(skip_all)]
async fn start_research(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let task = validate_task(&payload.query)?;
    let permit = state.acquire_run_permit()?;

    let (sink, receiver) = EventSink::channel();
    let workflow = state.workflow();
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(err) = workflow.run(&task, &sink).await {
            warn!(error = %err, "research run ended with error");
        }
    });
    info!("research run accepted");

    let stream: SseStream =
        Box::pin(UnboundedReceiverStream::new(receiver).map(|event| Ok(to_sse(&event))));

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::new()),
    ))
}

fn to_sse(event: &ResearchEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.kind.as_str()).data(data)
}

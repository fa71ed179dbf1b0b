// Intake endpoint handlers

use async_stream::stream;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;

use super::error::IntakeError;
use super::ServerState;
use crate::notify::{JOB_ACCEPTED, JOB_COMPLETED};
use crate::pipeline::{Job, JobRequest};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ACCEPTED_MESSAGE: &str =
    "Hardening started in background. You will receive result via callback.";

fn authorized(state: &ServerState, headers: &HeaderMap, request: &JobRequest) -> bool {
    let Some(expected) = state.api_key.as_deref() else {
        return true;
    };
    let supplied = request
        .api_key
        .as_deref()
        .or_else(|| headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()));
    supplied == Some(expected)
}

/// `POST /harden`
pub async fn submit_job(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, IntakeError> {
    let request: JobRequest = serde_json::from_slice(&body)?;
    if !authorized(&state, &headers, &request) {
        log::warn!("rejected job request with a bad api key");
        return Err(IntakeError::Unauthorized);
    }

    let job = Job::new(&request)?;
    let id = job.id().to_string();
    let job_id = state.orchestrator.submit(job);

    state.events.emit(JOB_ACCEPTED, json!({ "job_id": job_id, "id": id }));
    let body = json!({
        "status": "accepted",
        "job_id": job_id,
        "id": id,
        "message": ACCEPTED_MESSAGE,
    });
    Ok((StatusCode::ACCEPTED, Json(body)))
}

/// `POST /job-completed`: relay a downstream completion notice to listeners
pub async fn job_completed(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    log::info!("relaying job_completed event");
    state.events.emit(JOB_COMPLETED, body);
    Json(json!({ "status": "ok" }))
}

/// `GET /events`: the event bus as server-sent events
pub async fn events(State(state): State<ServerState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    let stream = stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event.event.clone()).data(data));
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("event subscriber lagged by {}", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `GET /` and every unknown route
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        format!("404 not found - {}", env!("CARGO_PKG_VERSION")),
    )
}

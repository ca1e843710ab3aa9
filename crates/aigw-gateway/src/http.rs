//! Axum front door: `/v1/chat`, `/v1/chat/stream` (SSE), `/v1/models`,
//! `/healthz`, `/stats`, `/admin/circuit-breaker/{provider}/reset`. Grounded
//! on the teacher's `core.rs` (`Router` built over a shared `Arc<State>`) and
//! `handler.rs` (per-request `trace_id`, structured `tracing` events at
//! request start/end).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{error, info};

use aigw_common::{GatewayError, ProviderId, TraceId};
use aigw_orchestrator::{Orchestrator, RoutingCriteria};
use aigw_provider_core::Request;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    retryable: bool,
    provider: Option<ProviderId>,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retryable: err.retryable(),
            provider: err.provider(),
        }
    }
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err.code() {
        "INVALID_REQUEST" => StatusCode::BAD_REQUEST,
        "AUTHENTICATION" => StatusCode::UNAUTHORIZED,
        "QUOTA" | "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
        "MODEL_NOT_AVAILABLE" => StatusCode::NOT_FOUND,
        "SHUTDOWN" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(trace_id: TraceId, err: GatewayError) -> AxumResponse {
    error!(
        event = "request_failed",
        trace_id = %trace_id,
        code = err.code(),
        provider = ?err.provider(),
        retryable = err.retryable(),
        "request failed"
    );
    (status_for(&err), Json(ErrorBody::from(&err))).into_response()
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/v1/chat", post(chat))
        .route("/v1/chat/stream", post(chat_stream))
        .route("/v1/models", get(models))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .route("/admin/circuit-breaker/{provider}/reset", post(reset_breaker))
        .with_state(orchestrator)
}

async fn chat(State(orchestrator): State<Arc<Orchestrator>>, Json(request): Json<Request>) -> AxumResponse {
    let trace_id = TraceId::new();
    let started = Instant::now();
    info!(event = "downstream_received", trace_id = %trace_id, op = "chat");

    match orchestrator.execute_request(request, RoutingCriteria::default()).await {
        Ok(outcome) => {
            info!(
                event = "downstream_responded",
                trace_id = %trace_id,
                provider = %outcome.provider,
                attempts = outcome.attempts,
                cache_hit = outcome.cache_hit,
                elapsed_ms = started.elapsed().as_millis() as u64,
            );
            Json(outcome.response).into_response()
        }
        Err(err) => error_response(trace_id, err),
    }
}

async fn chat_stream(State(orchestrator): State<Arc<Orchestrator>>, Json(mut request): Json<Request>) -> AxumResponse {
    let trace_id = TraceId::new();
    info!(event = "downstream_received", trace_id = %trace_id, op = "chat_stream");
    request.stream = true;

    let stream = match orchestrator.execute_stream_request(request, RoutingCriteria::default()).await {
        Ok(stream) => stream,
        Err(err) => return error_response(trace_id, err),
    };

    let events = stream.map(|item| -> Result<Event, std::convert::Infallible> {
        match item {
            Ok(chunk) => Ok(Event::default().json_data(chunk).unwrap_or_else(|_| Event::default().data("{}"))),
            Err(err) => Ok(Event::default()
                .event("error")
                .json_data(ErrorBody::from(&err))
                .unwrap_or_else(|_| Event::default().data("{}"))),
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

async fn models(State(orchestrator): State<Arc<Orchestrator>>) -> AxumResponse {
    Json(orchestrator.get_models()).into_response()
}

async fn healthz(State(orchestrator): State<Arc<Orchestrator>>) -> AxumResponse {
    let health = orchestrator.get_health_status();
    let status = if health.values().any(|healthy| *healthy) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}

async fn stats(State(orchestrator): State<Arc<Orchestrator>>) -> AxumResponse {
    Json(orchestrator.get_stats()).into_response()
}

async fn reset_breaker(State(orchestrator): State<Arc<Orchestrator>>, Path(provider): Path<String>) -> AxumResponse {
    let trace_id = TraceId::new();
    let provider = match ProviderId::from_str(&provider) {
        Ok(p) => p,
        Err(_) => return error_response(trace_id, GatewayError::invalid_request(format!("unknown provider {provider}"))),
    };
    match orchestrator.reset_circuit_breaker(provider) {
        Ok(()) => {
            info!(event = "circuit_breaker_reset", trace_id = %trace_id, provider = %provider);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => error_response(trace_id, err),
    }
}

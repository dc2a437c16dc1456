// HTTP route handlers for the judge service

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use codecraft_common::types::{ExecutionRequest, Language, Mode, ProblemId, Verdict};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;
use crate::scheduler::{AdmissionError, CancelOutcome, JobLookup};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub source_code: String,
    /// Parsed here rather than by serde so an unknown name gets a clear error.
    pub language: String,
    pub problem_id: ProblemId,
    pub mode: Mode,
    pub requester_id: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub request_id: String,
}

#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub name: Language,
    pub version: String,
    pub memory_limit_mb: u64,
    pub cpu_time_limit_ms: u64,
    pub wall_time_limit_ms: u64,
}

fn error_response(status: StatusCode, kind: &str, message: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": kind,
            "message": message.to_string(),
        })),
    )
        .into_response()
}

fn admission_status(e: &AdmissionError) -> StatusCode {
    match e {
        AdmissionError::Busy { .. } | AdmissionError::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AdmissionError::RequesterLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
        AdmissionError::UnsupportedLanguage(_) | AdmissionError::InvalidRequest(_) => {
            StatusCode::BAD_REQUEST
        }
    }
}

fn parse_request_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw).map_err(|_| {
        error_response(StatusCode::BAD_REQUEST, "invalid_request", "Invalid request ID format")
    })
}

/// Redacted verdict with its terminal phase (`completed` or `failed`).
fn verdict_response(id: &Uuid, verdict: &Verdict) -> Response {
    let body = serde_json::to_value(verdict.redacted()).and_then(|mut body| {
        if let (Some(fields), serde_json::Value::Object(phase)) =
            (body.as_object_mut(), serde_json::to_value(verdict.phase())?)
        {
            fields.extend(phase);
        }
        Ok(body)
    });

    match body {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            error!(request_id = %id, error = %e, "Failed to encode verdict");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to encode verdict",
            )
        }
    }
}

/// POST /execute - Admit a request for judging
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Response {
    let language = match payload.language.parse::<Language>() {
        Ok(language) => language,
        Err(e) => {
            let rejection = AdmissionError::from(e);
            metrics::ADMISSION_REJECTIONS
                .with_label_values(&[rejection.reason()])
                .inc();
            return error_response(StatusCode::BAD_REQUEST, rejection.reason(), rejection);
        }
    };

    let request = ExecutionRequest {
        source_code: payload.source_code,
        language,
        problem_id: payload.problem_id,
        mode: payload.mode,
        requester_id: payload.requester_id,
    };

    match state.scheduler.submit(request) {
        Ok(request_id) => (
            StatusCode::ACCEPTED,
            Json(ExecuteResponse {
                request_id: request_id.to_string(),
            }),
        )
            .into_response(),
        Err(e) => error_response(admission_status(&e), e.reason(), e),
    }
}

/// GET /result/{request_id} - Verdict, progress, or why there is none
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Response {
    let id = match parse_request_id(&request_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.scheduler.result(&id) {
        JobLookup::Done(verdict) => verdict_response(&id, &verdict),
        JobLookup::Pending(phase) => {
            let mut body = serde_json::to_value(phase).unwrap_or_default();
            if let Some(fields) = body.as_object_mut() {
                fields.insert("request_id".to_string(), id.to_string().into());
                fields.insert("status".to_string(), "pending".into());
            }
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
        JobLookup::Cancelled => {
            error_response(StatusCode::GONE, "cancelled", "Request was cancelled")
        }
        JobLookup::Expired => error_response(
            StatusCode::REQUEST_TIMEOUT,
            "expired",
            "Request waited in the queue past its deadline",
        ),
        // Evicted from memory; a submission may still be in the sink.
        JobLookup::NotFound => match state.sink.fetch(&id).await {
            Ok(Some(verdict)) => verdict_response(&id, &verdict),
            Ok(None) => error_response(StatusCode::NOT_FOUND, "not_found", "Unknown request ID"),
            Err(e) => {
                error!(request_id = %id, error = %e, "Failed to read persisted verdict");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Failed to query verdict store",
                )
            }
        },
    }
}

/// DELETE /result/{request_id} - Cancel a queued or running request
pub async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Response {
    let id = match parse_request_id(&request_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.scheduler.cancel(&id) {
        CancelOutcome::Cancelled => {
            info!(request_id = %id, "Cancellation requested");
            StatusCode::NO_CONTENT.into_response()
        }
        CancelOutcome::AlreadyFinished => error_response(
            StatusCode::CONFLICT,
            "already_finished",
            "Request has already finished",
        ),
        CancelOutcome::NotFound => {
            error_response(StatusCode::NOT_FOUND, "not_found", "Unknown request ID")
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "engine": state.engine,
            "scheduler": state.scheduler.stats(),
        })),
    )
}

/// GET /languages - Languages this deployment accepts
pub async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let languages: Vec<LanguageInfo> = state
        .languages
        .list_languages()
        .into_iter()
        .filter_map(|language| {
            let config = state.languages.get_config(&language).ok()?;
            Some(LanguageInfo {
                name: language,
                version: config.version.clone(),
                memory_limit_mb: config.memory_limit_mb,
                cpu_time_limit_ms: config.cpu_time_limit_ms,
                wall_time_limit_ms: config.wall_time_limit_ms,
            })
        })
        .collect();
    Json(languages)
}

/// GET /metrics - Prometheus exposition
pub async fn metrics_endpoint() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

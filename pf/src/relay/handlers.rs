use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::requests::{BlueprintRequest, ClarifyRequest, StagePayload, ValidJson};
use super::server::AppState;
use super::stream::{into_sse, spawn_relay};
use crate::llm::complete_json;
use crate::plan::{PlanError, parse_blueprint};
use crate::stage::StageKind;

const MAX_QUESTIONS: usize = 10;

/// Served when the model can't produce questions, so the UI can still move on
pub const FALLBACK_QUESTIONS: [&str; 4] = [
    "Who are the primary users of this system?",
    "What is the expected scale (users, requests, data volume)?",
    "Are there any existing systems this needs to integrate with?",
    "What are the most important constraints (budget, timeline, compliance)?",
];

fn internal_error(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": message.to_string() })),
    )
        .into_response()
}

pub async fn health() -> Json<serde_json::Value> {
    debug!("health: called");
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "features": ["clarify", "architecture", "database", "api-design", "blueprint", "streaming"],
    }))
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" }))).into_response()
}

pub async fn clarify(State(state): State<Arc<AppState>>, ValidJson(req): ValidJson<ClarifyRequest>) -> Response {
    debug!(prompt_len = req.prompt.len(), "clarify: called");
    let request = match state.stage_request(StageKind::Clarify, &req.prompt_context()) {
        Ok(request) => request,
        Err(e) => return internal_error(e),
    };

    match complete_json::<Vec<String>>(state.llm.as_ref(), request).await {
        Ok(questions) => {
            let questions: Vec<String> = questions
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .take(MAX_QUESTIONS)
                .collect();
            info!(count = questions.len(), "Generated clarifying questions");
            Json(json!({ "success": true, "questions": questions })).into_response()
        }
        Err(e) => {
            error!(status = ?e.status(), error = %e, "clarify: falling back to default questions");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": e.to_string(),
                    "questions": FALLBACK_QUESTIONS,
                })),
            )
                .into_response()
        }
    }
}

/// Any streaming stage: validate, then answer with an event stream
pub async fn stream_stage<R: StagePayload>(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<R>,
) -> Response {
    let stage = R::STAGE;
    debug!(%stage, "stream_stage: called");
    let request = match state.stage_request(stage, &req.prompt_context()) {
        Ok(request) => request,
        Err(e) => return internal_error(e),
    };

    let rx = spawn_relay(state.llm.clone(), request, stage);
    into_sse(rx).into_response()
}

/// Blueprint without streaming, parsed server-side
pub async fn blueprint_json(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<BlueprintRequest>,
) -> Response {
    debug!("blueprint_json: called");
    let request = match state.stage_request(StageKind::Blueprint, &req.prompt_context()) {
        Ok(request) => request,
        Err(e) => return internal_error(e),
    };

    let raw = match state.llm.complete(request).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "blueprint_json: model call failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Failed to generate blueprint",
                    "details": e.to_string(),
                    "raw": null,
                })),
            )
                .into_response();
        }
    };

    match parse_blueprint(&raw) {
        Ok(phases) => {
            info!(phase_count = phases.len(), "Generated blueprint");
            Json(json!({ "success": true, "phases": phases })).into_response()
        }
        Err(e @ (PlanError::Parse(_) | PlanError::NoPhases)) => {
            warn!(error = %e, "blueprint_json: unparseable blueprint");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Failed to parse blueprint",
                    "details": e.to_string(),
                    "raw": raw,
                })),
            )
                .into_response()
        }
        Err(e) => internal_error(e),
    }
}

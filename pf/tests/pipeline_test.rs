//! Integration tests for the full pipeline
//!
//! A scripted model endpoint sits behind a real relay on a local port; the
//! orchestrator talks to the relay over HTTP exactly as the CLI does.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use planforge::config::{LlmConfig, StagesConfig};
use planforge::events::{EventBus, PipelineEvent};
use planforge::llm::create_client;
use planforge::pipeline::{
    ErrorKind, HttpTransport, Orchestrator, StageReport, StageRequest, StageTransport, TransportError,
};
use planforge::present::render_stage;
use planforge::prompts::PromptLoader;
use planforge::relay::{AppState, ClarifyRequest, DatabaseRequest, serve_with};
use planforge::stage::StageKind;

const INTENT: &str = "Build a todo app with user accounts";

// =============================================================================
// Scripted model endpoint
// =============================================================================

enum Reply {
    /// Non-streaming answer
    Whole(String),
    /// Streamed answer, one delta per piece
    Pieces(Vec<String>),
    Fail(u16, String),
}

#[derive(Default)]
struct Script {
    replies: Mutex<VecDeque<Reply>>,
    bodies: Mutex<Vec<Value>>,
}

fn stream_body(pieces: &[String]) -> String {
    let mut body = String::new();
    for piece in pieces {
        let chunk = json!({ "choices": [{ "delta": { "content": piece } }] });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn chat_completions(State(script): State<Arc<Script>>, Json(body): Json<Value>) -> Response {
    script.bodies.lock().unwrap().push(body);
    let reply = script.replies.lock().unwrap().pop_front();
    match reply {
        Some(Reply::Whole(content)) => {
            Json(json!({ "choices": [{ "message": { "content": content } }] })).into_response()
        }
        Some(Reply::Pieces(pieces)) => {
            ([(header::CONTENT_TYPE, "text/event-stream")], stream_body(&pieces)).into_response()
        }
        Some(Reply::Fail(status, message)) => {
            (StatusCode::from_u16(status).unwrap(), message).into_response()
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "script exhausted").into_response(),
    }
}

async fn bind_local() -> (tokio::net::TcpListener, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Start a model endpoint and a relay in front of it; returns the relay URL
async fn start_stack(replies: Vec<Reply>) -> (String, Arc<Script>) {
    let script = Arc::new(Script {
        replies: Mutex::new(replies.into()),
        ..Default::default()
    });

    let (model_listener, model_url) = bind_local().await;
    let model = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(script.clone());
    tokio::spawn(async move {
        axum::serve(model_listener, model).await.unwrap();
    });

    let llm = create_client(&LlmConfig {
        base_url: model_url,
        ..Default::default()
    })
    .unwrap();
    let state = Arc::new(AppState::new(llm, PromptLoader::embedded_only(), StagesConfig::default()));
    let (relay_listener, relay_url) = bind_local().await;
    tokio::spawn(serve_with(relay_listener, state, std::future::pending()));

    (relay_url, script)
}

fn pieces(parts: &[&str]) -> Reply {
    Reply::Pieces(parts.iter().map(|p| p.to_string()).collect())
}

// =============================================================================
// End-to-end
// =============================================================================

#[tokio::test]
async fn test_full_pipeline_produces_plan() {
    let (relay_url, script) = start_stack(vec![
        Reply::Whole(
            "```json\n[\"Who are the users?\", \"Do you need offline support?\", \"Which platforms?\", \"Any deadline?\"]\n```"
                .to_string(),
        ),
        pieces(&[
            "## Overview\nA single service.\n\n```mer",
            "maid\ngraph TD\n  Client --> API\n  API --> DB\n```\n\nPostgres for storage.",
        ]),
        pieces(&["| table | purpose |\n|---|---|\n", "| users | accounts |\n| todos | items |"]),
        pieces(&["GET /todos\n", "POST /todos"]),
        pieces(&[
            "```json\n{\"phases\":[{\"name\":\"Foundation\",\"description\":\"Repo\",\"risk\":\"low\",",
            "\"steps\":[{\"title\":\"Scaffold\",\"description\":\"Create the workspace\"}],\"filesInvolved\":[\"Cargo.toml\"]},",
            "{\"name\":\"Accounts\",\"risk\":\"high\",\"steps\":[\"Add login. Then sessions.\"]}]}\n```",
        ]),
    ])
    .await;

    let bus = EventBus::new(1024);
    let mut rx = bus.subscribe();
    let orchestrator = Orchestrator::new(Arc::new(HttpTransport::new(&relay_url)), bus.emitter_for("e2e"));

    orchestrator.submit_intent(INTENT).await.unwrap();
    let clarify = orchestrator.run_stage(StageKind::Clarify).await.unwrap();
    assert!(clarify.is_completed());
    orchestrator.answer(0, "Small teams").await.unwrap();
    let reports = orchestrator.run_from(StageKind::Architecture).await.unwrap();

    assert_eq!(reports.len(), 4, "reports: {reports:?}");
    assert!(reports.iter().all(StageReport::is_completed), "reports: {reports:?}");

    let state = orchestrator.snapshot().await;
    assert_eq!(state.clarifications.len(), 4);
    assert_eq!(state.clarifications[0].answer.as_deref(), Some("Small teams"));

    let plan = state.plan.as_ref().unwrap();
    assert_eq!(plan.phases.len(), 2);
    assert_eq!(plan.phases[0].files_involved, vec!["Cargo.toml"]);
    assert_eq!(plan.phases[1].steps[0].title, "Add login");
    assert_eq!(plan.api.as_deref(), Some("GET /todos\nPOST /todos"));

    let architecture = &state.stream(StageKind::Architecture).unwrap().content;
    let rendered = render_stage(StageKind::Architecture, architecture);
    assert_eq!(rendered.diagram.as_deref(), Some("graph TD\n  Client --> API\n  API --> DB"));
    assert!(rendered.body.contains("Postgres for storage."));
    assert!(!rendered.body.contains("```"));

    // The architecture prompt carried the answered clarification
    let bodies = script.bodies.lock().unwrap();
    let architecture_prompt = bodies[1]["messages"][1]["content"].as_str().unwrap();
    assert!(architecture_prompt.contains("Small teams"));
    assert_eq!(bodies[0]["stream"], false);
    assert_eq!(bodies[1]["stream"], true);
    drop(bodies);

    let mut chunk_count = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, PipelineEvent::ChunkApplied { .. }) {
            chunk_count += 1;
        }
    }
    assert!(chunk_count >= 8);
}

#[tokio::test]
async fn test_upstream_failure_surfaces_as_gateway_error() {
    let (relay_url, _) = start_stack(vec![
        Reply::Whole("[\"Who are the users?\"]".to_string()),
        Reply::Fail(500, "overloaded".to_string()),
    ])
    .await;
    let orchestrator = Orchestrator::new(
        Arc::new(HttpTransport::new(&relay_url)),
        planforge::events::EventEmitter::detached("fail"),
    );
    orchestrator.submit_intent(INTENT).await.unwrap();

    let reports = orchestrator.run_all().await.unwrap();

    let StageReport::Failed { stage, kind, message } = reports.last().unwrap() else {
        panic!("expected failure, got {reports:?}");
    };
    assert_eq!(*stage, StageKind::Architecture);
    assert_eq!(*kind, ErrorKind::Gateway);
    assert!(message.contains("500") && message.contains("overloaded"), "message: {message}");

    let state = orchestrator.snapshot().await;
    assert!(!state.is_enabled(StageKind::Database));
    assert!(state.stream(StageKind::Clarify).unwrap().is_done());
}

#[tokio::test]
async fn test_unparseable_blueprint_end_to_end() {
    let (relay_url, _) = start_stack(vec![
        Reply::Whole("[]".to_string()),
        pieces(&["architecture notes"]),
        pieces(&["database notes"]),
        pieces(&["api design notes"]),
        pieces(&["I would start with the backend ", "and then build the frontend."]),
    ])
    .await;
    let orchestrator = Orchestrator::new(
        Arc::new(HttpTransport::new(&relay_url)),
        planforge::events::EventEmitter::detached("parse"),
    );
    orchestrator.submit_intent(INTENT).await.unwrap();

    let reports = orchestrator.run_all().await.unwrap();

    assert!(matches!(
        reports.last(),
        Some(StageReport::Failed {
            stage: StageKind::Blueprint,
            kind: ErrorKind::Parse,
            ..
        })
    ));
    let state = orchestrator.snapshot().await;
    assert!(state.plan.as_ref().unwrap().phases.is_empty());
    assert_eq!(
        state.stream(StageKind::Blueprint).unwrap().content,
        "I would start with the backend and then build the frontend."
    );
}

// =============================================================================
// Transport against the relay
// =============================================================================

#[tokio::test]
async fn test_clarify_over_http() {
    let (relay_url, _) = start_stack(vec![Reply::Whole(
        "[\"Who are the users?\", \"How many?\", \"Mobile?\", \"Budget?\"]".to_string(),
    )])
    .await;
    let transport = HttpTransport::new(&relay_url);

    let questions = transport
        .clarify(&ClarifyRequest {
            prompt: INTENT.to_string(),
        })
        .await
        .unwrap();

    assert!((4..=10).contains(&questions.len()));
}

#[tokio::test]
async fn test_short_field_is_validation_error() {
    let (relay_url, script) = start_stack(vec![]).await;
    let transport = HttpTransport::new(&relay_url);

    let result = transport
        .open(&StageRequest::Database(DatabaseRequest {
            intent: "short".to_string(),
            architecture: "a long enough architecture".to_string(),
        }))
        .await;

    let Err(TransportError::Validation(message)) = result else {
        panic!("expected validation error");
    };
    assert!(message.contains("intent"));
    assert!(script.bodies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_health_over_http() {
    let (relay_url, _) = start_stack(vec![]).await;

    let health = HttpTransport::new(&relay_url).health().await.unwrap();

    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}

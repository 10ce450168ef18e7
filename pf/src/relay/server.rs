//! Relay router and server lifecycle

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use eyre::{Context, Result};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::handlers;
use super::requests::{ApiDesignRequest, ArchitectureRequest, BlueprintRequest, DatabaseRequest};
use crate::config::{Config, StagesConfig};
use crate::llm::{CompletionRequest, LlmClient, create_client};
use crate::prompts::{PromptContext, PromptLoader};
use crate::stage::StageKind;

/// Shared, read-only state behind every handler
pub struct AppState {
    pub llm: Arc<dyn LlmClient>,
    pub prompts: PromptLoader,
    pub stages: StagesConfig,
}

impl AppState {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptLoader, stages: StagesConfig) -> Self {
        Self { llm, prompts, stages }
    }

    /// Render a stage's prompts and apply its sampling settings
    pub fn stage_request(&self, stage: StageKind, context: &PromptContext) -> Result<CompletionRequest> {
        debug!(%stage, "AppState::stage_request: called");
        let (system, user) = self.prompts.stage_prompts(stage, context)?;
        let settings = self.stages.for_stage(stage);

        let mut request = CompletionRequest::new(user).with_system(system);
        if let Some(temperature) = settings.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        Ok(request)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/clarify", post(handlers::clarify))
        .route("/api/architecture", post(handlers::stream_stage::<ArchitectureRequest>))
        .route("/api/database", post(handlers::stream_stage::<DatabaseRequest>))
        .route("/api/api-design", post(handlers::stream_stage::<ApiDesignRequest>))
        .route("/api/blueprint", post(handlers::stream_stage::<BlueprintRequest>))
        .route("/api/blueprint/json", post(handlers::blueprint_json))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves
pub async fn serve_with<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("Failed to read listener address")?;
    info!(%addr, "Relay listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Relay server failed")
}

/// Build the state from config and serve until Ctrl-C
pub async fn serve(config: &Config) -> Result<()> {
    debug!(bind = %config.server.bind, "serve: called");
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let root = std::env::current_dir().context("Failed to read current directory")?;
    let state = Arc::new(AppState::new(llm, PromptLoader::new(root), config.stages.clone()));

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .context(format!("Failed to bind {}", config.server.bind))?;
    info!(model = %config.llm.model, base_url = %config.llm.base_url, "Using model endpoint");

    serve_with(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await
}

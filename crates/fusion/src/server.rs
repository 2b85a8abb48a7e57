//! REST front-end
//!
//! Every request builds its own agent so conversation memory is never shared
//! between concurrent requests; the gateways behind it come from one registry.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use fusion_agent::{extract_final_answer, AgentLoop, ToolRegistry};
use fusion_config::AgentSettings;
use fusion_provider::LlmRegistry;

pub struct AppState {
    registry: LlmRegistry,
    agent: AgentSettings,
    /// False when the startup endpoint probe failed
    ready: bool,
}

impl AppState {
    pub fn new(registry: LlmRegistry, agent: AgentSettings, ready: bool) -> Self {
        Self {
            registry,
            agent,
            ready,
        }
    }

    fn build_agent(&self) -> anyhow::Result<AgentLoop> {
        let llm = self.registry.default_llm()?;
        let agent = AgentLoop::new(llm.clone(), llm, ToolRegistry::with_defaults())
            .with_settings(&self.agent)?;
        Ok(agent)
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub full_result: String,
    pub final_answer: Option<String>,
}

/// Error body in the `{"detail": ...}` shape
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/process", post(process_handler))
        .with_state(state)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "Fusion server is running. POST a query to /process." }))
}

async fn health_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "agent_initialized": state.ready,
    }))
}

async fn process_handler(
    State(state): State<SharedState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Empty query provided"));
    }
    if !state.ready {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Agent not initialized. Check server logs.",
        ));
    }

    let preview: String = query.chars().take(50).collect();
    info!("Processing request: {}...", preview);

    let mut agent = state.build_agent().map_err(|e| {
        error!("Error processing request with agent: {:#}", e);
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to process request: {:#}", e),
        )
    })?;

    let full_result = agent.run(query).await;
    let final_answer = extract_final_answer(&full_result).map(str::to_string);
    info!("Request processing completed");

    Ok(Json(ProcessResponse {
        full_result,
        final_answer,
    }))
}

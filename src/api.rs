//! REST API Server for the lookup orchestrator
//!
//! Exposes the orchestrator via HTTP endpoints.
//! Data-level outcomes (subject not found, source down) are 200 responses;
//! only control-level failures map to error statuses.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    pub user_id: String,
    pub user_request: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> serde_json::Result<Self> {
        Ok(Self {
            success: true,
            data: Some(serde_json::to_value(data)?),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Successful payload, or a 500 when it cannot be serialized
fn respond<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse>) {
    match ApiResponse::success(data) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(
                    OrchestrationError::SerializationError(e).to_string(),
                )),
            )
        }
    }
}

/// Control-level failures only; data-level errors never get here
fn status_for(err: &OrchestrationError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if err.is_synthesis_failure() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Source Listing
/// =============================

async fn list_sources(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let descriptors = state.orchestrator.registry().descriptors();
    respond(serde_json::json!({
        "sources": descriptors,
        "synthesizer": state.orchestrator.synthesizer_name(),
    }))
}

/// =============================
/// Main Query Endpoint
/// =============================

async fn run_query(
    State(state): State<ApiState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> (StatusCode, Json<ApiResponse>) {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!("Rejected query body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!(
                    "Malformed request: {}",
                    rejection.body_text()
                ))),
            );
        }
    };

    info!(
        user_id = %req.user_id,
        request = %req.user_request,
        "Received query"
    );

    match state.orchestrator.run(&req.user_id, &req.user_request).await {
        Ok(result) => respond(serde_json::json!({
            "output": result.output,
            "flow": result.visited,
            "invocation_id": result.invocation_id,
            "trace": result.reasoning_trace,
            "facts_digest": result.facts_digest,
            "execution_time_ms": result.execution_time_ms,
        })),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!(error = %e, "Query failed");
            } else {
                warn!(error = %e, "Query rejected");
            }
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/sources", get(list_sources))
        .route("/query", post(run_query))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

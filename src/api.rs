//! REST API server for the credit assistant
//!
//! Exposes the amortization engine statelessly and the assistant per session

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::Assistant;
use crate::amortization::{AmortizationEngine, SimulationFailure, SimulationRequest};
use crate::knowledge::KnowledgeBase;
use crate::llm::LanguageModel;
use crate::session::Session;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub answer: String,
    pub simulations: usize,
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
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
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

pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

struct SessionEntry {
    assistant: Arc<Mutex<Assistant>>,
    last_seen: DateTime<Utc>,
}

type SessionMap = HashMap<Uuid, SessionEntry>;

#[derive(Clone)]
pub struct ApiState {
    pub knowledge: Arc<KnowledgeBase>,
    pub model: Arc<dyn LanguageModel>,
    pub max_dialogue_turns: usize,
    /// Sessions idle longer than this are dropped when a new one is created
    pub session_ttl: Duration,
    sessions: Arc<RwLock<SessionMap>>,
}

impl ApiState {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        model: Arc<dyn LanguageModel>,
        max_dialogue_turns: usize,
    ) -> Self {
        Self {
            knowledge,
            model,
            max_dialogue_turns,
            session_ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Look up a session and mark it as active
    async fn existing_session(&self, session_id: Uuid) -> Option<Arc<Mutex<Assistant>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&session_id)?;
        entry.last_seen = Utc::now();
        Some(entry.assistant.clone())
    }

    async fn session_or_create(&self, session_id: Uuid) -> Arc<Mutex<Assistant>> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        if let Some(entry) = sessions.get_mut(&session_id) {
            entry.last_seen = now;
            return entry.assistant.clone();
        }

        let before = sessions.len();
        sessions.retain(|_, entry| now - entry.last_seen < self.session_ttl);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(pruned, remaining = sessions.len(), "Pruned idle chat sessions");
        }

        info!(%session_id, "Creating chat session");
        let assistant = Assistant::new(self.knowledge.clone(), self.model.clone())
            .with_session(Session::with_id(session_id))
            .with_max_dialogue_turns(self.max_dialogue_turns);
        let handle = Arc::new(Mutex::new(assistant));
        sessions.insert(
            session_id,
            SessionEntry {
                assistant: handle.clone(),
                last_seen: now,
            },
        );
        handle
    }
}

/// =============================
/// Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Client-chosen ids may be any string; non-UUIDs map to a stable UUID
fn parse_or_stable_uuid(value: &str) -> Uuid {
    let value = value.trim();
    Uuid::parse_str(value).unwrap_or_else(|_| stable_uuid_from_string(value))
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
/// Catalog + Simulation
/// =============================

async fn list_products(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(&state.knowledge.credit_products))
}

async fn simulate_handler(
    State(state): State<ApiState>,
    Json(req): Json<SimulationRequest>,
) -> Result<Json<ApiResponse>, (StatusCode, Json<SimulationFailure>)> {
    let engine = AmortizationEngine::new(&state.knowledge.credit_products);

    match engine.simulate(&req) {
        Ok(result) => {
            info!(
                product = %req.product_name,
                amount = req.amount,
                term = req.term,
                monthly_payment = result.monthly_payment,
                "Simulation served"
            );
            Ok(Json(ApiResponse::success(result)))
        }
        Err(e) => {
            warn!(product = %req.product_name, kind = ?e.kind(), "Simulation rejected: {}", e);
            Err((StatusCode::UNPROCESSABLE_ENTITY, Json(e.to_failure())))
        }
    }
}

/// =============================
/// Chat + Report
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("message must not be empty".to_string())),
        );
    }

    let session_id = match req.session_id.as_deref() {
        Some(id) if !id.trim().is_empty() => parse_or_stable_uuid(id),
        _ => Uuid::new_v4(),
    };

    let handle = state.session_or_create(session_id).await;
    let mut assistant = handle.lock().await;
    let answer = assistant.process_message(&req.message).await;

    let response = ChatResponse {
        session_id,
        answer,
        simulations: assistant.session().state.simulations.len(),
    };

    (StatusCode::OK, Json(ApiResponse::success(response)))
}

async fn report_handler(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let session_id = parse_or_stable_uuid(&id);

    let Some(handle) = state.existing_session(session_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("session '{}' not found", id))),
        )
            .into_response();
    };

    let assistant = handle.lock().await;
    match assistant.report().render() {
        Ok(deck) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            deck,
        )
            .into_response(),
        Err(e) => {
            error!(%session_id, "Report rendering failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
                .into_response()
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/products", get(list_products))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions/:id/report", get(report_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

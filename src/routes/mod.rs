//! API routes

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::capabilities::Playlist;
use crate::conversation::Conversation;
use crate::core::budget::{BudgetAlert, TokenUsageLedger, UsagePermit};
use crate::core::memory::{MemoryEntry, UserProfile, DEFAULT_MEMORY_LIMIT};
use crate::core::{AssistantRequest, AssistantResponse, EngineError, MemoryKind, ProfileUpdate};
use crate::AppState;

/// Failure envelope: `{success: false, error}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(resource: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{} not found", resource),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(message) => Self::bad_request(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn assistant(
    State(state): State<AppState>,
    request: Result<Json<AssistantRequest>, JsonRejection>,
) -> Result<Json<AssistantResponse>, ApiError> {
    let Json(request) = request?;
    let response = state.engine.handle(request).await?;
    Ok(Json(response))
}

// -------------------------------------------------------------------------
// Conversations
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateConversation {
    #[serde(default)]
    title: Option<String>,
}

async fn list_conversations(State(state): State<AppState>) -> Json<Vec<Conversation>> {
    Json(state.engine.memory().conversations().await)
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversation>,
) -> (StatusCode, Json<Conversation>) {
    let title = body
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Nueva conversación".to_string());
    let conversation = state.engine.memory().create_conversation(title).await;
    (StatusCode::CREATED, Json(conversation))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    state
        .engine
        .memory()
        .conversation(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Conversation"))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.engine.memory().delete_conversation(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Conversation"))
    }
}

// -------------------------------------------------------------------------
// Memory and profile
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MemoryQuery {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct NewMemory {
    kind: MemoryKind,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
}

async fn find_memories(
    State(state): State<AppState>,
    Query(params): Query<MemoryQuery>,
) -> Json<Vec<MemoryEntry>> {
    let query = params.query.unwrap_or_default();
    let limit = params.limit.unwrap_or(DEFAULT_MEMORY_LIMIT);
    Json(state.engine.memory().find_relevant_memories(&query, limit).await)
}

async fn save_memory(
    State(state): State<AppState>,
    Json(body): Json<NewMemory>,
) -> Result<(StatusCode, Json<MemoryEntry>), ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }
    let entry = state
        .engine
        .memory()
        .save_memory_entry(body.kind, body.content, body.tags)
        .await;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn clear_memories(State(state): State<AppState>) -> StatusCode {
    state.engine.memory().clear().await;
    state.engine.budget().reset_usage().await;
    StatusCode::NO_CONTENT
}

async fn get_profile(State(state): State<AppState>) -> Json<UserProfile> {
    Json(state.engine.memory().profile().await)
}

async fn update_profile(
    State(state): State<AppState>,
    Json(update): Json<ProfileUpdate>,
) -> Json<UserProfile> {
    Json(state.engine.memory().update_profile(update).await)
}

// -------------------------------------------------------------------------
// Usage and catalog
// -------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct UsageResponse {
    ledger: TokenUsageLedger,
    alert: Option<BudgetAlert>,
    permit: UsagePermit,
    days_until_reset: i64,
}

async fn usage(State(state): State<AppState>) -> Json<UsageResponse> {
    let ledger = state.engine.budget().ledger().await;
    Json(UsageResponse {
        alert: ledger.alert(),
        permit: ledger.permit(),
        days_until_reset: ledger.days_until_reset(Utc::now()),
        ledger,
    })
}

async fn playlists(State(state): State<AppState>) -> Result<Json<Vec<Playlist>>, ApiError> {
    state
        .engine
        .music()
        .playlists()
        .await
        .map(Json)
        .map_err(|e| ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/assistant", post(assistant))
        .route(
            "/v1/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/v1/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route(
            "/v1/memories",
            get(find_memories).post(save_memory).delete(clear_memories),
        )
        .route("/v1/profile", get(get_profile).put(update_profile))
        .route("/v1/usage", get(usage))
        .route("/v1/playlists", get(playlists))
}

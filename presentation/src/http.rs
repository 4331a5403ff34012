//! JSON-over-HTTP surface for the pipeline and refresh operations.

use application::rag_service::RagService;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use domain::models::{RecipeSuggestion, RefreshReport, RefreshStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::types::{Error, ErrorKind};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RagService>,
}

impl AppState {
    pub fn new(service: Arc<RagService>) -> Self {
        Self { service }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rag", post(rag))
        .route("/itemrag", post(item_rag))
        .route("/new_item_recipe_suggestions_query", post(recipe_suggestions))
        .route("/refresh", post(refresh))
        .with_state(state)
}

pub async fn serve(bind_addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "pantry_rag listening");
    axum::serve(listener, router(state)).await
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: Option<String>,
    userid: Option<String>,
}

impl QueryRequest {
    fn into_parts(self) -> Result<(String, String), ApiError> {
        match (non_blank(self.query), non_blank(self.userid)) {
            (Some(query), Some(user_id)) => Ok((query, user_id)),
            _ => Err(ApiError::missing("Missing required parameters: query and userid")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    userid: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnswerResponse<T> {
    answer: T,
}

#[derive(Debug, Serialize)]
struct SuggestionsResponse {
    suggestions: Vec<RecipeSuggestion>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Structured error body: `{"error": {"kind", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    fn missing(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::InvalidInput,
            message: message.into(),
        }
    }

    fn body(rejection: JsonRejection) -> Self {
        Self::missing(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::InvalidInput(_) | Error::Retrieval(_) => StatusCode::BAD_REQUEST,
            Error::IndexUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::GenerationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Generation(_) | Error::Parse(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = self.status.as_u16(), kind = self.kind.as_str(), reason = %self.message, "request failed");
        }
        (
            self.status,
            Json(json!({
                "error": {
                    "kind": self.kind,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn rag(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse<String>>, ApiError> {
    let Json(request) = body.map_err(ApiError::body)?;
    let (query, user_id) = request.into_parts()?;
    let answer = state.service.general_query(&user_id, &query).await?;
    Ok(Json(AnswerResponse { answer }))
}

async fn item_rag(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse<Vec<String>>>, ApiError> {
    let Json(request) = body.map_err(ApiError::body)?;
    let (query, user_id) = request.into_parts()?;
    let answer = state.service.recipe_names(&user_id, &query).await?;
    Ok(Json(AnswerResponse { answer }))
}

async fn recipe_suggestions(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let Json(request) = body.map_err(ApiError::body)?;
    let (query, user_id) = request.into_parts()?;
    let suggestions = state.service.recipe_suggestions(&user_id, &query).await?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RefreshReport>), ApiError> {
    let Json(request) = body.map_err(ApiError::body)?;
    let user_id =
        non_blank(request.userid).ok_or_else(|| ApiError::missing("Missing userid parameter"))?;
    let report = state.service.refresh(&user_id).await;
    let status = match report.status {
        RefreshStatus::Success => StatusCode::OK,
        RefreshStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Ok((status, Json(report)))
}

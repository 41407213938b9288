//! HTTP API for the referral network.
//!
//! An internal service boundary for the registration and visualization
//! flows. Every failure comes back as `{error, kind}` with a status code.

use crate::node::NodeState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use trellis_network::{
    AttachReport, CodeOwner, Error, IssuedCode, NetworkNode, NewProvider, Registration,
};
use trellis_store::{ProviderId, ProviderNode};

type AppState = Arc<NodeState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Providers
        .route("/api/v1/providers", post(register_provider))
        .route("/api/v1/providers/:id", get(get_provider))
        .route("/api/v1/providers/:id/referral-code", post(issue_code))
        .route("/api/v1/providers/:id/subtree", get(fetch_subtree))
        .route("/api/v1/providers/:id/network", get(fetch_network))
        // Referral codes
        .route(
            "/api/v1/referral-codes/:code",
            get(validate_code).delete(revoke_code),
        )
        .route("/api/v1/referral-codes/:code/attach", post(attach))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Engine error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

/// HTTP status for an engine error.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Expired { .. } => StatusCode::GONE,
        Error::LimitExceeded { .. } | Error::CodeTaken(_) => StatusCode::CONFLICT,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::GenerationExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// --- Health ---

async fn health() -> &'static str {
    "OK"
}

// --- Providers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(flatten)]
    provider: NewProvider,
    referral_code: Option<String>,
}

async fn register_provider(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Registration>)> {
    let _guard = match req.referral_code {
        Some(_) => Some(state.network_lock.lock().await),
        None => None,
    };
    let registration = state
        .engine
        .register(req.provider, req.referral_code.as_deref())?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn get_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProviderNode>> {
    Ok(Json(state.engine.provider(&ProviderId::new(id))?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequest {
    custom_code: Option<String>,
}

async fn issue_code(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<IssueRequest>>,
) -> ApiResult<(StatusCode, Json<IssuedCode>)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let _guard = state.network_lock.lock().await;
    let issued = state
        .engine
        .issue(&ProviderId::new(id), req.custom_code.as_deref())?;
    Ok((StatusCode::CREATED, Json(issued)))
}

#[derive(Debug, Deserialize)]
struct SubtreeQuery {
    depth: Option<usize>,
}

async fn fetch_subtree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SubtreeQuery>,
) -> ApiResult<Json<Vec<NetworkNode>>> {
    let depth = query.depth.unwrap_or(state.config.limits.max_depth);
    Ok(Json(state.engine.fetch_subtree(&ProviderId::new(id), depth)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkQuery {
    max_depth: Option<usize>,
}

async fn fetch_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NetworkQuery>,
) -> ApiResult<Json<Vec<NetworkNode>>> {
    let max_depth = query.max_depth.unwrap_or(state.config.limits.max_depth);
    Ok(Json(
        state.engine.fetch_network(&ProviderId::new(id), max_depth)?,
    ))
}

// --- Referral codes ---

async fn validate_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<CodeOwner>> {
    Ok(Json(state.engine.validate(&code)?))
}

async fn revoke_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.revoke(&code)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachRequest {
    provider_id: ProviderId,
}

async fn attach(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<AttachRequest>,
) -> ApiResult<Json<AttachReport>> {
    let _guard = state.network_lock.lock().await;
    Ok(Json(state.engine.attach(&code, &req.provider_id)?))
}

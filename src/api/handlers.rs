//! REST API handlers.
//!
//! Every handler runs behind [`batch_middleware`](crate::wrapper::batch_middleware),
//! so the [`BatchContext`] extension always carries an open request batch
//! and session handles stay usable for the whole request.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::Value;

use super::types::{
    ApiError, AttributeResponse, CreateSessionRequest, DefaultTimeoutRequest, ErrorResponse,
    SessionResponse,
};
use crate::batch::BatchContext;
use crate::manager::DistributableSessionManager;
use crate::session::{Session, SessionId};
use crate::statistics::StatisticsSnapshot;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<DistributableSessionManager>,
}

impl AppState {
    pub fn new(manager: Arc<DistributableSessionManager>) -> Self {
        Self { manager }
    }
}

fn error(e: crate::error::SessionError) -> ApiError {
    ErrorResponse::from_session_error(&e)
}

fn parse_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse::<SessionId>().map_err(error)
}

fn find(state: &AppState, ctx: &BatchContext, raw: &str) -> Result<Session, ApiError> {
    let id = parse_id(raw)?;
    state
        .manager
        .get_session(ctx, &id)
        .map_err(error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::session_not_found(raw)),
            )
        })
}

fn respond(session: &Session) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = session.snapshot().map_err(error)?;
    Ok(Json(SessionResponse::new(snapshot, session.state())))
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info(State(state): State<AppState>) -> Json<Value> {
    let manager = &state.manager;
    Json(serde_json::json!({
        "name": "distributable-session",
        "version": env!("CARGO_PKG_VERSION"),
        "deployment": manager.deployment_name(),
        "orphan_session_allowed": manager.is_orphan_session_allowed(),
        "statistics_enabled": manager.statistics().is_enabled(),
        "default_timeout_secs": manager.default_session_timeout().as_secs(),
        "active_sessions": manager.active_session_count(),
    }))
}

/// Create a new session.
pub async fn create_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<BatchContext>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let id = req.id.as_deref().map(parse_id).transpose()?;
    let mut session = state.manager.create_session(&ctx, id).map_err(error)?;

    if let Some(timeout) = req.timeout() {
        session.set_timeout(timeout).map_err(error)?;
    }
    for (name, value) in req.attributes {
        session.set_attribute(&name, value).map_err(error)?;
    }

    let Json(response) = respond(&session)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get a session, recording the access.
pub async fn get_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<BatchContext>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = find(&state, &ctx, &session_id)?;
    respond(&session)
}

/// Delete a session. Deleting a missing session succeeds.
pub async fn delete_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<BatchContext>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&session_id)?;
    state.manager.remove_session(&ctx, &id).map_err(error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set one attribute.
pub async fn put_attribute(
    State(state): State<AppState>,
    Extension(ctx): Extension<BatchContext>,
    Path((session_id, name)): Path<(String, String)>,
    Json(value): Json<Value>,
) -> Result<Json<AttributeResponse>, ApiError> {
    let session = find(&state, &ctx, &session_id)?;
    let previous = session
        .set_attribute(&name, value.clone())
        .map_err(error)?;

    Ok(Json(AttributeResponse {
        name,
        value: Some(value),
        previous,
    }))
}

/// Remove one attribute.
pub async fn delete_attribute(
    State(state): State<AppState>,
    Extension(ctx): Extension<BatchContext>,
    Path((session_id, name)): Path<(String, String)>,
) -> Result<Json<AttributeResponse>, ApiError> {
    let session = find(&state, &ctx, &session_id)?;
    let previous = session.remove_attribute(&name).map_err(error)?;
    if previous.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::attribute_not_found(&name)),
        ));
    }

    Ok(Json(AttributeResponse {
        name,
        value: None,
        previous,
    }))
}

/// Session statistics. 404 when statistics are disabled.
pub async fn statistics(
    State(state): State<AppState>,
) -> Result<Json<StatisticsSnapshot>, ApiError> {
    state
        .manager
        .statistics()
        .snapshot()
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::statistics_disabled()),
            )
        })
}

/// Change the timeout given to sessions created from now on.
pub async fn set_default_timeout(
    State(state): State<AppState>,
    Json(req): Json<DefaultTimeoutRequest>,
) -> Json<DefaultTimeoutRequest> {
    state
        .manager
        .set_default_session_timeout(Duration::from_secs(req.timeout_secs));
    Json(DefaultTimeoutRequest {
        timeout_secs: state.manager.default_session_timeout().as_secs(),
    })
}

//! REST interface over a [`SessionManager`].

use crate::error::{StoreError, StoreErrorKind};
use crate::manager::{MoveReply, SessionManager};
use crate::store::{GameId, GameView};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strictly_chess::RulesEngine;
use tracing::{debug, instrument, warn};

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState<E: RulesEngine> {
    manager: SessionManager<E>,
    long_poll_cap: Duration,
}

/// Body of `POST /api/sessions/{id}/moves`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Raw move token, e.g. `e2-e4`.
    #[serde(rename = "move")]
    pub mv: String,
}

/// Query of `GET /api/sessions/{id}/game`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameQuery {
    /// Wait for a version newer than this.
    pub since: Option<u64>,
    /// How long to wait, capped by the server.
    pub wait_ms: Option<u64>,
}

/// Error body returned for every failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Failure category.
    pub kind: String,
    /// Human-readable message.
    pub error: String,
}

/// Store failure mapped onto an HTTP status.
#[derive(Debug, Clone, derive_more::Display, derive_more::From)]
#[display("{}", _0)]
pub struct ApiError(StoreError);

impl ApiError {
    /// Status code for this failure.
    pub fn status(&self) -> StatusCode {
        match self.0.kind {
            StoreErrorKind::NotFound => StatusCode::NOT_FOUND,
            StoreErrorKind::AlreadyExists | StoreErrorKind::Conflict => StatusCode::CONFLICT,
            StoreErrorKind::Corrupt => StatusCode::INTERNAL_SERVER_ERROR,
            StoreErrorKind::Backend => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, %status, "Request failed");
        } else {
            debug!(error = %self.0, %status, "Request refused");
        }
        let body = ErrorBody {
            kind: self.0.kind.to_string(),
            error: self.0.message,
        };
        (status, Json(body)).into_response()
    }
}

/// Builds the router. `long_poll_cap` bounds any `wait_ms` a client asks for.
#[instrument(skip(manager))]
pub fn router<E: RulesEngine>(manager: SessionManager<E>, long_poll_cap: Duration) -> Router {
    let state = AppState {
        manager,
        long_poll_cap,
    };
    Router::new()
        .route("/api/sessions", get(list_sessions::<E>))
        .route(
            "/api/sessions/{id}",
            post(open_session::<E>).delete(remove_session::<E>),
        )
        .route("/api/sessions/{id}/game", get(get_game::<E>))
        .route("/api/sessions/{id}/moves", post(submit_move::<E>))
        .route("/api/sessions/{id}/restart", post(restart::<E>))
        .with_state(state)
}

#[instrument(skip(state))]
async fn list_sessions<E: RulesEngine>(
    State(state): State<AppState<E>>,
) -> Result<Json<Vec<GameId>>, ApiError> {
    Ok(Json(state.manager.list().await?))
}

#[instrument(skip(state))]
async fn open_session<E: RulesEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<GameId>,
) -> Result<Json<GameView>, ApiError> {
    Ok(Json(state.manager.open_or_create(&id).await?))
}

#[instrument(skip(state))]
async fn get_game<E: RulesEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<GameId>,
    Query(query): Query<GameQuery>,
) -> Result<Json<GameView>, ApiError> {
    let view = match query.since {
        Some(since) => {
            let wait = Duration::from_millis(query.wait_ms.unwrap_or(u64::MAX))
                .min(state.long_poll_cap);
            state.manager.wait_for_change(&id, since, wait).await?
        }
        None => state.manager.view(&id).await?,
    };
    Ok(Json(view))
}

#[instrument(skip(state, request), fields(mv = %request.mv))]
async fn submit_move<E: RulesEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<GameId>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<MoveReply>, ApiError> {
    Ok(Json(state.manager.apply_move(&id, &request.mv).await?))
}

#[instrument(skip(state))]
async fn restart<E: RulesEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<GameId>,
) -> Result<Json<GameView>, ApiError> {
    Ok(Json(state.manager.reset(&id).await?))
}

#[instrument(skip(state))]
async fn remove_session<E: RulesEngine>(
    State(state): State<AppState<E>>,
    Path(id): Path<GameId>,
) -> Result<StatusCode, ApiError> {
    if state.manager.remove(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StoreError::not_found(&id).into())
    }
}

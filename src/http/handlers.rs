// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


// Request handlers for the HTTP transport

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::Utc;
use futures::{future, stream, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine_core::constants::http as http_consts;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::events::{ChannelEvent, Outcome};
use crate::engine_core::models::{SessionId, TransportKind};
use crate::engine_core::session::Session;
use crate::http::responses::{ApiError, HealthResponse};
use crate::http::{AppState, HttpMode};
use crate::lifecycle::LifecycleState;
use crate::state::SessionRegistry;

/// Closes the session if the request future is dropped before disarming.
struct DisconnectGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
    armed: bool,
}

impl DisconnectGuard {
    fn new(registry: Arc<SessionRegistry>, id: SessionId) -> Self {
        Self {
            registry,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed && self.registry.remove(&self.id).is_some() {
            info!(session_id = %self.id, "Client disconnected; session closed");
        }
    }
}

/// POST /mcp
pub async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event = match serde_json::from_slice::<Value>(&body) {
        Ok(message) => ChannelEvent::Message(message),
        Err(e) => ChannelEvent::Malformed(e.to_string()),
    };

    match state.mode {
        HttpMode::SessionAffine => post_affine(&state, &headers, event).await,
        HttpMode::Stateless => post_stateless(&state, event).await,
    }
}

async fn post_affine(state: &AppState, headers: &HeaderMap, event: ChannelEvent) -> Response {
    let (session, id) = match resolve_session(state, headers) {
        Ok(resolved) => resolved,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let guard = DisconnectGuard::new(state.registry.clone(), id);
    let result = session.exchange(event).await;
    guard.disarm();

    let response = match result {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => {
            warn!(session_id = %id, error = %e, "Exchange failed; dropping session");
            state.registry.remove(&id);
            ApiError::from(e).into_response()
        }
    };
    with_session_header(response, id)
}

async fn post_stateless(state: &AppState, event: ChannelEvent) -> Response {
    let session = match Session::open(&state.engine, None, TransportKind::StatelessHttp) {
        Ok(session) => session,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let result = session.exchange(event).await;
    session.close();
    session.wait_closed().await;

    match result {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => {
            warn!(error = %e, "Stateless exchange failed");
            ApiError::from(e).into_response()
        }
    }
}

/// GET /mcp: an event stream that stays open for the session's lifetime.
pub async fn open_stream(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.mode == HttpMode::Stateless {
        return ApiError::method_not_allowed().into_response();
    }

    let (session, id) = match resolve_session(&state, &headers) {
        Ok(resolved) => resolved,
        Err(e) => return ApiError::from(e).into_response(),
    };
    debug!(session_id = %id, "Event stream opened");

    // Dropping the body (client went away) drops the guard with it.
    let guard = DisconnectGuard::new(state.registry.clone(), id);
    let until_closed = stream::once(async move {
        session.engine_finished().await;
        drop(guard);
    })
    .filter_map(|()| future::ready(None::<Result<Event, Infallible>>));

    let opened = stream::once(future::ready(Ok::<Event, Infallible>(
        Event::default().comment("session open"),
    )));

    let sse = Sse::new(opened.chain(until_closed)).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(http_consts::SSE_KEEPALIVE_SECS)),
    );
    with_session_header(sse.into_response(), id)
}

/// DELETE /mcp: explicit session termination.
pub async fn delete_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.mode == HttpMode::Stateless {
        return ApiError::method_not_allowed().into_response();
    }

    let removed = requested_id(&headers)
        .and_then(|raw| raw.parse::<SessionId>().ok())
        .and_then(|id| state.registry.remove(&id).map(|session| (id, session)));

    match removed {
        Some((id, session)) => {
            session.wait_closed().await;
            info!(session_id = %id, "Session terminated by client");
            with_session_header(StatusCode::NO_CONTENT.into_response(), id)
        }
        None => ApiError::from(GatewayError::SessionClosed).into_response(),
    }
}

/// OPTIONS /mcp. Preflights are answered by the origin guard; this only
/// gives the route an OPTIONS method.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let lifecycle = state.lifecycle.state();
    let status = match lifecycle {
        LifecycleState::Running => "ok",
        other => other.as_str(),
    };
    Json(HealthResponse {
        status: status.to_string(),
        mode: state.mode.as_str().to_string(),
        lifecycle: lifecycle.as_str().to_string(),
        active_sessions: state.registry.len(),
        sessions_created: state.registry.created_total(),
        sessions_closed: state.registry.closed_total(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<Session>, SessionId), GatewayError> {
    let requested = requested_id(headers);
    let engine = &state.engine;
    let (session, created) = state.registry.get_or_create(requested.as_deref(), |id| {
        Session::open(engine, Some(id), TransportKind::Http)
    })?;
    let id = session
        .id()
        .ok_or_else(|| GatewayError::Transport("registered session has no id".to_string()))?;
    if created {
        debug!(session_id = %id, requested = ?requested, "Opened new session");
    }
    Ok((session, id))
}

fn requested_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http_consts::SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Reply(value) => (StatusCode::OK, Json(value)).into_response(),
        Outcome::Accepted => StatusCode::ACCEPTED.into_response(),
    }
}

fn with_session_header(mut response: Response, id: SessionId) -> Response {
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(
            HeaderName::from_static(http_consts::SESSION_ID_HEADER),
            value,
        );
    }
    response
}

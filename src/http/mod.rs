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


//! HTTP Transport Adapter.
//!
//! One protocol endpoint (`/mcp`) plus `/health`. In session-affine mode the
//! `mcp-session-id` header routes requests to a registry session; in
//! stateless mode every request gets an ephemeral session of its own.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub mod handlers;
pub mod origin;
pub mod responses;

use crate::engine::ProtocolEngine;
use crate::engine_core::constants::http as http_consts;
use crate::lifecycle::LifecycleController;
use crate::state::SessionRegistry;
use origin::OriginPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMode {
    SessionAffine,
    Stateless,
}

impl HttpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMode::SessionAffine => "http",
            HttpMode::Stateless => "stateless-http",
        }
    }
}

/// Application state shared by every handler.
///
/// Cheap to clone: the engine and registry are reference counted.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: ProtocolEngine,
    pub registry: Arc<SessionRegistry>,
    pub lifecycle: LifecycleController,
    pub mode: HttpMode,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: ProtocolEngine, mode: HttpMode, lifecycle: LifecycleController) -> Self {
        Self {
            engine,
            registry: Arc::new(SessionRegistry::new()),
            lifecycle,
            mode,
            started_at: Utc::now(),
        }
    }
}

/// Create the Axum router with all routes and middleware
///
/// Middleware stack (outermost to innermost):
/// - Request id (tower-http) - `x-request-id` generated when absent, echoed back
/// - Tracing (tower-http::trace) - one span per request
/// - Body size limit (tower-http::limit) - 413 above `max_body_bytes`
/// - Origin guard - `/mcp` only; `/health` is never origin-checked
pub fn create_router(state: AppState, policy: Arc<OriginPolicy>, max_body_bytes: usize) -> Router {
    let mcp = Router::new()
        .route(
            http_consts::MCP_PATH,
            get(handlers::open_stream)
                .post(handlers::post_message)
                .delete(handlers::delete_session)
                .options(handlers::preflight),
        )
        .route_layer(middleware::from_fn_with_state(policy, origin::origin_guard));

    Router::new()
        .route(http_consts::HEALTH_PATH, get(handlers::health))
        .merge(mcp)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

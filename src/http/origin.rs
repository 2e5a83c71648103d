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


//! Access Control Middleware.
//!
//! Origin allow-list and CORS for the `/mcp` route. A request whose
//! `Origin` is not allowed is answered with 403 before any handler runs,
//! so no session is ever created for it. Requests without an `Origin`
//! header (non-browser clients) pass through untouched.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::engine_core::constants::http as http_consts;
use crate::engine_core::errors::GatewayError;
use crate::http::responses::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// Static origin allow-list, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: HashSet<String>,
    allow_any: bool,
}

impl OriginPolicy {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        for origin in origins {
            let origin = normalise(origin.as_ref());
            if origin.is_empty() {
                continue;
            }
            if origin == "*" {
                policy.allow_any = true;
            } else {
                policy.allowed.insert(origin);
            }
        }
        policy
    }

    pub fn authorize(&self, origin: &str) -> Access {
        if self.allow_any || self.allowed.contains(&normalise(origin)) {
            Access::Allow
        } else {
            Access::Deny
        }
    }

    pub fn allows_any(&self) -> bool {
        self.allow_any
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty() && !self.allow_any
    }
}

fn normalise(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// `from_fn_with_state` middleware enforcing `OriginPolicy` on `/mcp`.
pub async fn origin_guard(
    State(policy): State<Arc<OriginPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let is_preflight = request.method() == Method::OPTIONS;

    let Some(origin) = origin else {
        if is_preflight {
            return StatusCode::NO_CONTENT.into_response();
        }
        return next.run(request).await;
    };

    let allowed = origin
        .to_str()
        .map(|o| policy.authorize(o) == Access::Allow)
        .unwrap_or(false);
    if !allowed {
        let shown = String::from_utf8_lossy(origin.as_bytes()).into_owned();
        warn!(origin = %shown, method = %request.method(), "Rejected request from disallowed origin");
        return ApiError::from(GatewayError::OriginDenied(shown)).into_response();
    }

    if is_preflight {
        debug!(origin = ?origin, "Answering CORS preflight");
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut(), origin);
        response.headers_mut().insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(http_consts::PREFLIGHT_MAX_AGE),
        );
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), origin);
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: HeaderValue) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(http_consts::ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(http_consts::ALLOWED_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(http_consts::SESSION_ID_HEADER),
    );
    headers.append(header::VARY, HeaderValue::from_static("origin"));
}

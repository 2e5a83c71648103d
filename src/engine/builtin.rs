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

//! Built-in MCP lifecycle handlers: `initialize`, `ping` and the
//! `notifications/initialized` notification.
//!
//! Method handlers (tools, resources) are registered next to these by the
//! embedding application.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::engine::HandlerSet;
use crate::engine_core::constants::{methods, protocol};
use crate::engine_core::errors::{GatewayError, HandlerError};
use crate::engine_core::models::RequestContext;
use crate::engine_core::traits::RequestHandler;

/// Answers `initialize` with the negotiated protocol version and server info.
#[derive(Debug, Clone)]
pub struct InitializeHandler {
    server_name: String,
    server_version: String,
}

impl InitializeHandler {
    pub fn new(server_name: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            server_version: server_version.into(),
        }
    }

    /// Echo the client's version when we speak it, otherwise offer our newest.
    pub fn negotiate(requested: Option<&str>) -> &'static str {
        requested
            .and_then(|v| protocol::SUPPORTED_VERSIONS.iter().find(|s| **s == v))
            .copied()
            .unwrap_or(protocol::SUPPORTED_VERSIONS[0])
    }
}

impl Default for InitializeHandler {
    fn default() -> Self {
        Self::new(protocol::SERVER_NAME, env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl RequestHandler for InitializeHandler {
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: RequestContext,
    ) -> Result<Value, HandlerError> {
        let params = match params {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(HandlerError::InvalidParams(
                    "initialize params must be an object".to_string(),
                ))
            }
            None => Default::default(),
        };

        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let version = Self::negotiate(requested);
        let client = params
            .get("clientInfo")
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        info!(
            client = %client,
            requested = ?requested,
            negotiated = %version,
            session_id = ?ctx.session_id,
            "Client initialized"
        );

        Ok(json!({
            "protocolVersion": version,
            "capabilities": {},
            "serverInfo": {
                "name": self.server_name,
                "version": self.server_version,
            }
        }))
    }
}

/// `ping` -> `{}`
#[derive(Debug, Clone, Copy, Default)]
pub struct PingHandler;

#[async_trait]
impl RequestHandler for PingHandler {
    async fn handle(&self, _: Option<Value>, _: RequestContext) -> Result<Value, HandlerError> {
        Ok(json!({}))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InitializedNotification;

#[async_trait]
impl RequestHandler for InitializedNotification {
    async fn handle(&self, _: Option<Value>, ctx: RequestContext) -> Result<Value, HandlerError> {
        debug!(session_id = ?ctx.session_id, "Client reported initialized");
        Ok(Value::Null)
    }
}

/// Register the lifecycle handlers into `set`.
pub fn register(set: &mut HandlerSet) -> Result<(), GatewayError> {
    set.register(methods::INITIALIZE, InitializeHandler::default())?;
    set.register(methods::PING, PingHandler)?;
    set.register(methods::NOTIFICATION_INITIALIZED, InitializedNotification)?;
    Ok(())
}

/// A handler set containing only the lifecycle handlers.
pub fn handler_set() -> Result<HandlerSet, GatewayError> {
    let mut set = HandlerSet::new();
    register(&mut set)?;
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_core::models::TransportKind;

    fn ctx() -> RequestContext {
        RequestContext::new(None, TransportKind::Stdio)
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(InitializeHandler::negotiate(Some("2024-11-05")), "2024-11-05");
        assert_eq!(
            InitializeHandler::negotiate(Some("1999-01-01")),
            protocol::SUPPORTED_VERSIONS[0]
        );
        assert_eq!(InitializeHandler::negotiate(None), protocol::SUPPORTED_VERSIONS[0]);
    }

    #[tokio::test]
    async fn test_initialize_result_shape() {
        let result = InitializeHandler::default()
            .handle(
                Some(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "test-runner", "version": "1.0"}
                })),
                ctx(),
            )
            .await
            .unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], protocol::SERVER_NAME);
    }

    #[tokio::test]
    async fn test_initialize_rejects_non_object_params() {
        let err = InitializeHandler::default()
            .handle(Some(json!([1, 2])), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidParams(_)));
    }

    #[test]
    fn test_handler_set_contents() {
        let set = handler_set().unwrap();
        assert!(set.contains(methods::INITIALIZE));
        assert!(set.contains(methods::PING));
        assert!(set.contains(methods::NOTIFICATION_INITIALIZED));
        assert_eq!(set.len(), 3);
    }
}

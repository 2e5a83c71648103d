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

//! JSON-RPC routing.
//!
//! Turns one inbound payload (single message or batch) into at most one
//! reply payload. Only `jsonrpc`, `method`, `params` and `id` are inspected.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::engine::HandlerSet;
use crate::engine_core::constants::jsonrpc;
use crate::engine_core::errors::HandlerError;
use crate::engine_core::models::{JsonRpcRequest, JsonRpcResponse, RequestContext};

/// Dispatch a decoded payload. `None` means nothing is owed to the peer
/// (notifications only).
pub async fn dispatch(handlers: &HandlerSet, message: Value, ctx: RequestContext) -> Option<Value> {
    match message {
        Value::Array(batch) => dispatch_batch(handlers, batch, ctx).await,
        single => dispatch_single(handlers, single, ctx).await.map(Value::from),
    }
}

/// Reply for bytes that could not be parsed as JSON.
pub fn parse_error() -> Value {
    JsonRpcResponse::error(Value::Null, jsonrpc::ERROR_PARSE, "Parse error").into()
}

async fn dispatch_batch(
    handlers: &HandlerSet,
    batch: Vec<Value>,
    ctx: RequestContext,
) -> Option<Value> {
    if batch.is_empty() {
        return Some(
            JsonRpcResponse::error(
                Value::Null,
                jsonrpc::ERROR_INVALID_REQUEST,
                "Invalid Request: empty batch",
            )
            .into(),
        );
    }

    // A session never runs two handlers at once, batches included.
    let mut replies = Vec::with_capacity(batch.len());
    for message in batch {
        if let Some(reply) = dispatch_single(handlers, message, ctx).await {
            replies.push(Value::from(reply));
        }
    }

    if replies.is_empty() {
        None
    } else {
        Some(Value::Array(replies))
    }
}

async fn dispatch_single(
    handlers: &HandlerSet,
    message: Value,
    ctx: RequestContext,
) -> Option<JsonRpcResponse> {
    // `"id": null` is still a request; only a missing member makes a notification.
    let raw_id = message.get("id").cloned();
    let reply_id = raw_id.clone().unwrap_or(Value::Null);

    if let Some(id) = &raw_id {
        if !matches!(id, Value::String(_) | Value::Number(_) | Value::Null) {
            return Some(JsonRpcResponse::error(
                Value::Null,
                jsonrpc::ERROR_INVALID_REQUEST,
                "Invalid Request: id must be a string, number or null",
            ));
        }
    }

    let req: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, "Rejecting non-request payload");
            return Some(JsonRpcResponse::error(
                reply_id,
                jsonrpc::ERROR_INVALID_REQUEST,
                "Invalid Request",
            ));
        }
    };

    if req.jsonrpc != jsonrpc::VERSION {
        return Some(JsonRpcResponse::error(
            reply_id,
            jsonrpc::ERROR_INVALID_REQUEST,
            "Invalid Request: jsonrpc must be \"2.0\"",
        ));
    }

    let is_notification = raw_id.is_none();

    let Some(handler) = handlers.get(&req.method) else {
        if is_notification {
            debug!(method = %req.method, "Ignoring unhandled notification");
            return None;
        }
        return Some(JsonRpcResponse::error(
            reply_id,
            jsonrpc::ERROR_METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ));
    };

    // A panicking handler fails its own request, never the session.
    let result = match AssertUnwindSafe(handler.handle(req.params, ctx))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Internal(anyhow::anyhow!(
            "handler panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };

    match result {
        Ok(_) if is_notification => None,
        Ok(value) => Some(JsonRpcResponse::success(reply_id, value)),
        Err(HandlerError::InvalidParams(reason)) => {
            if is_notification {
                warn!(method = %req.method, reason = %reason, "Notification had invalid params");
                return None;
            }
            Some(JsonRpcResponse::error(
                reply_id,
                jsonrpc::ERROR_INVALID_PARAMS,
                reason,
            ))
        }
        Err(HandlerError::Internal(e)) => {
            error!(
                method = %req.method,
                session_id = ?ctx.session_id,
                error = %e,
                "Handler failed"
            );
            if is_notification {
                return None;
            }
            Some(JsonRpcResponse::error(
                reply_id,
                jsonrpc::ERROR_INTERNAL,
                "Internal error",
            ))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

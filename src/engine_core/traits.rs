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

//! Seams between the engine, its transports and its handlers.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

use crate::engine_core::errors::{GatewayError, HandlerError};
use crate::engine_core::events::{ChannelEvent, Outcome};
use crate::engine_core::models::{RequestContext, TransportKind};

/// A method implementation registered under one JSON-RPC method name.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>, ctx: RequestContext)
        -> Result<Value, HandlerError>;
}

/// A duplex message channel: the only thing the engine knows about a transport.
///
/// Implementations exist for byte streams (stdio) and for in-memory
/// exchanges (HTTP). The engine never branches on which one it holds.
#[async_trait]
pub trait DuplexChannel: Send + 'static {
    /// Wait for the next inbound event. Must return `Closed` or `Failed`
    /// (never hang forever) once the peer is gone.
    async fn recv(&mut self) -> ChannelEvent;

    /// Write the outcome for the most recently received message.
    async fn send(&mut self, outcome: Outcome) -> Result<(), GatewayError>;

    fn kind(&self) -> TransportKind;
}

/// Adapter turning an async closure into a `RequestHandler`.
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Option<Value>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(Option<Value>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        params: Option<Value>,
        ctx: RequestContext,
    ) -> Result<Value, HandlerError> {
        (self.0)(params, ctx).await
    }
}

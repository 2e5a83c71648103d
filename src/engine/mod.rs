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

//! Protocol Engine.
//!
//! Binds one `DuplexChannel` to one worker task. The worker reads an event,
//! dispatches it to the registered handler, writes the outcome back on the
//! same channel, and only then reads the next event: replies leave a channel
//! in the order requests arrived on it. Independent channels run on
//! independent tasks.
//!
//! The engine knows nothing about stdio, sockets or HTTP.

pub mod builtin;
pub mod dispatch;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine_core::errors::GatewayError;
use crate::engine_core::events::{ChannelEvent, ExitReason, Outcome};
use crate::engine_core::models::RequestContext;
use crate::engine_core::traits::{DuplexChannel, RequestHandler};

/// Method name -> handler, built once per connection.
#[derive(Default, Clone)]
pub struct HandlerSet {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `method`. Keys are unique.
    pub fn register<H>(&mut self, method: impl Into<String>, handler: H) -> Result<(), GatewayError>
    where
        H: RequestHandler + 'static,
    {
        let method = method.into();
        if self.handlers.contains_key(&method) {
            return Err(GatewayError::Registration(format!(
                "handler already registered for '{}'",
                method
            )));
        }
        self.handlers.insert(method, Arc::new(handler));
        Ok(())
    }

    pub fn get(&self, method: &str) -> Option<&Arc<dyn RequestHandler>> {
        self.handlers.get(method)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

type HandlerFactory = dyn Fn() -> Result<HandlerSet, GatewayError> + Send + Sync;

/// Transport-agnostic dispatcher shared by every adapter.
///
/// Each `connect` builds a fresh `HandlerSet` from the factory, so no handler
/// state leaks between sessions (or between stateless requests).
#[derive(Clone)]
pub struct ProtocolEngine {
    factory: Arc<HandlerFactory>,
    connections: Arc<AtomicU64>,
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("connections", &self.connections_opened())
            .finish()
    }
}

impl ProtocolEngine {
    /// Build an engine. The factory runs once here so registration errors
    /// surface at startup rather than on first traffic.
    pub fn new<F>(factory: F) -> Result<Self, GatewayError>
    where
        F: Fn() -> Result<HandlerSet, GatewayError> + Send + Sync + 'static,
    {
        let validated = factory()?;
        debug!(handlers = validated.len(), "Protocol engine handler set validated");
        Ok(Self {
            factory: Arc::new(factory),
            connections: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Bind `channel` to a new worker. Must be called inside a tokio runtime.
    pub fn connect<C>(&self, channel: C, ctx: RequestContext) -> Result<EngineHandle, GatewayError>
    where
        C: DuplexChannel,
    {
        let handlers = (self.factory)()?;
        self.connections.fetch_add(1, Ordering::Relaxed);

        let handle = EngineHandle::new();
        let cancel = handle.cancel.clone();
        let finished = handle.finished.clone();
        let exit = handle.exit.clone();

        tokio::spawn(async move {
            let _done = finished.drop_guard();
            let kind = channel.kind();
            let reason = run_loop(handlers, channel, ctx, cancel).await;
            info!(
                transport = ?kind,
                session_id = ?ctx.session_id,
                reason = ?reason,
                "Engine connection finished"
            );
            if let Ok(mut slot) = exit.lock() {
                *slot = Some(reason);
            }
        });

        Ok(handle)
    }

    /// Total connections opened over the process lifetime.
    pub fn connections_opened(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }
}

/// Control handle for one engine worker.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    cancel: CancellationToken,
    finished: CancellationToken,
    exit: Arc<Mutex<Option<ExitReason>>>,
}

impl EngineHandle {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            exit: Arc::new(Mutex::new(None)),
        }
    }

    /// Stop accepting messages. An in-flight handler is dropped and its
    /// result never written.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Resolves once the worker task has exited.
    pub async fn finished(&self) {
        self.finished.cancelled().await
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit.lock().ok().and_then(|slot| slot.clone())
    }
}

async fn run_loop<C: DuplexChannel>(
    handlers: HandlerSet,
    mut channel: C,
    ctx: RequestContext,
    cancel: CancellationToken,
) -> ExitReason {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ExitReason::Cancelled,
            event = channel.recv() => event,
        };

        let reply = match event {
            ChannelEvent::Message(message) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return ExitReason::Cancelled,
                    reply = dispatch::dispatch(&handlers, message, ctx) => reply,
                }
            }
            ChannelEvent::Malformed(detail) => {
                debug!(detail = %detail, "Malformed message");
                Some(dispatch::parse_error())
            }
            ChannelEvent::Closed => return ExitReason::PeerClosed,
            ChannelEvent::Failed(detail) => return ExitReason::TransportFailed(detail),
        };

        if cancel.is_cancelled() {
            return ExitReason::Cancelled;
        }

        let outcome = match reply {
            Some(value) => Outcome::Reply(value),
            None => Outcome::Accepted,
        };
        if let Err(e) = channel.send(outcome).await {
            warn!(error = %e, "Failed to write outcome; closing channel");
            return ExitReason::TransportFailed(e.to_string());
        }
    }
}

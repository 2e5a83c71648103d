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


//! Process Lifecycle Controller.
//!
//! `Starting -> Running -> Draining -> Stopped`, published on a watch
//! channel. Exactly one adapter runs per process, chosen by `Mode`. On
//! SIGINT/SIGTERM the controller drains every session before the listener
//! (or the stdio channel) is released.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::ProtocolEngine;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::events::ExitReason;
use crate::http::origin::OriginPolicy;
use crate::http::{create_router, AppState, HttpMode};
use crate::mcp::stdio::StdioAdapter;

/// Runtime transport selection (the positional `MODE` argument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// One implicit session over stdin/stdout
    Stdio,
    /// HTTP with session affinity via `mcp-session-id`
    Http,
    /// HTTP where every request gets an ephemeral session
    StatelessHttp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleController {
    tx: Arc<watch::Sender<LifecycleState>>,
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Starting);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Move forward to `to`. Transitions never go backwards; returns whether
    /// the state changed.
    pub fn advance(&self, to: LifecycleState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if to > *state {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            info!(state = %to, "Lifecycle transition");
        }
        changed
    }

    pub fn mark_running(&self) -> bool {
        self.advance(LifecycleState::Running)
    }

    pub fn begin_drain(&self) -> bool {
        self.advance(LifecycleState::Draining)
    }

    pub fn mark_stopped(&self) -> bool {
        self.advance(LifecycleState::Stopped)
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}

/// Serve the single stdio session until EOF or `shutdown`.
pub async fn run_stdio<F>(
    engine: &ProtocolEngine,
    lifecycle: &LifecycleController,
    shutdown: F,
) -> Result<ExitReason>
where
    F: Future<Output = ()>,
{
    lifecycle.mark_running();
    let shutdown = async {
        shutdown.await;
        lifecycle.begin_drain();
    };
    let reason = StdioAdapter::start(engine, shutdown)
        .await
        .context("stdio session failed to start")?;

    lifecycle.begin_drain();
    lifecycle.mark_stopped();
    if let ExitReason::TransportFailed(detail) = &reason {
        warn!(detail = %detail, "Stdio channel failed");
    }
    Ok(reason)
}

/// Bind the configured address and serve until `shutdown`.
pub async fn run_http<F>(
    config: &Config,
    engine: ProtocolEngine,
    mode: HttpMode,
    lifecycle: LifecycleController,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Bind {
            addr: addr.to_string(),
            error: e.to_string(),
        })?;

    let policy = OriginPolicy::new(&config.allowed_origins);
    if policy.is_empty() {
        info!("No allowed origins configured; browser requests carrying an Origin will be rejected");
    }

    let state = AppState::new(engine, mode, lifecycle);
    serve_with_shutdown(listener, state, policy, config.max_body_bytes, shutdown).await
}

/// Serve on an already-bound listener.
///
/// When `shutdown` resolves the state moves to `Draining`, every session is
/// closed and awaited while `/health` stays reachable, and only then is the
/// listener released.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: AppState,
    policy: OriginPolicy,
    max_body_bytes: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = state.registry.clone();
    let lifecycle = state.lifecycle.clone();
    let mode = state.mode;
    let app = create_router(state, Arc::new(policy), max_body_bytes);

    let addr = listener.local_addr()?;
    lifecycle.mark_running();
    info!(addr = %addr, mode = %mode.as_str(), "HTTP transport listening");

    let drain_lifecycle = lifecycle.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            drain_lifecycle.begin_drain();
            let drained = registry.drain().await;
            info!(drained, "All sessions closed; releasing listener");
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            e
        })?;

    lifecycle.mark_stopped();
    info!("Server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn test_transitions_only_move_forward() {
        let lifecycle = LifecycleController::new();
        let mut rx = lifecycle.subscribe();
        assert_eq!(lifecycle.state(), LifecycleState::Starting);

        assert!(lifecycle.mark_running());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), LifecycleState::Running);

        assert!(lifecycle.begin_drain());
        assert!(!lifecycle.mark_running());
        assert!(!lifecycle.begin_drain());
        assert_eq!(lifecycle.state(), LifecycleState::Draining);

        assert!(lifecycle.mark_stopped());
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(Mode::from_str("stdio", false), Ok(Mode::Stdio));
        assert_eq!(Mode::from_str("http", false), Ok(Mode::Http));
        assert_eq!(Mode::from_str("stateless-http", false), Ok(Mode::StatelessHttp));
        assert!(Mode::from_str("grpc", false).is_err());
    }

    #[tokio::test]
    async fn test_stdio_mode_stops_on_shutdown() {
        let engine = ProtocolEngine::new(crate::engine::builtin::handler_set).unwrap();
        let lifecycle = LifecycleController::new();
        let (_client, server) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(server);
        let channel = crate::mcp::transport::StdioChannel::new(read, write);

        let reason = StdioAdapter::start_on(&engine, channel, async {
            lifecycle.begin_drain();
        })
        .await
        .unwrap();
        assert_eq!(reason, ExitReason::Cancelled);
        assert_eq!(lifecycle.state(), LifecycleState::Draining);
    }
}

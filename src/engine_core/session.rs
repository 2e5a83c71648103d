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


//! Session: one logical client conversation bound to one engine worker.
//!
//! A session owns exactly one transport binding for its whole life. HTTP
//! sessions use an exchange binding whose client half sits behind an async
//! mutex, so concurrent requests for the same session run one at a time.
//! The stdio session uses a stream binding: the engine task owns the pipe.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::engine::{EngineHandle, ProtocolEngine};
use crate::engine_core::errors::GatewayError;
use crate::engine_core::events::{ChannelEvent, ExitReason, Outcome};
use crate::engine_core::models::{RequestContext, SessionId, TransportKind};
use crate::engine_core::traits::DuplexChannel;
use crate::mcp::transport::{memory_channel, ChannelPeer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Active = 0,
    Closing = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Active,
            1 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

#[derive(Debug)]
enum Binding {
    Exchange {
        peer: Mutex<ChannelPeer>,
        hangup: mpsc::Sender<ChannelEvent>,
    },
    Stream,
}

#[derive(Debug)]
pub struct Session {
    id: Option<SessionId>,
    kind: TransportKind,
    created_at: DateTime<Utc>,
    state: AtomicU8,
    binding: Binding,
    engine: EngineHandle,
}

impl Session {
    /// Open an exchange-bound session on a fresh engine connection.
    pub fn open(
        engine: &ProtocolEngine,
        id: Option<SessionId>,
        kind: TransportKind,
    ) -> Result<Self, GatewayError> {
        let (channel, peer) = memory_channel(kind);
        let hangup = peer.hangup_sender();
        let handle = engine.connect(channel, RequestContext::new(id, kind))?;
        debug!(session_id = ?id, transport = ?kind, "Session opened");
        Ok(Self::new(
            id,
            kind,
            Binding::Exchange {
                peer: Mutex::new(peer),
                hangup,
            },
            handle,
        ))
    }

    /// Bind a stream channel; the engine drives it until EOF or close.
    pub fn bind<C: DuplexChannel>(
        engine: &ProtocolEngine,
        channel: C,
        id: Option<SessionId>,
    ) -> Result<Self, GatewayError> {
        let kind = channel.kind();
        let handle = engine.connect(channel, RequestContext::new(id, kind))?;
        debug!(session_id = ?id, transport = ?kind, "Stream session bound");
        Ok(Self::new(id, kind, Binding::Stream, handle))
    }

    fn new(
        id: Option<SessionId>,
        kind: TransportKind,
        binding: Binding,
        engine: EngineHandle,
    ) -> Self {
        Self {
            id,
            kind,
            created_at: Utc::now(),
            state: AtomicU8::new(SessionState::Active as u8),
            binding,
            engine,
        }
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Active and its engine worker still running.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active && !self.engine.is_finished()
    }

    /// Push one event through the exchange binding and return its outcome.
    pub async fn exchange(&self, event: ChannelEvent) -> Result<Outcome, GatewayError> {
        let Binding::Exchange { peer, .. } = &self.binding else {
            return Err(GatewayError::Transport(
                "stream sessions are driven by their own channel".to_string(),
            ));
        };
        if !self.is_active() {
            return Err(GatewayError::SessionClosed);
        }
        let mut peer = peer.lock().await;
        // Re-check: the session may have closed while we queued.
        if !self.is_active() {
            return Err(GatewayError::SessionClosed);
        }
        peer.exchange(event).await
    }

    /// `Active -> Closing` and cancel the engine worker.
    ///
    /// Returns `true` only for the caller that performed the transition.
    pub fn close(&self) -> bool {
        let transitioned = self
            .state
            .compare_exchange(
                SessionState::Active as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !transitioned {
            return false;
        }

        if let Binding::Exchange { hangup, .. } = &self.binding {
            let _ = hangup.try_send(ChannelEvent::Closed);
        }
        self.engine.close();
        debug!(session_id = ?self.id, "Session closing");
        true
    }

    /// Wait for the engine worker to exit, then mark the session `Closed`.
    pub async fn wait_closed(&self) -> Option<ExitReason> {
        self.engine.finished().await;
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
        self.engine.exit_reason()
    }

    /// Resolves when the worker exits for any reason, without closing.
    pub async fn engine_finished(&self) {
        self.engine.finished().await
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.engine.exit_reason()
    }
}

// The last reference going away ends the worker.
impl Drop for Session {
    fn drop(&mut self) {
        self.engine.close();
    }
}

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


//! Duplex channel implementations.
//!
//! `StdioChannel` frames JSON-RPC over any byte stream pair (stdin/stdout in
//! production, in-memory pipes in tests). `memory_channel` builds the
//! exchange-style pair used by HTTP sessions: the engine owns one half, the
//! HTTP handler drives the other.

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, Stdin, Stdout};
use tokio::sync::mpsc;
use tokio_util::codec::{Encoder, FramedRead};
use tracing::debug;

use crate::engine_core::constants::limits;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::events::{ChannelEvent, Outcome};
use crate::engine_core::models::TransportKind;
use crate::engine_core::traits::DuplexChannel;
use crate::mcp::codec::{Inbound, McpCodec};

pub struct StdioChannel<R, W> {
    reader: FramedRead<R, McpCodec>,
    writer: W,
}

impl<R, W> StdioChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, McpCodec::new()),
            writer,
        }
    }
}

/// Channel over the process's own stdin and stdout.
pub fn stdio() -> StdioChannel<Stdin, Stdout> {
    StdioChannel::new(tokio::io::stdin(), tokio::io::stdout())
}

#[async_trait]
impl<R, W> DuplexChannel for StdioChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> ChannelEvent {
        match self.reader.next().await {
            Some(Ok(Inbound::Message(value))) => ChannelEvent::Message(value),
            Some(Ok(Inbound::Malformed(detail))) => ChannelEvent::Malformed(detail),
            Some(Err(e)) => ChannelEvent::Failed(e.to_string()),
            None => ChannelEvent::Closed,
        }
    }

    async fn send(&mut self, outcome: Outcome) -> Result<(), GatewayError> {
        let Outcome::Reply(value) = outcome else {
            return Ok(());
        };

        // Replies use whatever framing the peer last used.
        let mut buf = BytesMut::new();
        self.reader
            .decoder_mut()
            .encode(&value, &mut buf)
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        debug!(bytes = buf.len(), "Writing reply");

        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }
}

/// Engine half of an in-memory exchange channel.
pub struct MemoryChannel {
    events: mpsc::Receiver<ChannelEvent>,
    outcomes: mpsc::Sender<Outcome>,
    kind: TransportKind,
}

/// Client half: push one event, await its outcome.
#[derive(Debug)]
pub struct ChannelPeer {
    events: mpsc::Sender<ChannelEvent>,
    outcomes: mpsc::Receiver<Outcome>,
}

/// Build a connected `MemoryChannel` / `ChannelPeer` pair.
pub fn memory_channel(kind: TransportKind) -> (MemoryChannel, ChannelPeer) {
    let (event_tx, event_rx) = mpsc::channel(limits::SESSION_CHANNEL_CAPACITY);
    let (outcome_tx, outcome_rx) = mpsc::channel(1);
    (
        MemoryChannel {
            events: event_rx,
            outcomes: outcome_tx,
            kind,
        },
        ChannelPeer {
            events: event_tx,
            outcomes: outcome_rx,
        },
    )
}

#[async_trait]
impl DuplexChannel for MemoryChannel {
    async fn recv(&mut self) -> ChannelEvent {
        // Every sender gone is the same as an explicit hang-up.
        self.events.recv().await.unwrap_or(ChannelEvent::Closed)
    }

    async fn send(&mut self, outcome: Outcome) -> Result<(), GatewayError> {
        self.outcomes
            .send(outcome)
            .await
            .map_err(|_| GatewayError::SessionClosed)
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }
}

impl ChannelPeer {
    /// Deliver `event` and wait for the engine's outcome.
    ///
    /// Returns `SessionClosed` if the engine side is gone before or while
    /// the event is processed.
    pub async fn exchange(&mut self, event: ChannelEvent) -> Result<Outcome, GatewayError> {
        self.events
            .send(event)
            .await
            .map_err(|_| GatewayError::SessionClosed)?;
        self.outcomes.recv().await.ok_or(GatewayError::SessionClosed)
    }

    /// A sender for out-of-band events (`Closed`) that does not need the
    /// exclusive borrow `exchange` takes.
    pub fn hangup_sender(&self) -> mpsc::Sender<ChannelEvent> {
        self.events.clone()
    }
}

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


//! Stdio Transport Adapter.
//!
//! Binds the engine to the process's stdin/stdout as one implicit session.
//! Stdout carries protocol frames only; diagnostics go to stderr. The
//! registry is never involved.

use std::future::Future;

use tracing::info;

use crate::engine::ProtocolEngine;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::events::ExitReason;
use crate::engine_core::session::Session;
use crate::engine_core::traits::DuplexChannel;
use crate::mcp::transport;

pub struct StdioAdapter;

impl StdioAdapter {
    /// Serve stdin/stdout until EOF, a channel failure, or `shutdown`.
    pub async fn start<F>(engine: &ProtocolEngine, shutdown: F) -> Result<ExitReason, GatewayError>
    where
        F: Future<Output = ()>,
    {
        Self::start_on(engine, transport::stdio(), shutdown).await
    }

    /// Same as `start` over an arbitrary byte channel.
    pub async fn start_on<C, F>(
        engine: &ProtocolEngine,
        channel: C,
        shutdown: F,
    ) -> Result<ExitReason, GatewayError>
    where
        C: DuplexChannel,
        F: Future<Output = ()>,
    {
        let session = Session::bind(engine, channel, None)?;
        info!("Stdio session started");

        tokio::select! {
            _ = session.engine_finished() => {}
            _ = shutdown => {
                info!("Shutdown requested; closing stdio session");
            }
        }

        session.close();
        let reason = session.wait_closed().await.unwrap_or(ExitReason::Cancelled);
        info!(reason = ?reason, "Stdio session closed");
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builtin;
    use crate::mcp::transport::StdioChannel;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_round_trip_then_eof() {
        let engine = ProtocolEngine::new(builtin::handler_set).unwrap();
        let (client, server) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(server);
        let (client_read, mut client_write) = tokio::io::split(client);

        let adapter = tokio::spawn(async move {
            StdioAdapter::start_on(&engine, StdioChannel::new(read, write), std::future::pending())
                .await
        });

        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n{oops\n{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":2}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let first: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let third: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(second["error"]["code"], -32700);
        assert_eq!(third["id"], 2);

        drop(lines);
        drop(client_write);
        let reason = adapter.await.unwrap().unwrap();
        assert_eq!(reason, ExitReason::PeerClosed);
    }
}

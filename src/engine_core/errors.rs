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

// Domain error types - no internal detail ever reaches a client

use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Invalid configuration value (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Handler registration failed (duplicate method key)
    #[error("Handler registration error: {0}")]
    Registration(String),

    /// The bound channel failed or went away
    #[error("Transport error: {0}")]
    Transport(String),

    /// Session is no longer active
    #[error("Session closed")]
    SessionClosed,

    /// Registry is draining; no new sessions are accepted
    #[error("Server is shutting down")]
    ShuttingDown,

    /// Origin not on the allow-list (HTTP 403)
    #[error("Origin not allowed: {0}")]
    OriginDenied(String),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Get user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::SessionClosed => "Session not found".to_string(),
            GatewayError::ShuttingDown => "Service unavailable".to_string(),
            GatewayError::OriginDenied(_) => "Origin not allowed".to_string(),
            GatewayError::Config(_)
            | GatewayError::Registration(_)
            | GatewayError::Transport(_)
            | GatewayError::Bind { .. }
            | GatewayError::Io(_)
            | GatewayError::Serialization(_) => "Internal server error".to_string(),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::SessionClosed => 404,
            GatewayError::ShuttingDown => 503,
            GatewayError::OriginDenied(_) => 403,
            _ => 500,
        }
    }
}

/// Errors a registered request handler may return.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Surfaced to the client verbatim as -32602.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Logged, then replaced by a generic -32603 for the client.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

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

//! lilith-gateway Constants - Single source of truth for all configuration values.
//!
//! This module centralizes error codes, header names, environment variable
//! names and transport limits.

/// JSON-RPC 2.0 Error Codes
pub mod jsonrpc {
    /// Protocol version string every message must carry
    pub const VERSION: &str = "2.0";
    /// Parse error (standard JSON-RPC)
    pub const ERROR_PARSE: i32 = -32700;
    /// Invalid request (standard JSON-RPC)
    pub const ERROR_INVALID_REQUEST: i32 = -32600;
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params (standard JSON-RPC)
    pub const ERROR_INVALID_PARAMS: i32 = -32602;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i32 = -32603;
}

/// HTTP surface
pub mod http {
    /// Header carrying the server-issued session id (request and response)
    pub const SESSION_ID_HEADER: &str = "mcp-session-id";
    /// The single protocol endpoint
    pub const MCP_PATH: &str = "/mcp";
    /// Health / introspection endpoint
    pub const HEALTH_PATH: &str = "/health";
    pub const ALLOWED_METHODS: &str = "GET, POST, DELETE, OPTIONS";
    pub const ALLOWED_HEADERS: &str = "content-type, accept, mcp-session-id, mcp-protocol-version";
    /// Preflight cache lifetime in seconds
    pub const PREFLIGHT_MAX_AGE: &str = "600";
    /// Keep-alive interval for the session event stream
    pub const SSE_KEEPALIVE_SECS: u64 = 15;
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_PORT: &str = "PORT";
    pub const ENV_BIND_ADDRESS: &str = "BIND_ADDRESS";
    pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
    pub const ENV_MAX_BODY_BYTES: &str = "MAX_BODY_BYTES";

    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
    pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
}

/// MCP Protocol Methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
}

/// MCP protocol revisions understood by the built-in `initialize` handler
pub mod protocol {
    /// Newest first; the first entry is offered when the client asks for
    /// something we do not speak.
    pub const SUPPORTED_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];
    pub const SERVER_NAME: &str = "lilith-gateway";
}

/// Transport Limits (DoS Protection)
pub mod limits {
    /// Maximum allowed JSON-RPC message size (10 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    /// Maximum size of an LSP-style header block
    pub const MAX_HEADER_BYTES: usize = 4096;
    /// Queue depth between an HTTP exchange and its engine worker
    pub const SESSION_CHANNEL_CAPACITY: usize = 32;
}

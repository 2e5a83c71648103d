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

//! lilith-gateway: a dual-transport MCP protocol server.
//!
//! One JSON-RPC protocol engine, served either over stdio (a single implicit
//! session for a locally spawned client) or over HTTP (session-affine or
//! stateless), with origin allow-listing and an orderly drain on shutdown.

pub mod config;
pub mod engine;
pub mod engine_core;
pub mod http;
pub mod lifecycle;
pub mod mcp;
pub mod state;

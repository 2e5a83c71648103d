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

//! Channel events.
//!
//! The vocabulary shared by every transport binding and the protocol engine.
//! A byte pipe and an HTTP exchange both reduce to a stream of
//! `ChannelEvent`s in and a stream of `Outcome`s out.

use serde_json::Value;

/// Something arriving on a bound channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A syntactically valid JSON payload (single message or batch)
    Message(Value),
    /// Bytes that were framed correctly but are not JSON
    Malformed(String),
    /// Peer hung up (EOF, client disconnect, explicit session close)
    Closed,
    /// The channel itself broke; the session cannot continue
    Failed(String),
}

/// What the engine produced for one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A response (or batch of responses) to write back
    Reply(Value),
    /// Only notifications were received; nothing to write
    Accepted,
}

impl Outcome {
    pub fn into_reply(self) -> Option<Value> {
        match self {
            Outcome::Reply(v) => Some(v),
            Outcome::Accepted => None,
        }
    }
}

/// Why an engine worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The peer closed the channel
    PeerClosed,
    /// `EngineHandle::close` was called
    Cancelled,
    /// Reading or writing the channel failed
    TransportFailed(String),
}

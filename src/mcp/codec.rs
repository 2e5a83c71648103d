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

//! MCP Transport Codec.
//!
//! Handles the low-level framing of JSON-RPC messages on byte streams.
//! Supports both standard MCP stdio framing (newline delimited) and LSP-style
//! Content-Length headers, detected per message. Replies are written in the
//! framing of the most recent inbound message.
//!
//! Bytes that frame correctly but are not JSON decode to `Inbound::Malformed`
//! so the session can answer with a parse error and carry on. Only framing
//! failures (oversized messages, broken headers) are decoder errors.

use crate::engine_core::constants::limits;
use anyhow::{anyhow, Context, Result};
use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(Value),
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON document per `\n`-terminated line
    Newline,
    /// `Content-Length: N\r\n\r\n` followed by N bytes
    ContentLength,
}

// State machine for LSP-style headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Head,
    Body(usize),
}

pub struct McpCodec {
    state: DecodeState,
    framing: Framing,
}

impl McpCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DecodeState::Head,
            framing: Framing::Newline,
        }
    }

    /// Framing that the next encoded reply will use.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    fn parse(body: &[u8]) -> Inbound {
        match serde_json::from_slice::<Value>(body) {
            Ok(val) => {
                trace!("Decoded message: {:?}", val);
                Inbound::Message(val)
            }
            Err(e) => Inbound::Malformed(e.to_string()),
        }
    }

    fn decode_header(&mut self, src: &mut BytesMut) -> Result<Option<usize>> {
        let mut i = 0;
        let mut found_header = false;

        // Robust header parsing: scan for \r\n\r\n or \n\n
        while i < src.len() {
            if src[i] == b'\n' {
                if i >= 1 && src[i - 1] == b'\n' {
                    found_header = true;
                    i += 1;
                    break;
                }
                if i >= 3 && src[i - 1] == b'\r' && src[i - 2] == b'\n' && src[i - 3] == b'\r' {
                    found_header = true;
                    i += 1;
                    break;
                }
            }
            i += 1;
        }

        if !found_header {
            if src.len() > limits::MAX_HEADER_BYTES {
                return Err(anyhow!("Header too large"));
            }
            return Ok(None);
        }

        let header_bytes = src.split_to(i);
        let header_str = std::str::from_utf8(&header_bytes).context("Invalid UTF-8 in headers")?;

        let mut len = 0;
        for line in header_str.lines() {
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    len = value
                        .trim()
                        .parse::<usize>()
                        .context("Invalid content-length value")?;
                    debug!("Found Content-Length: {}", len);
                }
            }
        }

        if len == 0 {
            return Err(anyhow!("Missing or invalid Content-Length header"));
        }
        if len as u64 > limits::MAX_MESSAGE_SIZE_BYTES {
            return Err(anyhow!("Message length {} exceeds max limit", len));
        }
        Ok(Some(len))
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        match src.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let line = src.split_to(pos + 1);
                Ok(Some(Self::parse(trim_ascii(&line))))
            }
            None => {
                if src.len() as u64 > limits::MAX_MESSAGE_SIZE_BYTES {
                    return Err(anyhow!(
                        "Message exceeded size limit of {} bytes",
                        limits::MAX_MESSAGE_SIZE_BYTES
                    ));
                }
                Ok(None)
            }
        }
    }
}

impl Default for McpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for McpCodec {
    type Item = Inbound;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        trace!("Decoder attempting to read from {} bytes buffer", src.len());
        loop {
            match self.state {
                DecodeState::Head => {
                    // Blank lines between messages carry nothing in either framing.
                    let skip = src
                        .iter()
                        .take_while(|b| b.is_ascii_whitespace())
                        .count();
                    let _ = src.split_to(skip);
                    if src.is_empty() {
                        return Ok(None);
                    }

                    if starts_with_content_length(src) {
                        match self.decode_header(src)? {
                            Some(len) => {
                                self.framing = Framing::ContentLength;
                                self.state = DecodeState::Body(len);
                            }
                            None => return Ok(None),
                        }
                    } else if is_content_length_prefix(src) {
                        // Could still become a header; wait for more bytes.
                        return Ok(None);
                    } else {
                        let item = self.decode_line(src)?;
                        if item.is_some() {
                            self.framing = Framing::Newline;
                        }
                        return Ok(item);
                    }
                }
                DecodeState::Body(len) => {
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    let body = src.split_to(len);
                    self.state = DecodeState::Head;
                    return Ok(Some(Self::parse(&body)));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        if src.is_empty() {
            return Ok(None);
        }
        match self.state {
            // A final line without its terminator is still a message.
            DecodeState::Head if !starts_with_content_length(src) => {
                let rest = src.split_to(src.len());
                let trimmed = trim_ascii(&rest);
                if trimmed.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Self::parse(trimmed)))
            }
            _ => Err(anyhow!("Stream ended mid-message ({} bytes left)", src.len())),
        }
    }
}

impl<'a> Encoder<&'a Value> for McpCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: &'a Value, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(item)?;
        match self.framing {
            Framing::Newline => {
                dst.reserve(body.len() + 1);
                dst.extend_from_slice(&body);
                dst.extend_from_slice(b"\n");
            }
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", body.len());
                dst.reserve(header.len() + body.len());
                dst.extend_from_slice(header.as_bytes());
                dst.extend_from_slice(&body);
            }
        }
        Ok(())
    }
}

const CONTENT_LENGTH: &[u8] = b"content-length";

fn starts_with_content_length(src: &[u8]) -> bool {
    src.len() >= CONTENT_LENGTH.len() && src[..CONTENT_LENGTH.len()].eq_ignore_ascii_case(CONTENT_LENGTH)
}

fn is_content_length_prefix(src: &[u8]) -> bool {
    src.len() < CONTENT_LENGTH.len() && CONTENT_LENGTH[..src.len()].eq_ignore_ascii_case(src)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

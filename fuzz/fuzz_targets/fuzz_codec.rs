// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use lilith_gateway::mcp::codec::McpCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Any byte sequence must decode to items, wait for more, or fail; never panic.
    let mut codec = McpCodec::new();
    let mut buffer = BytesMut::from(data);

    while let Ok(Some(_)) = codec.decode(&mut buffer) {}
    let _ = codec.decode_eof(&mut buffer);
});

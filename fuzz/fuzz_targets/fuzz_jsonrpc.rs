// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use lilith_gateway::engine::{builtin, dispatch::dispatch};
use lilith_gateway::engine_core::models::{JsonRpcRequest, JsonRpcResponse, RequestContext, TransportKind};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<JsonRpcRequest>(data);
    let _ = serde_json::from_slice::<JsonRpcResponse>(data);

    // Whatever JSON arrives, dispatch answers in-band.
    if let Ok(message) = serde_json::from_slice::<Value>(data) {
        let Ok(handlers) = builtin::handler_set() else { return };
        let rt = tokio::runtime::Builder::new_current_thread().build();
        if let Ok(rt) = rt {
            let ctx = RequestContext::new(None, TransportKind::Stdio);
            let _ = rt.block_on(dispatch(&handlers, message, ctx));
        }
    }
});

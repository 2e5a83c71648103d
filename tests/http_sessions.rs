use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use lilith_gateway::engine::{builtin, HandlerSet, ProtocolEngine};
use lilith_gateway::engine_core::errors::{GatewayError, HandlerError};
use lilith_gateway::engine_core::models::RequestContext;
use lilith_gateway::engine_core::traits::handler_fn;
use lilith_gateway::http::origin::OriginPolicy;
use lilith_gateway::http::{create_router, AppState, HttpMode};
use lilith_gateway::lifecycle::LifecycleController;

const SESSION: &str = "mcp-session-id";

fn handlers() -> Result<HandlerSet, GatewayError> {
    let mut set = builtin::handler_set()?;
    let hits = Arc::new(AtomicU64::new(0));
    set.register(
        "test/counter",
        handler_fn(move |_, _| {
            let hits = hits.clone();
            async move { Ok::<Value, HandlerError>(json!(hits.fetch_add(1, Ordering::SeqCst) + 1)) }
        }),
    )?;
    set.register(
        "test/whoami",
        handler_fn(|_, ctx: RequestContext| async move {
            Ok::<Value, HandlerError>(json!({
                "session": ctx.session_id.map(|id| id.to_string()),
                "transport": ctx.transport,
            }))
        }),
    )?;
    set.register(
        "test/slow",
        handler_fn(|params: Option<Value>, _| async move {
            let ms = params.and_then(|p| p.as_u64()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<Value, HandlerError>(json!(ms))
        }),
    )?;
    set.register(
        "test/panic",
        handler_fn(|params: Option<Value>, _| async move {
            if params.is_none() {
                panic!("boom");
            }
            Ok::<Value, HandlerError>(Value::Null)
        }),
    )?;
    Ok(set)
}

fn app_with(mode: HttpMode, origins: &[&str], max_body: usize) -> (Router, AppState) {
    let engine = ProtocolEngine::new(handlers).unwrap();
    let lifecycle = LifecycleController::new();
    lifecycle.mark_running();
    let state = AppState::new(engine, mode, lifecycle);
    let router = create_router(
        state.clone(),
        Arc::new(OriginPolicy::new(origins.iter().copied())),
        max_body,
    );
    (router, state)
}

fn app(mode: HttpMode) -> (Router, AppState) {
    app_with(mode, &["https://app.example.com"], 1024 * 1024)
}

fn rpc(method: &str, id: u64) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "id": id})
}

fn post(body: &Value, session: Option<&str>, origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(id) = session {
        builder = builder.header(SESSION, id);
    }
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn bare(method: &str, uri: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = session {
        builder = builder.header(SESSION, id);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_id(response: &Response) -> String {
    response
        .headers()
        .get(SESSION)
        .expect("session-affine responses carry the session header")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_session_reuse_and_creation_counter() {
    let (router, state) = app(HttpMode::SessionAffine);

    // S1: no id -> new session
    let first = send(&router, post(&rpc("test/counter", 1), None, None)).await;
    assert_eq!(first.status(), StatusCode::OK);
    let s1 = session_id(&first);
    assert_eq!(json_body(first).await["result"], 1);
    assert_eq!(state.registry.created_total(), 1);

    // Same id -> same session, handler state carried over
    let again = send(&router, post(&rpc("test/counter", 2), Some(&s1), None)).await;
    assert_eq!(session_id(&again), s1);
    assert_eq!(json_body(again).await["result"], 2);
    assert_eq!(state.registry.created_total(), 1);

    // S2: unknown id -> a fresh session with a fresh id
    let unknown = uuid::Uuid::new_v4().to_string();
    let second = send(&router, post(&rpc("test/counter", 3), Some(&unknown), None)).await;
    let s2 = session_id(&second);
    assert_ne!(s2, s1);
    assert_ne!(s2, unknown);
    assert_eq!(json_body(second).await["result"], 1);
    assert_eq!(state.registry.created_total(), 2);
    assert_eq!(state.registry.len(), 2);
}

#[tokio::test]
async fn test_handler_sees_its_session() {
    let (router, _state) = app(HttpMode::SessionAffine);
    let response = send(&router, post(&rpc("test/whoami", 1), None, None)).await;
    let id = session_id(&response);
    let body = json_body(response).await;
    assert_eq!(body["result"]["session"], id);
    assert_eq!(body["result"]["transport"], "http");
}

#[tokio::test]
async fn test_concurrent_requests_without_id_never_share_a_session() {
    let (router, state) = app(HttpMode::SessionAffine);

    let mut tasks = Vec::new();
    for i in 0..12u64 {
        let router = router.clone();
        tasks.push(tokio::spawn(async move {
            let response = router
                .oneshot(post(&rpc("ping", i), None, None))
                .await
                .unwrap();
            session_id(&response)
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap());
    }
    assert_eq!(ids.len(), 12);
    assert_eq!(state.registry.len(), 12);
}

#[tokio::test]
async fn test_concurrent_requests_with_same_id_share_one_session() {
    let (router, state) = app(HttpMode::SessionAffine);
    let first = send(&router, post(&rpc("test/counter", 0), None, None)).await;
    let id = session_id(&first);

    let mut tasks = Vec::new();
    for i in 1..=8u64 {
        let router = router.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let response = router
                .oneshot(post(&rpc("test/counter", i), Some(&id), None))
                .await
                .unwrap();
            assert_eq!(session_id(&response), id);
            json_body(response).await["result"].as_u64().unwrap()
        }));
    }

    let mut counts = Vec::new();
    for task in tasks {
        counts.push(task.await.unwrap());
    }
    counts.sort_unstable();
    // Serialised on one handler set: every count from 2 to 9 exactly once.
    assert_eq!(counts, (2..=9).collect::<Vec<u64>>());
    assert_eq!(state.registry.created_total(), 1);
}

#[tokio::test]
async fn test_forbidden_origin_is_rejected_before_any_session() {
    let (router, state) = app(HttpMode::SessionAffine);

    let response = send(
        &router,
        post(&rpc("ping", 1), None, Some("https://evil.example.com")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(SESSION).is_none());
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
    assert_eq!(json_body(response).await, json!({"error": "Origin not allowed"}));

    assert_eq!(state.registry.len(), 0);
    assert_eq!(state.registry.created_total(), 0);
}

#[tokio::test]
async fn test_allowed_origin_gets_cors_headers() {
    let (router, _state) = app(HttpMode::SessionAffine);
    let response = send(
        &router,
        post(&rpc("ping", 1), None, Some("https://app.example.com")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://app.example.com"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_EXPOSE_HEADERS).unwrap(),
        SESSION
    );
    assert!(headers.get(SESSION).is_some());
}

#[tokio::test]
async fn test_preflight() {
    let (router, state) = app(HttpMode::SessionAffine);

    let allowed = Request::builder()
        .method("OPTIONS")
        .uri("/mcp")
        .header(header::ORIGIN, "https://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, allowed).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let methods = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("POST") && methods.contains("DELETE"));

    let denied = Request::builder()
        .method("OPTIONS")
        .uri("/mcp")
        .header(header::ORIGIN, "https://evil.example.com")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&router, denied).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(state.registry.created_total(), 0);
}

#[tokio::test]
async fn test_concurrent_stateless_requests_leave_registry_untouched() {
    let (router, state) = app(HttpMode::Stateless);

    let mut tasks = Vec::new();
    for i in 0..24u64 {
        let router = router.clone();
        tasks.push(tokio::spawn(async move {
            let response = router
                .oneshot(post(&rpc("test/counter", i), None, None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(SESSION).is_none());
            json_body(response).await
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        let body = task.await.unwrap();
        assert_eq!(body["id"], i as u64);
        // Fresh handler set per request
        assert_eq!(body["result"], 1);
    }

    assert_eq!(state.registry.len(), 0);
    assert_eq!(state.registry.created_total(), 0);
}

#[tokio::test]
async fn test_stateless_ignores_session_header() {
    let (router, state) = app(HttpMode::Stateless);
    let response = send(
        &router,
        post(&rpc("test/whoami", 1), Some("2b0c6c8e-0d3e-4d8a-9f57-0b7f4a3e2d10"), None),
    )
    .await;
    assert!(response.headers().get(SESSION).is_none());
    let body = json_body(response).await;
    assert_eq!(body["result"]["session"], Value::Null);
    assert_eq!(body["result"]["transport"], "stateless-http");
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn test_notification_is_accepted() {
    let (router, _state) = app(HttpMode::SessionAffine);
    let response = send(
        &router,
        post(
            &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.headers().get(SESSION).is_some());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_malformed_body_gets_parse_error_and_session_survives() {
    let (router, state) = app(HttpMode::SessionAffine);
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .body(Body::from("{not json"))
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = session_id(&response);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);

    let response = send(&router, post(&rpc("ping", 2), Some(&id), None)).await;
    assert_eq!(session_id(&response), id);
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn test_batch_request() {
    let (router, _state) = app(HttpMode::SessionAffine);
    let batch = json!([
        rpc("ping", 1),
        {"jsonrpc": "2.0", "method": "notifications/initialized"},
        rpc("nope", 2)
    ]);
    let response = send(&router, post(&batch, None, None)).await;
    let body = json_body(response).await;
    let replies = body.as_array().unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[1]["error"]["code"], -32601);
}

#[tokio::test]
async fn test_delete_terminates_session() {
    let (router, state) = app(HttpMode::SessionAffine);
    let created = send(&router, post(&rpc("ping", 1), None, None)).await;
    let id = session_id(&created);

    let deleted = send(&router, bare("DELETE", "/mcp", Some(&id))).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.registry.len(), 0);
    assert_eq!(state.registry.closed_total(), 1);

    let again = send(&router, bare("DELETE", "/mcp", Some(&id))).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let missing = send(&router, bare("DELETE", "/mcp", None)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    // The old id is never revived.
    let next = send(&router, post(&rpc("ping", 2), Some(&id), None)).await;
    assert_ne!(session_id(&next), id);
}

#[tokio::test]
async fn test_stateless_rejects_get_and_delete() {
    let (router, _state) = app(HttpMode::Stateless);
    assert_eq!(
        send(&router, bare("GET", "/mcp", None)).await.status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
    assert_eq!(
        send(&router, bare("DELETE", "/mcp", None)).await.status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
}

#[tokio::test]
async fn test_event_stream_lives_with_the_session() {
    let (router, state) = app(HttpMode::SessionAffine);

    let stream = send(&router, bare("GET", "/mcp", None)).await;
    assert_eq!(stream.status(), StatusCode::OK);
    assert!(stream
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let id = session_id(&stream);
    assert_eq!(state.registry.len(), 1);

    // The same session is reachable over POST while the stream is open.
    let reply = send(&router, post(&rpc("ping", 1), Some(&id), None)).await;
    assert_eq!(session_id(&reply), id);

    // Client goes away: the session goes with it.
    drop(stream);
    assert_eq!(state.registry.len(), 0);
    assert_eq!(state.registry.closed_total(), 1);
}

#[tokio::test]
async fn test_dropped_post_closes_session() {
    let (router, state) = app(HttpMode::SessionAffine);
    let opened = send(&router, post(&rpc("ping", 1), None, None)).await;
    let id = session_id(&opened);
    assert_eq!(state.registry.len(), 1);

    // Client gives up on a slow call before the reply is ready.
    let slow = json!({"jsonrpc": "2.0", "method": "test/slow", "params": 5000, "id": 2});
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        send(&router, post(&slow, Some(&id), None)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(state.registry.len(), 0);
    assert_eq!(state.registry.closed_total(), 1);

    // The old id is gone; the next request is handed a fresh one.
    let next = send(&router, post(&rpc("ping", 3), Some(&id), None)).await;
    assert_eq!(next.status(), StatusCode::OK);
    assert_ne!(session_id(&next), id);
    assert_eq!(state.registry.created_total(), 2);
}

#[tokio::test]
async fn test_panicking_handler_keeps_session_open() {
    let (router, state) = app(HttpMode::SessionAffine);
    let first = send(&router, post(&rpc("test/counter", 1), None, None)).await;
    let id = session_id(&first);
    assert_eq!(json_body(first).await["result"], 1);

    let crashed = send(&router, post(&rpc("test/panic", 2), Some(&id), None)).await;
    assert_eq!(crashed.status(), StatusCode::OK);
    assert_eq!(session_id(&crashed), id);
    let body = json_body(crashed).await;
    assert_eq!(body["error"]["code"], -32603);
    assert_eq!(body["error"]["message"], "Internal error");
    assert_eq!(body["id"], 2);
    assert!(!body.to_string().contains("boom"));

    // Same session, handler state intact.
    let after = send(&router, post(&rpc("test/counter", 3), Some(&id), None)).await;
    assert_eq!(session_id(&after), id);
    assert_eq!(json_body(after).await["result"], 2);
    assert_eq!(state.registry.created_total(), 1);
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (router, state) = app_with(HttpMode::SessionAffine, &[], 64);
    let body = json!({"jsonrpc": "2.0", "method": "ping", "params": {"pad": "x".repeat(256)}, "id": 1})
        .to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(state.registry.created_total(), 0);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let (router, _state) = app(HttpMode::SessionAffine);
    let response = send(&router, post(&rpc("ping", 1), None, None)).await;
    assert!(response.headers().get("x-request-id").is_some());

    let mut request = post(&rpc("ping", 2), None, None);
    request
        .headers_mut()
        .insert("x-request-id", "trace-me".parse().unwrap());
    let response = send(&router, request).await;
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-me");
}

#[tokio::test]
async fn test_health_reports_sessions() {
    let (router, _state) = app(HttpMode::SessionAffine);
    send(&router, post(&rpc("ping", 1), None, None)).await;
    send(&router, post(&rpc("ping", 2), None, None)).await;

    // Health is not origin-checked.
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "https://evil.example.com")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mode"], "http");
    assert_eq!(body["lifecycle"], "running");
    assert_eq!(body["active_sessions"], 2);
    assert_eq!(body["sessions_created"], 2);
    assert_eq!(body["sessions_closed"], 0);
}

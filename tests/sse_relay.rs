//! Event relay integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use llm_gateway::config::GatewayConfig;
use llm_gateway::http::HttpServer;
use llm_gateway::lifecycle::Shutdown;

mod common;

async fn spawn_gateway(config: GatewayConfig, proxy_addr: SocketAddr) -> Shutdown {
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let listener = tokio::net::TcpListener::bind(proxy_addr).await.unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_events_forwarded_in_order_until_sentinel() {
    let upstream_addr: SocketAddr = "127.0.0.1:31181".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:31182".parse().unwrap();

    common::start_sse_upstream(
        upstream_addr,
        vec![r#"{"delta":"hel"}"#, r#"{"delta":"lo"}"#, "[DONE]"],
    )
    .await;

    let mut config = GatewayConfig::default();
    config.listener.bind_address = proxy_addr.to_string();
    config.upstreams.openai = format!("http://{}/v1", upstream_addr);

    let shutdown = spawn_gateway(config, proxy_addr).await;

    let res = client()
        .post(format!("http://{}/openai/v1/chat/completions", proxy_addr))
        .header("authorization", "Bearer sk-test")
        .body(r#"{"model":"gpt-4o","stream":true}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    // The body ends when the relay closes the client connection after the
    // sentinel; a hang here would mean the stream was never finalized.
    let body = tokio::time::timeout(Duration::from_secs(5), res.text())
        .await
        .expect("stream never closed")
        .unwrap();

    let first = body.find(r#"data: {"delta":"hel"}"#).expect("first event");
    let second = body.find(r#"data: {"delta":"lo"}"#).expect("second event");
    let done = body.find("data: [DONE]").expect("sentinel forwarded");
    assert!(first < second && second < done, "events out of order: {}", body);

    shutdown.trigger();
}

#[tokio::test]
async fn test_stream_ends_on_clean_upstream_close() {
    let upstream_addr: SocketAddr = "127.0.0.1:31281".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:31282".parse().unwrap();

    // No sentinel: the upstream just closes after two events.
    common::start_sse_upstream(upstream_addr, vec![r#"{"n":1}"#, r#"{"n":2}"#]).await;

    let mut config = GatewayConfig::default();
    config.listener.bind_address = proxy_addr.to_string();
    config.upstreams.openrouter = format!("http://{}/v1", upstream_addr);

    let shutdown = spawn_gateway(config, proxy_addr).await;

    let res = client()
        .post(format!(
            "http://{}/openrouter/v1/chat/completions",
            proxy_addr
        ))
        .header("authorization", "Bearer sk-test")
        .body(r#"{"stream":true}"#)
        .send()
        .await
        .unwrap();

    let body = tokio::time::timeout(Duration::from_secs(5), res.text())
        .await
        .expect("stream never closed")
        .unwrap();
    assert!(body.contains(r#"data: {"n":1}"#));
    assert!(body.contains(r#"data: {"n":2}"#));

    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_stream_error_mirrored_as_buffered_reply() {
    let upstream_addr: SocketAddr = "127.0.0.1:31381".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:31382".parse().unwrap();

    // The upstream answers the streamed call with a plain application error.
    common::start_mock_upstream(upstream_addr, 429, r#"{"error":"quota"}"#).await;

    let mut config = GatewayConfig::default();
    config.listener.bind_address = proxy_addr.to_string();
    config.upstreams.openai = format!("http://{}/v1", upstream_addr);

    let shutdown = spawn_gateway(config, proxy_addr).await;

    let res = client()
        .post(format!("http://{}/openai/v1/chat/completions", proxy_addr))
        .header("authorization", "Bearer sk-test")
        .body(r#"{"stream":true}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 429);
    assert_eq!(res.text().await.unwrap(), r#"{"error":"quota"}"#);

    shutdown.trigger();
}

#[tokio::test]
async fn test_google_stream_generate_content() {
    let upstream_addr: SocketAddr = "127.0.0.1:31481".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:31482".parse().unwrap();

    common::start_sse_upstream(upstream_addr, vec![r#"{"candidates":[]}"#, "[DONE]"]).await;

    let mut config = GatewayConfig::default();
    config.listener.bind_address = proxy_addr.to_string();
    config.upstreams.gemini = format!("http://{}/v1beta/models/", upstream_addr);

    let shutdown = spawn_gateway(config, proxy_addr).await;

    // The URL suffix alone selects streaming for Gemini; no body flag.
    let res = client()
        .post(format!(
            "http://{}/google/v1beta/models/gemini-2.0-flash:streamGenerateContent?key=AIza",
            proxy_addr
        ))
        .body(r#"{"contents":[]}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    let body = tokio::time::timeout(Duration::from_secs(5), res.text())
        .await
        .expect("stream never closed")
        .unwrap();
    assert!(body.contains(r#"data: {"candidates":[]}"#));

    shutdown.trigger();
}

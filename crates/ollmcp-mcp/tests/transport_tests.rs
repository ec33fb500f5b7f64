//! Network transports against local HTTP servers.

use ollmcp_mcp::protocol::{JsonRpcNotification, JsonRpcRequest};
use ollmcp_mcp::{HttpConfig, HttpTransport, SseConfig, SseTransport, Transport};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_transport(url: String) -> HttpTransport {
    HttpTransport::new(HttpConfig {
        url,
        timeout_secs: 5,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn http_echoes_session_id_and_reads_event_stream_bodies() {
    let server = MockServer::start().await;
    let framed = format!(
        "event: message\ndata: {}\n\n",
        json!({"jsonrpc": "2.0", "id": 1, "result": {"first": true}})
    );
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_string_contains("\"initialize\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Mcp-Session-Id", "s-1")
                .set_body_raw(framed, "text/event-stream"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "s-1"))
        .and(body_string_contains("\"tools/list\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"jsonrpc": "2.0", "id": 2, "result": {"second": true}}),
        ))
        .mount(&server)
        .await;

    let transport = http_transport(format!("{}/mcp", server.uri()));

    let first = transport
        .request(JsonRpcRequest::new(1, "initialize", Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(first.id, 1);
    assert_eq!(first.result, Some(json!({"first": true})));
    assert!(transport.is_connected());

    let second = transport
        .request(JsonRpcRequest::new(2, "tools/list", None))
        .await
        .unwrap();
    assert_eq!(second.result, Some(json!({"second": true})));
}

#[tokio::test]
async fn http_event_stream_skips_unrelated_events() {
    let server = MockServer::start().await;
    let framed = format!(
        "event: message\ndata: {}\n\nevent: message\ndata: {}\n\n",
        json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}}),
        json!({"jsonrpc": "2.0", "id": 4, "result": {"tools": []}})
    );
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(framed, "text/event-stream"))
        .mount(&server)
        .await;

    let transport = http_transport(server.uri());
    let response = transport
        .request(JsonRpcRequest::new(4, "tools/list", None))
        .await
        .unwrap();
    assert_eq!(response.result, Some(json!({"tools": []})));
}

#[tokio::test]
async fn http_error_statuses_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"secret\""))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let transport = http_transport(server.uri());

    let err = transport
        .request(JsonRpcRequest::new(1, "secret", None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("authentication"));

    let err = transport
        .request(JsonRpcRequest::new(2, "tools/list", None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn sse_connect_resolves_endpoint_and_notices_stream_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "event: endpoint\ndata: /messages?session=9\n\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let transport = SseTransport::connect(
        SseConfig {
            url: format!("{}/sse", server.uri()),
            timeout_secs: 5,
            ..Default::default()
        },
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert_eq!(
        transport.endpoint(),
        format!("{}/messages?session=9", server.uri())
    );

    for _ in 0..50 {
        if !transport.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!transport.is_connected());

    let err = transport
        .request(JsonRpcRequest::new(1, "tools/list", None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("closed"));
}

#[tokio::test]
async fn sse_stream_without_endpoint_fails_to_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "event: message\ndata: {}\n\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let result = SseTransport::connect(
        SseConfig {
            url: server.uri(),
            ..Default::default()
        },
        Duration::from_secs(5),
    )
    .await;
    let err = result.err().unwrap();
    assert!(err.to_string().contains("endpoint"));
}

/// Read one HTTP/1.1 request, returning its head and body. `None` when the
/// client hangs up first.
async fn read_request(stream: &mut TcpStream) -> Option<(String, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let mut body = buf[end + 4..].to_vec();
            while body.len() < length {
                let n = stream.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                body.extend_from_slice(&chunk[..n]);
            }
            return Some((head, String::from_utf8_lossy(&body).to_string()));
        }
    }
}

/// A live SSE server: replies on the event stream to every POSTed request
/// except those whose method is `hang`.
async fn start_sse_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (mut events, _) = listener.accept().await.unwrap();
        let (head, _) = read_request(&mut events).await.unwrap();
        assert!(head.starts_with("GET /sse"));
        events
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\r\n\
                  event: endpoint\ndata: /messages?session=7\n\n",
            )
            .await
            .unwrap();

        loop {
            let (mut post, _) = listener.accept().await.unwrap();
            let Some((head, body)) = read_request(&mut post).await else {
                continue;
            };
            post.write_all(
                b"HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            )
            .await
            .unwrap();

            let Ok(message) = serde_json::from_str::<Value>(&body) else {
                continue;
            };
            let (Some(id), Some(name)) = (message.get("id"), message["method"].as_str()) else {
                continue;
            };
            if name == "hang" {
                continue;
            }
            let target = head.lines().next().unwrap_or_default().to_string();
            let reply = json!({"jsonrpc": "2.0", "id": id, "result": {"method": name, "target": target}});
            events
                .write_all(format!("event: message\ndata: {reply}\n\n").as_bytes())
                .await
                .unwrap();
        }
    });

    base
}

async fn connect_live(base: &str) -> SseTransport {
    SseTransport::connect(
        SseConfig {
            url: format!("{base}/sse"),
            timeout_secs: 5,
            ..Default::default()
        },
        Duration::from_secs(5),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn sse_routes_stream_messages_to_their_requests() {
    let base = start_sse_server().await;
    let transport = connect_live(&base).await;
    assert_eq!(transport.endpoint(), format!("{base}/messages?session=7"));

    let first = transport
        .request(JsonRpcRequest::new(1, "initialize", Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(first.id, 1);
    let result = first.result.unwrap();
    assert_eq!(result["method"], "initialize");
    assert!(result["target"]
        .as_str()
        .unwrap()
        .starts_with("POST /messages?session=7"));

    transport
        .notify(JsonRpcNotification::new("notifications/initialized", None))
        .await
        .unwrap();

    let second = transport
        .request(JsonRpcRequest::new(2, "tools/list", None))
        .await
        .unwrap();
    assert_eq!(second.id, 2);
    assert_eq!(second.result.unwrap()["method"], "tools/list");
    assert_eq!(transport.pending_requests(), 0);

    transport.close().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn sse_abandoned_request_leaves_no_pending_entry() {
    let base = start_sse_server().await;
    let transport = connect_live(&base).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(200),
        transport.request(JsonRpcRequest::new(1, "hang", None)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(transport.pending_requests(), 0);

    let answered = transport
        .request(JsonRpcRequest::new(2, "tools/list", None))
        .await
        .unwrap();
    assert_eq!(answered.id, 2);
}

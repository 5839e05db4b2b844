//! Tool gateway against a loopback controller stub.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use voicebridge_call_engine::{CallerProfile, HaClient, ToolCatalog, ToolGateway};

const TOOLS_YAML: &str = r#"
tools:
  open_door:
    description: "Open the apartment door"
    ha_service: script.open_door
    requires_pin: true
  toggle_light:
    description: "Toggle a light"
    ha_service: light.toggle
    parameters:
      entity_id:
        type: string
        description: "Light entity"
        required: true
"#;

struct RecordedRequest {
    path: String,
    body: String,
    has_bearer: bool,
}

/// Minimal HTTP/1.1 stub: records each request and answers with a
/// fixed status and JSON body.
async fn controller_stub(
    status_line: &'static str,
    response_body: &'static str,
) -> (String, mpsc::UnboundedReceiver<RecordedRequest>, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (record_tx, record_rx) = mpsc::unbounded_channel();
    let hits = Arc::new(AtomicUsize::new(0));
    let hit_counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            hit_counter.fetch_add(1, Ordering::SeqCst);

            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            let (head, body_start) = loop {
                let n = stream.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break (String::new(), 0);
                }
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = find_header_end(&raw) {
                    break (String::from_utf8_lossy(&raw[..pos]).to_string(), pos + 4);
                }
            };
            if head.is_empty() {
                continue;
            }

            let content_length: usize = head
                .lines()
                .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            while raw.len() < body_start + content_length {
                let n = stream.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let body = String::from_utf8_lossy(&raw[body_start..]).to_string();
            let path = head
                .lines()
                .next()
                .and_then(|l| l.split_whitespace().nth(1))
                .unwrap_or_default()
                .to_string();
            let has_bearer = head
                .lines()
                .any(|l| l.to_ascii_lowercase().starts_with("authorization: bearer "));

            let _ = record_tx.send(RecordedRequest {
                path,
                body,
                has_bearer,
            });

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response_body}",
                response_body.len(),
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (base_url, record_rx, hits)
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

fn gateway(base_url: &str) -> ToolGateway {
    let catalog = Arc::new(ToolCatalog::from_yaml(TOOLS_YAML).unwrap());
    let ha = Arc::new(HaClient::new(base_url, "test-token").unwrap());
    ToolGateway::new(catalog, ha)
}

fn profile(pin: Option<i64>) -> CallerProfile {
    CallerProfile {
        available_tools: vec!["open_door".into(), "toggle_light".into()],
        pin,
        ..CallerProfile::default()
    }
}

#[tokio::test]
async fn correct_pin_invokes_script_with_empty_body() {
    let (base_url, mut requests, _) = controller_stub("200 OK", "[]").await;
    let gateway = gateway(&base_url);

    let result = gateway
        .invoke(
            &profile(Some(11833)),
            "open_door",
            serde_json::json!({ "pin": 11833, "entity_id": "script.open_door" }),
        )
        .await;

    assert_eq!(result["success"], true);

    let request = tokio::time::timeout(Duration::from_secs(2), requests.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.path, "/services/script/open_door");
    assert!(request.has_bearer);
    // Scripts take no entity_id and the pin never reaches the wire.
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn wrong_pin_never_reaches_the_controller() {
    let (base_url, _requests, hits) = controller_stub("200 OK", "[]").await;
    let gateway = gateway(&base_url);

    let result = gateway
        .invoke(
            &profile(Some(11833)),
            "open_door",
            serde_json::json!({ "pin": 9999 }),
        )
        .await;

    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "PIN_INCORRECT");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0, "no REST call may be issued");
}

#[tokio::test]
async fn unknown_tool_is_rejected_locally() {
    let (base_url, _requests, hits) = controller_stub("200 OK", "[]").await;
    let gateway = gateway(&base_url);

    let result = gateway
        .invoke(&profile(None), "self_destruct", serde_json::json!({}))
        .await;

    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "unknown tool");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ungated_tool_passes_declared_arguments() {
    let (base_url, mut requests, _) = controller_stub("200 OK", r#"[{"entity_id":"light.k"}]"#).await;
    let gateway = gateway(&base_url);

    let result = gateway
        .invoke(
            &profile(None),
            "toggle_light",
            serde_json::json!({ "entity_id": "light.kitchen", "bogus": 1 }),
        )
        .await;

    assert_eq!(result["success"], true);
    assert!(result["result"].is_array());

    let request = tokio::time::timeout(Duration::from_secs(2), requests.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.path, "/services/light/toggle");
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["entity_id"], "light.kitchen");
    assert!(body.get("bogus").is_none());
}

#[tokio::test]
async fn get_state_queries_the_entity_route() {
    let (base_url, mut requests, _) =
        controller_stub("200 OK", r#"{"entity_id":"light.kitchen","state":"on"}"#).await;
    let ha = HaClient::new(&base_url, "test-token").unwrap();

    let state = ha.get_state("light.kitchen").await.unwrap();
    assert_eq!(state["state"], "on");

    let request = tokio::time::timeout(Duration::from_secs(2), requests.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.path, "/states/light.kitchen");
    assert!(request.has_bearer);
}

#[tokio::test]
async fn controller_failure_is_surfaced_as_tool_error() {
    let (base_url, _requests, _) = controller_stub("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
    let gateway = gateway(&base_url);

    let result = gateway
        .invoke(
            &profile(None),
            "toggle_light",
            serde_json::json!({ "entity_id": "light.kitchen" }),
        )
        .await;

    assert_eq!(result["success"], false);
    assert_eq!(result["error"], "controller returned 500");
    assert!(result["message"].as_str().unwrap().contains("boom"));
}

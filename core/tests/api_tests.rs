/// Messenger API tests
/// Real HTTP/1.1 over a local socket against a temporary store

extern crate wachat_core;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::json;
use std::fs;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::net::TcpListener;
use wachat_core::messenger_api::serve;
use wachat_core::{ChatService, Config, MessageStore};

async fn start(config: Config) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = ChatService::new(MessageStore::temporary().unwrap(), config);
    tokio::spawn(async move { serve(listener, service).await });
    addr
}

async fn call(addr: SocketAddr, method: Method, path: &str, body: &str) -> (u16, serde_json::Value) {
    let resp = Client::new()
        .request(method, format!("http://{}{}", addr, path))
        .header(CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(serde_json::Value::Null))
}

fn message_payload(id: &str, wa_id: &str, name: &str, ts: i64) -> serde_json::Value {
    json!({
        "metaData": { "entry": [{ "changes": [{ "value": {
            "contacts": [{ "profile": { "name": name }, "wa_id": wa_id }],
            "messages": [{ "from": wa_id, "id": id, "timestamp": ts.to_string(), "text": { "body": "hi" }, "type": "text" }],
            "metadata": { "display_phone_number": "918329446654", "phone_number_id": "629305560276479" }
        } }] }] },
        "createdAt": "2025-06-30T11:57:00Z"
    })
}

#[tokio::test]
async fn test_compose_over_http() {
    let addr = start(Config::default()).await;

    let (status, created) = call(
        addr,
        Method::POST,
        "/api/messages",
        r#"{"text":"hello","wa_id":"911234","contact_name":"Alice"}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(created["isIncoming"], false);
    assert_eq!(created["status"], "sent");
    assert_eq!(created["text"], "hello");
    assert_eq!(created["wa_id"], "911234");
    assert_eq!(created["from"], "918329446654");

    let (status, messages) = call(addr, Method::GET, "/api/messages?wa_id=911234", "").await;
    assert_eq!(status, 200);
    assert_eq!(messages.as_array().unwrap().len(), 1);

    let (status, err) = call(addr, Method::POST, "/api/messages", r#"{"wa_id":"911234"}"#).await;
    assert_eq!(status, 400);
    assert!(err["error"].as_str().unwrap().contains("text"));
}

#[tokio::test]
async fn test_process_payloads_over_http() {
    let data = TempDir::new().unwrap();
    fs::write(
        data.path().join("conversation_1_message_1.json"),
        message_payload("wamid.1", "919937320320", "Ravi Kumar", 1_754_400_000).to_string(),
    )
    .unwrap();
    fs::write(
        data.path().join("conversation_2_message_1.json"),
        message_payload("wamid.2", "929967673820", "Neha Joshi", 1_754_401_000).to_string(),
    )
    .unwrap();

    let config = Config {
        payload_dir: data.path().to_path_buf(),
        ..Config::default()
    };
    let addr = start(config).await;

    let (status, report) = call(addr, Method::POST, "/api/process-payloads", "").await;
    assert_eq!(status, 200);
    assert_eq!(report["success"], true);
    assert_eq!(report["processedMessages"], 2);
    assert_eq!(report["updatedStatuses"], 0);
    assert_eq!(report["totalMessages"], 2);
    assert_eq!(report["conversationsCount"], 2);

    let (_, convs) = call(addr, Method::GET, "/api/messages", "").await;
    let convs = convs.as_array().unwrap();
    assert_eq!(convs.len(), 2);
    assert_eq!(convs[0]["wa_id"], "929967673820");
    assert_eq!(convs[0]["unreadCount"], 1);

    let (_, status_body) = call(addr, Method::GET, "/api/status", "").await;
    assert_eq!(status_body["totalMessages"], 2);
}

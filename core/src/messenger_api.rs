/// Messenger REST API — HTTP server for the chat frontend
///
/// Endpoints:
///   GET  /api/messages                  conversation list
///   GET  /api/messages?wa_id=<id>       messages of one conversation, oldest first
///   POST /api/messages                  body: {"text":"...","wa_id":"...","contact_name":"..."}
///   POST /api/process-payloads          ingest the configured payload directory
///   GET  /api/status                    store counts
use crate::error::{ChatError, Result};
use crate::service::{ChatService, SendRequest};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE,
};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

// ─── Type alias ──────────────────────────────────────────────────────────────

type BoxBody = http_body_util::combinators::BoxBody<bytes::Bytes, Infallible>;
pub type Resp = Response<BoxBody>;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn cors_headers(builder: http::response::Builder) -> http::response::Builder {
    builder
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
        .header(ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
}

fn json_resp(status: StatusCode, body: Vec<u8>) -> Resp {
    cors_headers(Response::builder())
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(bytes::Bytes::from(body)).boxed())
        .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new()).boxed()))
}

fn json_ok<T: Serialize>(value: &T) -> Resp {
    match serde_json::to_vec(value) {
        Ok(body) => json_resp(StatusCode::OK, body),
        Err(e) => json_err(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn json_err(status: StatusCode, msg: &str) -> Resp {
    json_resp(
        status,
        serde_json::to_vec(&serde_json::json!({ "error": msg })).unwrap_or_default(),
    )
}

fn error_resp(e: &ChatError) -> Resp {
    let status = match e {
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", e);
    }
    json_err(status, &e.to_string())
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub async fn start_messenger_api(service: ChatService, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(ChatError::Io)?;
    info!("Messenger API started on http://{}", listener.local_addr()?);
    serve(listener, service).await
}

/// Accept connections on an already bound listener until the task is dropped
pub async fn serve(listener: TcpListener, service: ChatService) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("API client connected from {}", peer);
                let io = TokioIo::new(stream);
                let service = service.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let service = service.clone();
                        async move { Ok::<_, Infallible>(handle(req, service).await) }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        if !e.is_incomplete_message() {
                            error!("Messenger API connection error: {:?}", e);
                        }
                    }
                });
            }
            Err(e) => error!("Messenger API accept error: {}", e),
        }
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

async fn handle(req: Request<hyper::body::Incoming>, service: ChatService) -> Resp {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    let body = match req.collect().await {
        Ok(c) => c.to_bytes(),
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("body read error: {}", e)),
    };

    dispatch(&method, &path, &query, &body, &service).await
}

/// Route one request. Split from the hyper plumbing so it can be driven
/// without a socket.
pub async fn dispatch(
    method: &Method,
    path: &str,
    query: &str,
    body: &[u8],
    service: &ChatService,
) -> Resp {
    // CORS preflight
    if *method == Method::OPTIONS {
        return cors_headers(Response::builder())
            .status(StatusCode::NO_CONTENT)
            .body(Full::new(bytes::Bytes::new()).boxed())
            .unwrap_or_else(|_| Response::new(Full::new(bytes::Bytes::new()).boxed()));
    }

    match (method.clone(), path) {
        (Method::GET, "/api/messages") => match query_param(query, "wa_id") {
            Some(wa_id) if !wa_id.is_empty() => get_messages(&wa_id, service),
            _ => get_conversations(service),
        },
        (Method::POST, "/api/messages") => post_message(body, service),
        (Method::POST, "/api/process-payloads") => post_process_payloads(service).await,
        (Method::GET, "/api/status") => get_status(service),
        _ => json_err(StatusCode::NOT_FOUND, "not found"),
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

fn get_conversations(service: &ChatService) -> Resp {
    match service.list_conversations() {
        Ok(convs) => json_ok(&convs),
        Err(e) => error_resp(&e),
    }
}

fn get_messages(wa_id: &str, service: &ChatService) -> Resp {
    match service.list_messages(wa_id) {
        Ok(messages) => json_ok(&messages),
        Err(e) => error_resp(&e),
    }
}

fn post_message(body: &[u8], service: &ChatService) -> Resp {
    let req: SendRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return json_err(StatusCode::BAD_REQUEST, &format!("invalid JSON: {}", e)),
    };
    match service.send_message(&req) {
        Ok(record) => json_ok(&record),
        Err(e) => error_resp(&e),
    }
}

async fn post_process_payloads(service: &ChatService) -> Resp {
    let service = service.clone();
    let result = tokio::task::spawn_blocking(move || service.ingest()).await;
    match result {
        Ok(Ok(report)) => {
            let mut v = serde_json::to_value(&report).unwrap_or_default();
            v["success"] = serde_json::Value::Bool(true);
            json_ok(&v)
        }
        Ok(Err(e)) => error_resp(&e),
        Err(e) => json_err(StatusCode::INTERNAL_SERVER_ERROR, &format!("ingestion task failed: {}", e)),
    }
}

fn get_status(service: &ChatService) -> Resp {
    let store = service.store();
    match store.conversation_count() {
        Ok(conversations) => json_ok(&serde_json::json!({
            "totalMessages": store.count(),
            "conversationsCount": conversations,
        })),
        Err(e) => error_resp(&e),
    }
}

// ─── Utilities ────────────────────────────────────────────────────────────────

fn query_param(query: &str, key: &str) -> Option<String> {
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                return Some(
                    urlencoding::decode(v)
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| v.to_string()),
                );
            }
        }
    }
    None
}

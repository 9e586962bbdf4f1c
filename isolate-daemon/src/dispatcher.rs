//! Routes incoming native HTTP requests and WebSocket events into a guest's
//! registered `serve({fetch, websocket})` handlers (spec.md §4.6). Shared by
//! `http_forward` (the real external listener) and available to anything
//! else that wants to drive a dispatch without going through axum.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use isolate_bridge::globals::websocket::WsOutboundCommand;
use isolate_protocol::{MarshalledValue, WsConnectionId};
use tokio::sync::mpsc;

use crate::error::DaemonError;
use crate::json_bridge::{from_json, to_json};
use crate::state::DaemonState;
use crate::worker::WorkerCommand;

/// The marshalled `Response` a guest's `serve.fetch` handler produced.
pub struct DispatchedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Dispatches one HTTP request into `isolate_id`'s `serve.fetch` handler
/// (spec.md §4.6 "HTTP"). Bodies that arrived already streamed are
/// collected up front -- full `ReadableStream` pass-through into the guest
/// request is future work (see DESIGN.md).
pub async fn dispatch_http(
    state: &DaemonState,
    isolate_id: &str,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Bytes,
) -> Result<DispatchedResponse, DaemonError> {
    let mut header_fields = BTreeMap::new();
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            header_fields.insert(name.as_str().to_owned(), MarshalledValue::String(value.to_owned()));
        }
    }

    let mut request_fields = BTreeMap::new();
    request_fields.insert("method".to_owned(), MarshalledValue::String(method.as_str().to_owned()));
    request_fields.insert("url".to_owned(), MarshalledValue::String(url));
    request_fields.insert("headers".to_owned(), MarshalledValue::record(header_fields));
    if !body.is_empty() {
        request_fields.insert("body".to_owned(), MarshalledValue::bytes(body.to_vec()));
    }
    let request = to_json(&MarshalledValue::record(request_fields));

    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .worker
        .send(WorkerCommand::DispatchFetch {
            isolate_id: isolate_id.to_owned(),
            request,
            reply: tx,
        })
        .await?;
    let value = rx.await.map_err(|_| DaemonError::WorkerGone)??;
    read_response(&from_json(&value))
}

fn read_response(value: &MarshalledValue) -> Result<DispatchedResponse, DaemonError> {
    let MarshalledValue::Record(fields) = value else {
        return Err(DaemonError::Protocol("serve.fetch handler must return a Response-shaped record".to_owned()));
    };

    let status = match fields.get("status") {
        Some(MarshalledValue::Number(n)) => {
            StatusCode::from_u16(*n as u16).map_err(|_| DaemonError::Protocol(format!("invalid status code {n}")))?
        }
        _ => StatusCode::OK,
    };

    let mut headers = HeaderMap::new();
    if let Some(MarshalledValue::Record(header_fields)) = fields.get("headers") {
        for (name, value) in header_fields {
            if let MarshalledValue::String(value) = value {
                if let (Ok(name), Ok(value)) = (
                    axum::http::HeaderName::try_from(name.as_str()),
                    axum::http::HeaderValue::try_from(value.as_str()),
                ) {
                    headers.insert(name, value);
                }
            }
        }
    }

    let body = match fields.get("body") {
        Some(MarshalledValue::String(text)) => Bytes::from(text.clone().into_bytes()),
        Some(MarshalledValue::Bytes { bytes, offset, length }) => {
            Bytes::copy_from_slice(&bytes[*offset..*offset + *length])
        }
        _ => Bytes::new(),
    };

    Ok(DispatchedResponse { status, headers, body })
}

/// One inbound WebSocket event forwarded into the guest (spec.md §4.6
/// "WebSocket"). `Open`/`Close` carry no payload of their own; `Message`
/// mirrors the wire's text/binary distinction.
pub enum WsEvent {
    Open,
    Message { text: Option<String>, binary: Option<Vec<u8>> },
    Close { code: u16, reason: String },
}

/// Dispatches one WS lifecycle event into `isolate_id`'s `serve.websocket`
/// handlers. Outbound traffic no longer rides the handler's return value:
/// a handler pushes through the `ws` argument it is passed (`ws.send`/
/// `ws.close`, backed by `op_ws_send_text`/`op_ws_send_binary`/`op_ws_close`
/// against whichever connection's sender is registered in
/// `register_ws_connection`), which is what lets one connection's handler
/// reach a *different* connection -- the two-user chat scenario.
pub async fn dispatch_ws(
    state: &DaemonState,
    isolate_id: &str,
    connection_id: WsConnectionId,
    event: WsEvent,
) -> Result<(), DaemonError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let command = match event {
        WsEvent::Open => WorkerCommand::DispatchWsOpen {
            isolate_id: isolate_id.to_owned(),
            args: vec![serde_json::json!({ "connectionId": connection_id })],
            reply: tx,
        },
        WsEvent::Message { text, binary } => {
            let data = match (text, binary) {
                (Some(text), _) => serde_json::json!({ "type": "text", "data": text }),
                (None, Some(bytes)) => {
                    serde_json::json!({ "type": "binary", "data": to_json(&MarshalledValue::bytes(bytes)) })
                }
                (None, None) => serde_json::Value::Null,
            };
            WorkerCommand::DispatchWsMessage {
                isolate_id: isolate_id.to_owned(),
                args: vec![serde_json::json!({ "connectionId": connection_id }), data],
                reply: tx,
            }
        }
        WsEvent::Close { code, reason } => WorkerCommand::DispatchWsClose {
            isolate_id: isolate_id.to_owned(),
            args: vec![serde_json::json!({ "connectionId": connection_id, "code": code, "reason": reason })],
            reply: tx,
        },
    };
    state.worker.send(command).await?;
    rx.await.map_err(|_| DaemonError::WorkerGone)??;
    Ok(())
}

/// Registers `connection_id`'s outbound sender with `isolate_id` so that
/// `ws.send`/`ws.close` ops reach this connection regardless of which
/// isolate's handler issues them (spec.md §4.6).
pub async fn register_ws_connection(
    state: &DaemonState,
    isolate_id: &str,
    connection_id: WsConnectionId,
    sender: mpsc::UnboundedSender<WsOutboundCommand>,
) -> Result<(), DaemonError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .worker
        .send(WorkerCommand::RegisterWsConnection {
            isolate_id: isolate_id.to_owned(),
            connection_id,
            sender,
            reply: tx,
        })
        .await?;
    rx.await.map_err(|_| DaemonError::WorkerGone)?
}

pub async fn unregister_ws_connection(
    state: &DaemonState,
    isolate_id: &str,
    connection_id: WsConnectionId,
) -> Result<(), DaemonError> {
    state
        .worker
        .send(WorkerCommand::UnregisterWsConnection {
            isolate_id: isolate_id.to_owned(),
            connection_id,
        })
        .await
}

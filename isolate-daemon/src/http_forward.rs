//! The daemon's external HTTP surface (spec.md §6 "acting as a forward
//! server"). Requests matching a tenant-owned route are forwarded into that
//! tenant's `serve` handlers via `dispatcher`; everything else is a 404.
//! Shaped after the teacher's `http/forwarder` axum router -- one fallback
//! handler, state threaded through `axum::extract::State`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use isolate_bridge::globals::websocket::{WsMessage, WsOutboundCommand};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatcher::{self, WsEvent};
use crate::state::DaemonState;

/// Maps an externally visible route prefix to the isolate that owns it.
/// Populated out of band (e.g. when a guest registers `serve({routes})`);
/// kept separate from `DaemonState` since it is specific to this listener.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Arc<RwLock<HashMap<String, String>>>,
}

impl RouteTable {
    pub async fn bind(&self, route_prefix: String, isolate_id: String) {
        self.routes.write().await.insert(route_prefix, isolate_id);
    }

    pub async fn unbind_isolate(&self, isolate_id: &str) {
        self.routes.write().await.retain(|_, owner| owner != isolate_id);
    }

    async fn resolve(&self, path: &str) -> Option<String> {
        let routes = self.routes.read().await;
        routes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, isolate_id)| isolate_id.clone())
    }
}

#[derive(Clone)]
struct ForwardState {
    daemon: DaemonState,
    routes: RouteTable,
}

#[must_use]
pub fn router(daemon: DaemonState, routes: RouteTable) -> Router {
    Router::new()
        .fallback(any(forward))
        .with_state(ForwardState { daemon, routes })
}

async fn forward(
    State(state): State<ForwardState>,
    method: Method,
    headers: HeaderMap,
    uri: axum::http::Uri,
    ws: Option<WebSocketUpgrade>,
    body: Body,
) -> Response {
    let Some(isolate_id) = state.routes.resolve(uri.path()).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(ws) = ws {
        let daemon = state.daemon.clone();
        return ws.on_upgrade(move |socket| handle_websocket(socket, daemon, isolate_id));
    }

    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "failed to read forwarded request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match dispatcher::dispatch_http(&state.daemon, &isolate_id, method, uri.to_string(), headers, body).await {
        Ok(response) => {
            let mut builder = Response::builder().status(response.status);
            *builder.headers_mut().expect("builder has no prior error") = response.headers;
            builder.body(Body::from(response.body)).expect("valid response parts")
        }
        Err(err) => {
            warn!(isolate_id, error = %err, "serve.fetch dispatch failed");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Drives one upgraded WebSocket through the guest's `serve.websocket`
/// handlers (spec.md §4.6): `open`, then `message` per frame, then `close`
/// once the socket ends either side. Unlike a plain request/reply loop, this
/// connection's outbound half is also reachable from *other* connections'
/// handlers -- `register_ws_connection` hands the worker thread a sender that
/// `ws.send`/`ws.close` (issued by any isolate the worker thread is running)
/// can push into, so `tokio::select!` merges inbound socket frames with that
/// channel rather than only ever replying to what this socket itself sent.
async fn handle_websocket(mut socket: WebSocket, daemon: DaemonState, isolate_id: String) {
    let connection_id = Uuid::new_v4().as_u128() as u64;
    daemon.ws_sessions.register(connection_id, isolate_id.clone()).await;

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsOutboundCommand>();
    if let Err(err) = dispatcher::register_ws_connection(&daemon, &isolate_id, connection_id, outbound_tx).await {
        warn!(isolate_id, error = %err, "failed to register websocket connection for outbound delivery");
        return;
    }

    if let Err(err) = dispatcher::dispatch_ws(&daemon, &isolate_id, connection_id, WsEvent::Open).await {
        warn!(isolate_id, error = %err, "websocket open handler failed");
    }

    let mut close_reason = (1000u16, String::new());
    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(Ok(message)) = inbound else { break };
                let event = match message {
                    Message::Text(text) => WsEvent::Message { text: Some(text.to_string()), binary: None },
                    Message::Binary(data) => WsEvent::Message { text: None, binary: Some(data.to_vec()) },
                    Message::Close(frame) => {
                        close_reason = frame
                            .map(|f| (f.code, f.reason.to_string()))
                            .unwrap_or((1000, String::new()));
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => continue,
                };
                if let Err(err) = dispatcher::dispatch_ws(&daemon, &isolate_id, connection_id, event).await {
                    warn!(isolate_id, error = %err, "websocket message handler failed");
                    break;
                }
            }
            outbound = outbound_rx.recv() => {
                let Some(command) = outbound else { break };
                match command {
                    WsOutboundCommand::Send(WsMessage::Text(text)) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    WsOutboundCommand::Send(WsMessage::Binary(data)) => {
                        if socket.send(Message::Binary(data.into())).await.is_err() {
                            break;
                        }
                    }
                    WsOutboundCommand::Close { code, reason } => {
                        close_reason = (code, reason);
                        break;
                    }
                }
            }
        }
    }

    let _ = dispatcher::unregister_ws_connection(&daemon, &isolate_id, connection_id).await;
    daemon.ws_sessions.remove(connection_id).await;
    let (code, reason) = close_reason;
    if let Err(err) = dispatcher::dispatch_ws(
        &daemon,
        &isolate_id,
        connection_id,
        WsEvent::Close { code, reason: reason.clone() },
    )
    .await
    {
        debug!(isolate_id, error = %err, "websocket close handler failed");
    }

    let _ = socket
        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

//! Per-connection frame dispatch loop (spec.md §4.7 "Assign and route ...").
//! Shaped after the teacher's `ws_forwarder` `tokio::select!` loop: one task
//! per accepted connection, reading frames off the socket and fanning out
//! by frame kind, with a single mpsc-fed writer half so callback invokes,
//! stream chunks, and verb responses can all push frames out independently.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use isolate_core::Connection;
use isolate_core::StreamSession;
use isolate_protocol::{
    ErrorKind, Frame, FrameBody, FrameCodec, RequestId, StreamDirection, StreamEndOutcome, StreamId,
    WireError, WsConnectionId, WsPayload,
};
use isolate_stream::{channel, StreamConsumer, StreamItem};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::callback_bridge::CallbackBridge;
use crate::state::DaemonState;
use crate::verbs;

/// Drives one accepted connection end to end: reads frames until EOF or a
/// protocol error, dispatches each to a verb/stream/callback handler, and
/// tears the connection's isolates down on exit (spec.md §4.7 "Disconnect").
pub async fn run<S>(socket: S, state: DaemonState)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let connection_id = Uuid::new_v4().to_string();
    let connection = Arc::new(Connection::new(connection_id.clone()));
    state.connections.register(connection.clone()).await;

    let mut framed = Framed::new(socket, FrameCodec);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<FrameBody>();
    let bridge = CallbackBridge::new(connection.clone(), outbound_tx.clone());

    // Upload streams (client -> daemon): accepted chunks are buffered until
    // `StreamEnd`, then handed to whichever verb asked for them. Full guest
    // `ReadableStream` pumping is not wired up yet; see DESIGN.md.
    let mut upload_buffers: HashMap<StreamId, Vec<u8>> = HashMap::new();
    // Download streams (daemon -> client): each has a spawned pump task
    // forwarding `StreamItem`s to `outbound_tx`, plus a side channel this
    // loop uses to forward `StreamCredit` frames into that task.
    let mut download_credit_txs: HashMap<StreamId, mpsc::UnboundedSender<u64>> = HashMap::new();

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(body) => {
                        if framed.send(Frame::new(body)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = framed.next() => {
                match incoming {
                    Some(Ok(frame)) => {
                        let keep_going = handle_frame(
                            frame.into_body(),
                            &connection,
                            &state,
                            &bridge,
                            &outbound_tx,
                            &mut upload_buffers,
                            &mut download_credit_txs,
                        )
                        .await;
                        if !keep_going {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(connection_id = %connection_id, error = %err, "malformed frame, closing connection");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    teardown(&connection, &state).await;
}

#[allow(clippy::too_many_arguments)]
async fn handle_frame(
    body: FrameBody,
    connection: &Arc<Connection>,
    state: &DaemonState,
    bridge: &CallbackBridge,
    outbound_tx: &mpsc::UnboundedSender<FrameBody>,
    upload_buffers: &mut HashMap<StreamId, Vec<u8>>,
    download_credit_txs: &mut HashMap<StreamId, mpsc::UnboundedSender<u64>>,
) -> bool {
    match body {
        FrameBody::Request {
            request_id,
            target,
            verb,
            arguments,
        } => {
            spawn_verb(request_id, target, verb, arguments, connection, state, bridge, outbound_tx);
            true
        }
        FrameBody::Response { request_id, result } => {
            if let Some(reply) = connection.take_pending_request(request_id).await {
                let _ = reply.send(result);
            } else {
                debug!(request_id, "response for an unknown or already-answered request, discarding");
            }
            true
        }
        FrameBody::CallbackInvoke { .. } => {
            // This daemon only ever sends CallbackInvoke, never receives one
            // -- a guest never calls directly into the client. A peer that
            // sends one anyway gets ignored rather than killing the connection.
            warn!("received unexpected CallbackInvoke frame from peer, ignoring");
            true
        }
        FrameBody::CallbackResult {
            invocation_id, result, ..
        } => {
            if let Some(reply) = connection.take_pending_callback_invocation(invocation_id).await {
                let _ = reply.send(result);
            } else {
                debug!(invocation_id, "callback result for an unknown or already-answered invocation, discarding");
            }
            true
        }
        FrameBody::StreamOpen {
            stream_id,
            direction,
            initial_credit,
            content_type_hint: _,
        } => {
            handle_stream_open(stream_id, direction, initial_credit, connection, upload_buffers, outbound_tx).await;
            true
        }
        FrameBody::StreamChunk { stream_id, bytes } => {
            handle_stream_chunk(stream_id, bytes, connection, upload_buffers).await;
            true
        }
        FrameBody::StreamCredit { stream_id, granted_bytes } => {
            if let Some(tx) = download_credit_txs.get(&stream_id) {
                let _ = tx.send(granted_bytes);
            }
            let _ = connection
                .with_stream_session_mut(stream_id, |session| session.grant_credit(granted_bytes))
                .await;
            true
        }
        FrameBody::StreamEnd { stream_id, outcome, .. } => {
            upload_buffers.remove(&stream_id);
            download_credit_txs.remove(&stream_id);
            let _ = connection
                .with_stream_session_mut(stream_id, |session| match outcome {
                    StreamEndOutcome::Normal => session.begin_closing(),
                    StreamEndOutcome::Error => session.close(),
                })
                .await;
            connection.remove_stream_session(stream_id).await;
            true
        }
        FrameBody::WsMessage { connection_id, payload } => {
            handle_ws_message(connection_id, payload, state).await;
            true
        }
        FrameBody::WsClose { connection_id, code, reason } => {
            handle_ws_close(connection_id, code, reason, state).await;
            true
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_verb(
    request_id: RequestId,
    target: isolate_protocol::RequestTarget,
    verb: String,
    arguments: Vec<isolate_protocol::MarshalledValue>,
    connection: &Arc<Connection>,
    state: &DaemonState,
    bridge: &CallbackBridge,
    outbound_tx: &mpsc::UnboundedSender<FrameBody>,
) {
    let connection = connection.clone();
    let state = state.clone();
    let bridge = bridge.clone();
    let outbound_tx = outbound_tx.clone();

    tokio::spawn(async move {
        let result = verbs::dispatch(&connection, &state, &bridge, &target, &verb, arguments).await;
        let result = result.map_err(|err| err.to_wire());
        let _ = outbound_tx.send(FrameBody::Response { request_id, result });
    });
}

async fn handle_stream_open(
    stream_id: StreamId,
    direction: StreamDirection,
    initial_credit: u64,
    connection: &Arc<Connection>,
    upload_buffers: &mut HashMap<StreamId, Vec<u8>>,
    outbound_tx: &mpsc::UnboundedSender<FrameBody>,
) {
    connection
        .register_stream_session(StreamSession::new(stream_id, 0, direction, initial_credit))
        .await;

    match direction {
        StreamDirection::Upload => {
            upload_buffers.insert(stream_id, Vec::new());
        }
        StreamDirection::Download => {
            // Only the daemon opens download streams (from inside a verb
            // handler, via `open_download_stream`). A client-opened one is
            // rejected rather than silently accepted.
            let _ = outbound_tx.send(FrameBody::StreamEnd {
                stream_id,
                outcome: StreamEndOutcome::Error,
                error: Some(WireError::new(
                    ErrorKind::Protocol,
                    "Error",
                    "only the daemon may open a download stream",
                )),
            });
        }
    }
}

async fn handle_stream_chunk(
    stream_id: StreamId,
    bytes: Vec<u8>,
    connection: &Arc<Connection>,
    upload_buffers: &mut HashMap<StreamId, Vec<u8>>,
) {
    let spent = connection
        .with_stream_session_mut(stream_id, |session| session.spend(bytes.len() as u64))
        .await;
    match spent {
        Ok(Ok(())) => {
            if let Some(buffer) = upload_buffers.get_mut(&stream_id) {
                buffer.extend_from_slice(&bytes);
            }
        }
        _ => {
            warn!(stream_id, "chunk rejected: unknown stream or credit exceeded");
        }
    }
}

async fn handle_ws_message(connection_id: WsConnectionId, payload: WsPayload, state: &DaemonState) {
    let Some(isolate_id) = state.ws_sessions.owner(connection_id).await else {
        debug!(connection_id, "message for an unknown websocket session, discarding");
        return;
    };
    let arg = match payload {
        WsPayload::Text(text) => serde_json::json!({ "type": "text", "data": text }),
        WsPayload::Binary(bytes) => {
            serde_json::json!({ "type": "binary", "data": crate::json_bridge::to_json(&isolate_protocol::MarshalledValue::bytes(bytes)) })
        }
    };
    let (tx, _rx) = tokio::sync::oneshot::channel();
    let reply = state
        .worker
        .send(crate::worker::WorkerCommand::DispatchWsMessage {
            isolate_id,
            args: vec![serde_json::json!({ "connectionId": connection_id }), arg],
            reply: tx,
        })
        .await;
    if let Err(err) = reply {
        warn!(connection_id, error = %err, "failed to dispatch websocket message");
    }
}

async fn handle_ws_close(connection_id: WsConnectionId, code: u16, reason: String, state: &DaemonState) {
    let Some(isolate_id) = state.ws_sessions.remove(connection_id).await else {
        return;
    };
    let (tx, _rx) = tokio::sync::oneshot::channel();
    let _ = state
        .worker
        .send(crate::worker::WorkerCommand::DispatchWsClose {
            isolate_id,
            args: vec![serde_json::json!({ "connectionId": connection_id, "code": code, "reason": reason })],
            reply: tx,
        })
        .await;
}

/// Opens a daemon-initiated download stream: announces it to the client,
/// returns a `StreamProducer` the caller pushes chunks into, and spawns the
/// pump task that forwards them out as `StreamChunk`/`StreamEnd` frames
/// while honoring `StreamCredit` frames relayed back by the connection loop.
pub async fn open_download_stream(
    connection: &Arc<Connection>,
    outbound_tx: &mpsc::UnboundedSender<FrameBody>,
    content_type_hint: Option<String>,
) -> isolate_stream::StreamProducer {
    let stream_id = connection.next_stream_id();
    let initial_credit = 64 * 1024;
    connection
        .register_stream_session(StreamSession::new(stream_id, 0, StreamDirection::Download, initial_credit))
        .await;
    let _ = outbound_tx.send(FrameBody::StreamOpen {
        stream_id,
        direction: StreamDirection::Download,
        initial_credit,
        content_type_hint,
    });

    let (producer, mut consumer) = channel(stream_id, initial_credit);
    let pump_outbound = outbound_tx.clone();
    tokio::spawn(async move {
        while let Some(item) = consumer.recv().await {
            match item {
                StreamItem::Chunk(bytes) => {
                    let _ = pump_outbound.send(FrameBody::StreamChunk {
                        stream_id,
                        bytes: bytes.to_vec(),
                    });
                }
                StreamItem::End(result) => {
                    let (outcome, error) = match result {
                        Ok(()) => (StreamEndOutcome::Normal, None),
                        Err(err) => (StreamEndOutcome::Error, Some(err)),
                    };
                    let _ = pump_outbound.send(FrameBody::StreamEnd { stream_id, outcome, error });
                    break;
                }
            }
        }
    });
    producer
}

async fn teardown(connection: &Arc<Connection>, state: &DaemonState) {
    // `Connection`'s isolate map is this connection's own bookkeeping copy;
    // the real `IsolateHandle` (and the V8 runtime backing it) lives on the
    // worker thread's `Engine` and must be disposed there explicitly.
    for isolate_id in connection.isolate_ids().await {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if state
            .worker
            .send(crate::worker::WorkerCommand::CloseIsolate { isolate_id, reply: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    let cancelled = connection.teardown_all_isolates().await;
    let error = WireError::new(ErrorKind::Resource, "Error", "connection closed").retryable();
    connection.reject_all_pending_requests(error.clone()).await;
    connection.reject_all_pending_callback_invocations(error).await;
    for stream_id in connection.active_stream_ids().await {
        connection.remove_stream_session(stream_id).await;
    }
    if !cancelled.is_empty() {
        debug!(connection_id = %connection.connection_id, streams = cancelled.len(), "cancelled in-flight streams on disconnect");
    }
    state.connections.remove(&connection.connection_id).await;
}

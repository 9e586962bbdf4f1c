//! S5 (spec.md §8): two (here, three, to distinguish the "message" and
//! "leave" usernames exactly as spec.md phrases them) WebSocket connections
//! share one isolate's `serve.websocket` handler. A `message` from one
//! connection is broadcast to the others; a disconnect broadcasts
//! `userLeft`. Driven the same way `isolate-daemon/src/http_forward.rs`
//! wires a real axum socket -- `register_ws_connection` installs this
//! connection's outbound sender, `dispatch_ws` forwards lifecycle events
//! into the guest, `ws.send` (`op_ws_send_text`) reaches whichever
//! connection's sender is registered, not just the caller's own -- without
//! needing a real axum/WS client, since nothing downstream of
//! `register_ws_connection`/`dispatch_ws` cares how the connection was
//! accepted.

use std::collections::BTreeMap;

use isolate_bridge::globals::websocket::{WsMessage, WsOutboundCommand};
use isolate_daemon::dispatcher::{self, WsEvent};
use isolate_daemon::state::DaemonState;
use isolate_protocol::{MarshalledValue, RequestTarget};
use isolate_test_utils::MockIpcClient;
use tokio::sync::mpsc;

#[tokio::test]
async fn a_broadcast_message_and_a_disconnect_both_reach_the_other_connection() {
    let state = DaemonState::new(8, 64 * 1024 * 1024);
    let (client_half, server_half) = tokio::io::duplex(64 * 1024);
    tokio::spawn(isolate_daemon::multiplexer::run(server_half, state.clone()));

    let mut client = MockIpcClient::new(client_half);

    let mut options = BTreeMap::new();
    options.insert(
        "capabilities".to_owned(),
        MarshalledValue::Sequence(vec![
            MarshalledValue::String("serve".to_owned()),
            MarshalledValue::String("websocket".to_owned()),
        ]),
    );
    let created = client
        .call(RequestTarget::Connection, "createRuntime", vec![MarshalledValue::record(options)])
        .await
        .expect("createRuntime should succeed");
    let MarshalledValue::Record(fields) = created else {
        panic!("createRuntime must return a record");
    };
    let Some(MarshalledValue::String(isolate_id)) = fields.get("isolateId") else {
        panic!("createRuntime response missing isolateId");
    };
    let isolate_id = isolate_id.clone();

    let script = r#"
        const connections = new Map();
        serve({
            websocket: {
                async open(ws) {
                    connections.set(ws.data, { ws, username: null });
                },
                async message(ws, raw) {
                    const payload = JSON.parse(raw);
                    const conn = connections.get(ws.data);
                    if (payload.type === "join") {
                        conn.username = payload.username;
                        return;
                    }
                    if (payload.type === "message") {
                        for (const [id, other] of connections) {
                            if (id === ws.data) continue;
                            other.ws.send(JSON.stringify({
                                type: "message",
                                payload: { username: conn.username, text: payload.text },
                            }));
                        }
                    }
                },
                async close(ws) {
                    const conn = connections.get(ws.data);
                    connections.delete(ws.data);
                    if (!conn || !conn.username) return;
                    for (const [, other] of connections) {
                        other.ws.send(JSON.stringify({
                            type: "userLeft",
                            payload: { username: conn.username },
                        }));
                    }
                },
            },
        });
    "#;
    client
        .call(RequestTarget::Isolate(isolate_id.clone()), "runtime.eval", vec![MarshalledValue::String(script.to_owned())])
        .await
        .expect("registering the websocket handler should succeed");

    const USER1: u64 = 1;
    const USER2: u64 = 2;
    const LEAVER: u64 = 3;

    let (user1_tx, mut user1_rx) = mpsc::unbounded_channel::<WsOutboundCommand>();
    let (user2_tx, _user2_rx) = mpsc::unbounded_channel::<WsOutboundCommand>();
    let (leaver_tx, _leaver_rx) = mpsc::unbounded_channel::<WsOutboundCommand>();

    for (id, tx) in [(USER1, user1_tx), (USER2, user2_tx), (LEAVER, leaver_tx)] {
        dispatcher::register_ws_connection(&state, &isolate_id, id, tx)
            .await
            .expect("registering a connection's outbound sender should succeed");
        dispatcher::dispatch_ws(&state, &isolate_id, id, WsEvent::Open)
            .await
            .expect("dispatching open should succeed");
    }

    for (id, username) in [(USER1, "User1"), (USER2, "User2"), (LEAVER, "Leaver")] {
        let join = serde_json::json!({ "type": "join", "username": username }).to_string();
        dispatcher::dispatch_ws(&state, &isolate_id, id, WsEvent::Message { text: Some(join), binary: None })
            .await
            .expect("dispatching join should succeed");
    }

    let chat = serde_json::json!({ "type": "message", "text": "hi from user2" }).to_string();
    dispatcher::dispatch_ws(&state, &isolate_id, USER2, WsEvent::Message { text: Some(chat), binary: None })
        .await
        .expect("dispatching the chat message should succeed");

    let received = user1_rx.recv().await.expect("User1 should receive User2's broadcast message");
    let WsOutboundCommand::Send(WsMessage::Text(text)) = received else {
        panic!("expected a text message, got {received:?}");
    };
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["type"], "message");
    assert_eq!(parsed["payload"]["username"], "User2");
    assert_eq!(parsed["payload"]["text"], "hi from user2");

    dispatcher::dispatch_ws(
        &state,
        &isolate_id,
        LEAVER,
        WsEvent::Close { code: 1000, reason: String::new() },
    )
    .await
    .expect("dispatching close should succeed");
    dispatcher::unregister_ws_connection(&state, &isolate_id, LEAVER)
        .await
        .expect("unregistering the leaver should succeed");

    let left = user1_rx.recv().await.expect("User1 should receive the userLeft broadcast");
    let WsOutboundCommand::Send(WsMessage::Text(text)) = left else {
        panic!("expected a text message, got {left:?}");
    };
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["type"], "userLeft");
    assert_eq!(parsed["payload"]["username"], "Leaver");
}

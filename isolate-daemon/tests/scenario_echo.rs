//! S1 (spec.md §8): a guest `serve({fetch})` handler answers a forwarded
//! HTTP request with a JSON echo. Drives the same `createRuntime` ->
//! `runtime.eval` -> `runtime.fetch.dispatchRequest` path `eval_roundtrip.rs`
//! uses, this time evaluating a real `serve.fetch` registration instead of a
//! bare expression.

use std::collections::BTreeMap;

use isolate_daemon::state::DaemonState;
use isolate_protocol::{MarshalledValue, RequestTarget};
use isolate_test_utils::MockIpcClient;

#[tokio::test]
async fn fetch_handler_echoes_a_json_message() {
    let state = DaemonState::new(8, 64 * 1024 * 1024);
    let (client_half, server_half) = tokio::io::duplex(64 * 1024);
    tokio::spawn(isolate_daemon::multiplexer::run(server_half, state));

    let mut client = MockIpcClient::new(client_half);

    let mut options = BTreeMap::new();
    options.insert(
        "capabilities".to_owned(),
        MarshalledValue::Sequence(vec![MarshalledValue::String("serve".to_owned())]),
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
        serve({
            fetch(req) {
                return Response.json({ message: "Hello from Isolate!", method: req.method, path: req.url });
            }
        });
    "#;
    client
        .call(RequestTarget::Isolate(isolate_id.clone()), "runtime.eval", vec![MarshalledValue::String(script.to_owned())])
        .await
        .expect("registering the fetch handler should succeed");

    let mut request = BTreeMap::new();
    request.insert("method".to_owned(), MarshalledValue::String("GET".to_owned()));
    request.insert("url".to_owned(), MarshalledValue::String("/hello".to_owned()));
    request.insert("headers".to_owned(), MarshalledValue::record(BTreeMap::new()));

    let response = client
        .call(
            RequestTarget::Isolate(isolate_id),
            "runtime.fetch.dispatchRequest",
            vec![MarshalledValue::record(request)],
        )
        .await
        .expect("dispatching the request should succeed");

    let MarshalledValue::Record(fields) = response else {
        panic!("dispatchRequest must return a Response-shaped record");
    };
    assert_eq!(fields.get("status"), Some(&MarshalledValue::Number(200.0)));
    let Some(MarshalledValue::Record(headers)) = fields.get("headers") else {
        panic!("response missing headers");
    };
    assert_eq!(
        headers.get("content-type"),
        Some(&MarshalledValue::String("application/json".to_owned()))
    );
    let Some(MarshalledValue::String(body)) = fields.get("body") else {
        panic!("response missing body");
    };
    let parsed: serde_json::Value = serde_json::from_str(body).expect("body must be valid JSON");
    assert_eq!(parsed["message"], "Hello from Isolate!");
    assert_eq!(parsed["method"], "GET");
}

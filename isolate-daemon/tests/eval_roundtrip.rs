//! End-to-end: connect with a raw framed client, create a runtime, eval a
//! script, and close it -- exercising `verbs::dispatch` and `multiplexer::run`
//! together the way the teacher's `mock_server_forwarder_hello_handshake`
//! test drove its own accept loop end to end.

use isolate_daemon::state::DaemonState;
use isolate_protocol::{MarshalledValue, RequestTarget};
use isolate_test_utils::MockIpcClient;

#[tokio::test]
async fn create_runtime_eval_and_close() {
    let state = DaemonState::new(8, 64 * 1024 * 1024);
    let (client_half, server_half) = tokio::io::duplex(64 * 1024);
    tokio::spawn(isolate_daemon::multiplexer::run(server_half, state));

    let mut client = MockIpcClient::new(client_half);

    let mut options = std::collections::BTreeMap::new();
    options.insert(
        "capabilities".to_owned(),
        MarshalledValue::Sequence(vec![]),
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

    let result = client
        .call(
            RequestTarget::Isolate(isolate_id.clone()),
            "runtime.eval",
            vec![MarshalledValue::String("1 + 2".to_owned())],
        )
        .await
        .expect("eval should succeed");
    assert_eq!(result, MarshalledValue::Number(3.0));

    client
        .call(RequestTarget::Isolate(isolate_id.clone()), "runtime.close", vec![])
        .await
        .expect("runtime.close should succeed");
}

#[tokio::test]
async fn unknown_verb_is_rejected_with_a_validation_error() {
    let state = DaemonState::new(8, 64 * 1024 * 1024);
    let (client_half, server_half) = tokio::io::duplex(64 * 1024);
    tokio::spawn(isolate_daemon::multiplexer::run(server_half, state));

    let mut client = MockIpcClient::new(client_half);
    let result = client.call(RequestTarget::Connection, "not.a.real.verb", vec![]).await;
    assert!(result.is_err());
}
